use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginResponse, RegisterRequest},
    utils::{cookies::with_token_cookies, ValidatedJson},
    AppState,
};

/// Creates the user, their organization and a signed-in session.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.auth.register(req).await?;
    let body = LoginResponse {
        access_token: issued.access_token.clone(),
        refresh_token: issued.refresh_token.clone(),
        exp: issued.exp,
    };
    let jar = with_token_cookies(
        jar,
        issued.access_token,
        issued.refresh_token,
        state.config.http.cookie_domain.as_deref(),
    );
    Ok((jar, Json(body)))
}
