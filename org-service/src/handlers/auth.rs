use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            ChangePasswordRequest, LoginRequest, RecoverPasswordRequest, ResetPasswordRequest,
            ValidateOtpRequest,
        },
        MessageResponse,
    },
    middleware::Principal,
    utils::{
        cookies::{with_cleared_cookies, with_token_cookies, REFRESH_COOKIE},
        ValidatedJson,
    },
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.auth.login(req).await?;
    let jar = with_token_cookies(
        jar,
        issued.access_token,
        issued.refresh_token,
        state.config.http.cookie_domain.as_deref(),
    );
    Ok((jar, Json(MessageResponse::new("Login success"))))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = with_cleared_cookies(jar, state.config.http.cookie_domain.as_deref());
    (jar, Json(MessageResponse::new("Logged out")))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing Cookie")))?;

    let (_, issued) = state.auth.refresh(&token).await?;
    let jar = with_token_cookies(
        jar,
        issued.access_token,
        issued.refresh_token,
        state.config.http.cookie_domain.as_deref(),
    );
    Ok((jar, StatusCode::NO_CONTENT))
}

pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .change_password(&principal.user_id, &req.current_password, req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

pub async fn recover_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RecoverPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .recover_password(&req.email, &req.captcha_token)
        .await?;
    Ok(Json(MessageResponse::new(
        "You will receive a code via email if this email has an account with us",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.reset_password(req).await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

pub async fn send_otp(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    state.auth.send_confirm_otp(&principal.user_id).await?;
    Ok(Json(MessageResponse::new("OTP sent")))
}

pub async fn validate_otp(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<ValidateOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .validate_confirm_otp(&principal.user_id, &req.otp)
        .await?;
    Ok(Json(MessageResponse::new("Email confirmed")))
}
