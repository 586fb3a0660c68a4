use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{users::RolesResponse, InfoResponse, LogLevelResponse, MessageResponse, PatchLogLevel},
    models::ALLOWED_ROLES,
    utils::ValidatedJson,
    AppState,
};

pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.store.ping().await?;
    Ok(Json(MessageResponse::new("ok")))
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: state.config.service_version.clone(),
        env: state.config.environment.as_str().to_string(),
    })
}

pub async fn get_log_level(State(state): State<AppState>) -> impl IntoResponse {
    Json(LogLevelResponse {
        level: state.log_level.current(),
    })
}

pub async fn patch_log_level(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PatchLogLevel>,
) -> Result<impl IntoResponse, AppError> {
    let level = state.log_level.set(&req.level)?;
    Ok(Json(LogLevelResponse { level }))
}

pub async fn roles() -> impl IntoResponse {
    Json(RolesResponse {
        roles: ALLOWED_ROLES.iter().map(|role| role.to_string()).collect(),
    })
}
