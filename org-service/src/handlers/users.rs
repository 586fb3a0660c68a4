use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        users::{BulkCreateUsersRequest, CreateUserRequest, UpdateUserRequest, UserResponse},
        GetManyResponse, ListParams, MessageResponse,
    },
    middleware::Principal,
    services::{otp, UserChanges},
    utils::{cookies::with_token_cookies, ValidatedJson},
    AppState,
};

fn user_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("User not found"))
}

pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .users
        .get_many(
            &principal.organization_id,
            params.page(),
            params.sort_spec(),
            params.search(),
        )
        .await?;
    Ok(Json(GetManyResponse::from_page(page, UserResponse::from)))
}

/// Invites one user into the caller's organization.
pub async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .invite(req, &principal.organization_id, &principal.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn bulk_create_users(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<BulkCreateUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .bulk_invite(req.users, &principal.organization_id, &principal.user_id)
        .await?;
    Ok(Json(MessageResponse::new("Users Invited")))
}

pub async fn get_me(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .get_by_id_any_org(&principal.user_id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .get_by_id(&id, &principal.organization_id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(UserResponse::from(user)))
}

/// An email change unconfirms the account and mails a new code; a change to
/// the caller's own name or roles refreshes their cookies.
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    jar: CookieJar,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Nothing to update")));
    }

    if let Some(email) = &req.email {
        if let Some(existing) = state.users.get_by_email_any_org(email).await? {
            if existing.id_hex() != id {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A user with this email address already exists"
                )));
            }
        }
    }

    let identity_changed = req.name.is_some() || req.roles.is_some();
    let confirm_code = req.email.as_ref().map(|_| otp::generate_confirm_code());
    let changes = UserChanges {
        name: req.name,
        email: req.email,
        roles: req.roles,
        confirm_otp: confirm_code.clone(),
        updated_by_id: Some(principal.user_id.clone()),
    };

    let matched = state
        .users
        .update(&id, &principal.organization_id, &changes)
        .await?;
    if matched == 0 {
        return Err(user_not_found());
    }

    let user = state
        .users
        .get_by_id(&id, &principal.organization_id)
        .await?
        .ok_or_else(user_not_found)?;

    if let Some(code) = confirm_code {
        state
            .email
            .send_verification_code(&user.email, &user.name, &code)
            .await?;
    }

    let jar = if identity_changed && id == principal.user_id {
        let issued = state.auth.issue(&user)?;
        with_token_cookies(
            jar,
            issued.access_token,
            issued.refresh_token,
            state.config.http.cookie_domain.as_deref(),
        )
    } else {
        jar
    };

    Ok((jar, Json(MessageResponse::new("User updated"))))
}

async fn delete_in_organization(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<StatusCode, AppError> {
    let user = state
        .users
        .get_by_id(id, &principal.organization_id)
        .await?
        .ok_or_else(user_not_found)?;

    if user.id_hex() == principal.user_id && user.is_organization_admin() {
        let admins = state
            .users
            .count_org_admins(&principal.organization_id)
            .await?;
        if admins <= 1 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "You are the only organization admin left, please delete the organization instead"
            )));
        }
    }

    if state.users.delete(id, &principal.organization_id).await? == 0 {
        return Err(user_not_found());
    }
    tracing::info!(user_id = %id, deleted_by = %principal.user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    delete_in_organization(&state, &principal, &id).await
}

pub async fn delete_me(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    delete_in_organization(&state, &principal, &principal.user_id).await
}
