use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use tokio::task::JoinHandle;

use crate::{
    dtos::{
        organizations::{OrganizationResponse, UpdateOrganizationRequest},
        GetManyResponse, ListParams, MessageResponse,
    },
    middleware::Principal,
    utils::{cookies::with_cleared_cookies, ValidatedJson},
    AppState,
};

fn organization_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Organization not found"))
}

async fn joined<T>(task: JoinHandle<Result<T, AppError>>) -> Result<T, AppError> {
    task.await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Delete task failed: {}", e)))?
}

pub async fn get_my_organization(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let organization = state
        .organizations
        .get_by_id(&principal.organization_id)
        .await?
        .ok_or_else(organization_not_found)?;
    Ok(Json(OrganizationResponse::from(organization)))
}

pub async fn update_my_organization(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let matched = state
        .organizations
        .update(&principal.organization_id, &req, &principal.user_id)
        .await?;
    if matched == 0 {
        return Err(organization_not_found());
    }
    Ok(Json(MessageResponse::new("Organization updated")))
}

/// Deletes the organization with all of its users and posts.
///
/// The three deletes run as separate tasks, so one failing does not cancel
/// the others. Nothing is rolled back; re-running after a partial failure
/// finishes the job.
pub async fn delete_my_organization(
    State(state): State<AppState>,
    principal: Principal,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let organization_id = principal.organization_id.clone();

    let users_task = tokio::spawn({
        let users = state.users.clone();
        let organization_id = organization_id.clone();
        async move { users.delete_all_for_organization(&organization_id).await }
    });
    let posts_task = tokio::spawn({
        let posts = state.posts.clone();
        let organization_id = organization_id.clone();
        async move { posts.delete_all_for_organization(&organization_id).await }
    });
    let organization_task = tokio::spawn({
        let organizations = state.organizations.clone();
        let organization_id = organization_id.clone();
        async move { organizations.delete(&organization_id).await }
    });

    let (users, posts, organizations) = tokio::try_join!(
        joined(users_task),
        joined(posts_task),
        joined(organization_task),
    )?;

    if organizations == 0 {
        return Err(organization_not_found());
    }

    tracing::info!(
        organization_id = %organization_id,
        users,
        posts,
        deleted_by = %principal.user_id,
        "Organization deleted"
    );
    let jar = with_cleared_cookies(jar, state.config.http.cookie_domain.as_deref());
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Lists every organization; super users only.
pub async fn list_organizations(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    if !principal.is_super_user() {
        return Err(AppError::Forbidden(anyhow::anyhow!("Access denied")));
    }
    let page = state
        .organizations
        .get_many(params.page(), params.sort_spec(), params.search())
        .await?;
    Ok(Json(GetManyResponse::from_page(page, OrganizationResponse::from)))
}
