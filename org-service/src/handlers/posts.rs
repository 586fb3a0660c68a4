use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        posts::{CreatePostRequest, PostResponse, UpdatePostRequest},
        GetManyResponse, ListParams, MessageResponse,
    },
    middleware::Principal,
    models::Post,
    utils::ValidatedJson,
    AppState,
};

fn post_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Post not found"))
}

pub async fn list_posts(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .posts
        .get_many(
            &principal.organization_id,
            params.page(),
            params.sort_spec(),
            params.search(),
        )
        .await?;
    Ok(Json(GetManyResponse::from_page(page, PostResponse::from)))
}

pub async fn create_post(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let post = state
        .posts
        .create(Post::new(
            req.name,
            principal.organization_id.clone(),
            principal.user_id.clone(),
        ))
        .await?;
    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn get_post(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = state
        .posts
        .get_by_id(&id, &principal.organization_id)
        .await?
        .ok_or_else(post_not_found)?;
    Ok(Json(PostResponse::from(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let matched = state
        .posts
        .update(&id, &principal.organization_id, &req.name, &principal.user_id)
        .await?;
    if matched == 0 {
        return Err(post_not_found());
    }
    Ok(Json(MessageResponse::new("Post updated")))
}

pub async fn delete_post(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if state.posts.delete(&id, &principal.organization_id).await? == 0 {
        return Err(post_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
