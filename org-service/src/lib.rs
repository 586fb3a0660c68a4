pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use service_core::observability::LogLevelHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::db::DocumentStore;
use crate::services::{
    AuthService, Authorizer, CaptchaVerifier, EmailProvider, OrganizationsService, PostsService,
    TokenService, UsersService,
};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub users: UsersService,
    pub organizations: OrganizationsService,
    pub posts: PostsService,
    pub auth: AuthService,
    pub tokens: TokenService,
    pub authz: Arc<dyn Authorizer>,
    pub email: Arc<dyn EmailProvider>,
    pub log_level: LogLevelHandle,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires the entity services onto one store. Fails when the token
    /// secrets are unusable.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn DocumentStore>,
        authz: Arc<dyn Authorizer>,
        email: Arc<dyn EmailProvider>,
        captcha: Arc<dyn CaptchaVerifier>,
        log_level: LogLevelHandle,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(&config.auth.access_secret, &config.auth.refresh_secret)?;
        let users = UsersService::new(store.as_ref());
        let organizations = OrganizationsService::new(store.as_ref());
        let posts = PostsService::new(store.as_ref());
        let auth = AuthService::new(
            users.clone(),
            organizations.clone(),
            tokens.clone(),
            email.clone(),
            captcha,
        );
        let ip_rate_limiter = create_ip_rate_limiter(config.rate_limit_per_second);

        Ok(Self {
            config: Arc::new(config),
            store,
            users,
            organizations,
            posts,
            auth,
            tokens,
            authz,
            email,
            log_level,
            ip_rate_limiter,
        })
    }
}

fn api(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route(&api("/health"), get(handlers::meta::health))
        .route(&api("/info"), get(handlers::meta::info))
        .route(&api("/register"), post(handlers::register::register))
        .route(&api("/auth/login"), post(handlers::auth::login))
        .route(&api("/auth/logout"), post(handlers::auth::logout))
        .route(&api("/auth/refresh"), get(handlers::auth::refresh))
        .route(
            &api("/auth/password/recover"),
            post(handlers::auth::recover_password),
        )
        .route(
            &api("/auth/password/reset"),
            post(handlers::auth::reset_password),
        );

    let private_routes = Router::new()
        .route(&api("/auth/password"), post(handlers::auth::change_password))
        .route(&api("/auth/otp/send"), post(handlers::auth::send_otp))
        .route(&api("/auth/otp/validate"), post(handlers::auth::validate_otp))
        .route(
            &api("/logs/level"),
            get(handlers::meta::get_log_level).patch(handlers::meta::patch_log_level),
        )
        .route(&api("/roles"), get(handlers::meta::roles))
        .route(
            &api("/users"),
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(&api("/users/bulk"), post(handlers::users::bulk_create_users))
        .route(
            &api("/users/me"),
            get(handlers::users::get_me).delete(handlers::users::delete_me),
        )
        .route(
            &api("/users/:id"),
            get(handlers::users::get_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            &api("/organizations"),
            get(handlers::organizations::list_organizations),
        )
        .route(
            &api("/organizations/me"),
            get(handlers::organizations::get_my_organization)
                .patch(handlers::organizations::update_my_organization)
                .delete(handlers::organizations::delete_my_organization),
        )
        .route(
            &api("/posts"),
            get(handlers::posts::list_posts).post(handlers::posts::create_post),
        )
        .route(
            &api("/posts/:id"),
            get(handlers::posts::get_post)
                .patch(handlers::posts::update_post)
                .delete(handlers::posts::delete_post),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();
    let body_limit = state.config.common.body_limit_bytes;
    let cors = cors_layer(&state.config.http.allowed_origins);

    let app = Router::new()
        .merge(public_routes)
        .merge(private_routes)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = service_core::middleware::tracing::request_id(request.headers());
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}
