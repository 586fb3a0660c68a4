//! Shared setup for the HTTP integration tests: in-memory store, the
//! shipped policy file, and recording mocks for mail and captcha.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use org_service::{
    build_router,
    config::{
        AuthConfig, CaptchaConfig, Environment, HttpConfig, ServiceConfig, SmtpConfig,
        StoreBackend, StoreConfig,
    },
    db::{DocumentStore, MemoryStore},
    services::{CasbinAuthorizer, MockCaptcha, MockEmailService},
    AppState,
};
use serde_json::{json, Value};
use service_core::observability::LogLevelHandle;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "org-service-test".to_string(),
        service_version: "1.0.0-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreConfig {
            backend: StoreBackend::Memory,
            uri: String::new(),
            database: "test".to_string(),
        },
        auth: AuthConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
        },
        http: HttpConfig {
            cookie_domain: None,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        captcha: CaptchaConfig {
            secret: "unused".to_string(),
            url: "http://127.0.0.1:9/siteverify".to_string(),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: String::new(),
            from_name: "Org Service".to_string(),
            from_email: "no-reply@example.com".to_string(),
            reply_to: "no-reply@example.com".to_string(),
        },
        policy_path: concat!(env!("CARGO_MANIFEST_DIR"), "/policy/keymatch_policy.csv")
            .to_string(),
        rate_limit_per_second: 1000,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub email: MockEmailService,
}

/// A session as the browser holds it: the two auth cookies.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    pub fn cookie_header(&self) -> String {
        format!(
            "accessToken={}; refreshToken={}",
            self.access_token, self.refresh_token
        )
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_captcha(true).await
    }

    pub async fn spawn_with_captcha(accept: bool) -> Self {
        Self::build(Arc::new(MemoryStore::new()), accept).await
    }

    /// Runs the app over a caller-supplied store, e.g. one that injects
    /// failures.
    pub async fn spawn_with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::build(store, true).await
    }

    async fn build(store: Arc<dyn DocumentStore>, accept: bool) -> Self {
        let config = test_config();
        let authz = CasbinAuthorizer::from_policy_file(&config.policy_path)
            .await
            .expect("Failed to load policy");
        let email = MockEmailService::new();

        let state = AppState::new(
            config,
            store,
            Arc::new(authz),
            Arc::new(email.clone()),
            Arc::new(MockCaptcha { accept }),
            LogLevelHandle::detached("error"),
        )
        .expect("Failed to build state");

        let router = build_router(state.clone()).expect("Failed to build router");
        Self {
            router,
            state,
            email,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(session) = session {
            builder = builder.header(header::COOKIE, session.cookie_header());
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Registers a new organization and returns the admin's session.
    pub async fn register(&self, email: &str, organization: &str) -> Session {
        let response = self
            .request(
                Method::POST,
                "/api/v1/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "userName": "Admin",
                    "organizationName": organization,
                    "captchaToken": "token",
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_from(&response)
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({
                "email": email,
                "password": password,
                "captchaToken": "token",
            })),
        )
        .await
    }

    /// Invites a user with `role` and logs them in with the mailed code.
    pub async fn invite_and_login(&self, admin: &Session, email: &str, role: &str) -> Session {
        let response = self
            .request(
                Method::POST,
                "/api/v1/users",
                Some(admin),
                Some(json!({ "name": "Member", "email": email, "role": role })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let code = self
            .email
            .last_code(email, org_service::services::EmailKind::Invite)
            .expect("invite code mailed");
        let response = self.login(email, &code).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_from(&response)
    }
}

/// Collects the auth cookies a response sets.
pub fn session_from(response: &Response<Body>) -> Session {
    let mut session = Session::default();
    for value in response.headers().get_all(header::SET_COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        let pair = value.split(';').next().unwrap_or_default();
        if let Some((name, token)) = pair.split_once('=') {
            match name.trim() {
                "accessToken" => session.access_token = token.to_string(),
                "refreshToken" => session.refresh_token = token.to_string(),
                _ => {}
            }
        }
    }
    session
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
