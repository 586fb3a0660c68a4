mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, session_from, set_cookies, Session, TestApp, PASSWORD};
use org_service::services::EmailKind;
use serde_json::json;

#[tokio::test]
async fn register_sets_scoped_http_only_cookies() {
    let app = TestApp::spawn().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "email": "owner@acme.test",
                "password": PASSWORD,
                "userName": "Owner",
                "organizationName": "Acme",
                "captchaToken": "token",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let access = cookies
        .iter()
        .find(|c| c.starts_with("accessToken="))
        .expect("access cookie");
    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("refreshToken="))
        .expect("refresh cookie");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Secure"));
    assert!(access.contains("Path=/api/"));
    assert!(refresh.contains("Path=/api/v1/auth/"));

    let body = body_json(response).await;
    assert!(body["accessToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refreshToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["exp"].as_i64().is_some());

    // the code is mailed to the new owner
    assert!(app
        .email
        .last_code("owner@acme.test", EmailKind::Verification)
        .is_some());
}

#[tokio::test]
async fn register_twice_asks_to_login() {
    let app = TestApp::spawn().await;
    app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "email": "owner@acme.test",
                "password": PASSWORD,
                "userName": "Owner",
                "organizationName": "Acme Again",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Account already exists, please login"
    );
}

#[tokio::test]
async fn rejected_captcha_blocks_login() {
    let app = TestApp::spawn_with_captcha(false).await;
    let response = app.login("nobody@acme.test", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Captcha validation failed");
}

#[tokio::test]
async fn login_checks_password() {
    let app = TestApp::spawn().await;
    app.register("owner@acme.test", "Acme").await;

    let response = app.login("owner@acme.test", "wrong password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid credentials");

    let response = app.login("OWNER@acme.test", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = session_from(&response);
    assert!(!session.access_token.is_empty());
    assert_eq!(body_json(response).await["message"], "Login success");
}

#[tokio::test]
async fn refresh_reissues_both_cookies() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(Method::GET, "/api/v1/auth/refresh", Some(&session), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let renewed = session_from(&response);
    assert!(!renewed.access_token.is_empty());
    assert!(!renewed.refresh_token.is_empty());

    let response = app
        .request(Method::GET, "/api/v1/users/me", Some(&renewed), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_without_cookie_is_bad_request() {
    let app = TestApp::spawn().await;
    let response = app
        .request(Method::GET, "/api/v1/auth/refresh", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing Cookie");
}

#[tokio::test]
async fn refresh_rejects_an_access_token() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;
    let swapped = Session {
        access_token: String::new(),
        refresh_token: session.access_token.clone(),
    };

    let response = app
        .request(Method::GET, "/api/v1/auth/refresh", Some(&swapped), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookies() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(Method::POST, "/api/v1/auth/logout", Some(&session), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cleared = session_from(&response);
    assert!(cleared.access_token.is_empty());
    assert!(cleared.refresh_token.is_empty());
    assert_eq!(set_cookies(&response).len(), 2);
}

#[tokio::test]
async fn confirmation_code_is_single_use() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;
    let code = app
        .email
        .last_code("owner@acme.test", EmailKind::Verification)
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/otp/validate",
            Some(&session),
            Some(json!({ "otp": code })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let me = body_json(
        app.request(Method::GET, "/api/v1/users/me", Some(&session), None)
            .await,
    )
    .await;
    assert_eq!(me["confirmed"], true);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/otp/validate",
            Some(&session),
            Some(json!({ "otp": code })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid OTP");
}

#[tokio::test]
async fn new_code_within_a_minute_is_refused() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(Method::POST, "/api/v1/auth/otp/send", Some(&session), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Please wait 1 minute before requesting another OTP"
    );
}

#[tokio::test]
async fn password_recovery_round() {
    let app = TestApp::spawn().await;
    app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password/recover",
            None,
            Some(json!({ "email": "ghost@acme.test", "captchaToken": "token" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app
        .email
        .last_code("ghost@acme.test", EmailKind::PasswordReset)
        .is_none());

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password/recover",
            None,
            Some(json!({ "email": "owner@acme.test", "captchaToken": "token" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let code = app
        .email
        .last_code("owner@acme.test", EmailKind::PasswordReset)
        .expect("reset code mailed");

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password/reset",
            None,
            Some(json!({ "email": "owner@acme.test", "otp": "zzzz", "newPassword": "brand new secret" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password/reset",
            None,
            Some(json!({ "email": "owner@acme.test", "otp": code, "newPassword": "brand new secret" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "Password updated");

    assert_eq!(
        app.login("owner@acme.test", PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login("owner@acme.test", "brand new secret").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn change_password_requires_current_one() {
    let app = TestApp::spawn().await;
    let session = app.register("owner@acme.test", "Acme").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password",
            Some(&session),
            Some(json!({ "currentPassword": "not it", "newPassword": "another secret" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/password",
            Some(&session),
            Some(json!({ "currentPassword": PASSWORD, "newPassword": "another secret" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.login("owner@acme.test", "another secret").await.status(),
        StatusCode::OK
    );
}
