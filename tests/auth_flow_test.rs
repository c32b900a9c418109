mod common;

use assert_matches::assert_matches;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use common::{TestApp, TEST_PASSWORD};
use soundcrate_api::{
    entities::user::UserRole,
    errors::ServiceError,
    services::users::RegisterInput,
};
use tower::ServiceExt;

fn register_input(email: &str) -> RegisterInput {
    serde_json::from_value(serde_json::json!({
        "first_name": "Nina",
        "last_name": "Simone",
        "email": email,
        "address": "12 Jazz Street",
        "password": TEST_PASSWORD,
    }))
    .unwrap()
}

#[tokio::test]
async fn register_verify_login_round_trip() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let registration = users.register(register_input("nina@example.com")).await.unwrap();

    // Unverified accounts cannot log in yet
    let err = users.login("nina@example.com", TEST_PASSWORD).await.unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    users
        .verify_email(&registration.verification_token)
        .await
        .unwrap();

    let login = users.login("nina@example.com", TEST_PASSWORD).await.unwrap();
    assert_eq!(login.user.email, "nina@example.com");
    assert!(login.user.email_verified);
    assert!(!login.token.is_empty());
}

#[tokio::test]
async fn duplicate_email_registration_conflicts() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    users.register(register_input("nina@example.com")).await.unwrap();
    let err = users
        .register(register_input("nina@example.com"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_the_same_way() {
    let app = TestApp::new().await;
    app.create_user("nina@example.com", UserRole::Customer, true).await;
    let users = &app.state.services.users;

    let wrong_password = users
        .login("nina@example.com", "not the password")
        .await
        .unwrap_err();
    let unknown_email = users
        .login("nobody@example.com", TEST_PASSWORD)
        .await
        .unwrap_err();

    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let registration = users.register(register_input("nina@example.com")).await.unwrap();
    users
        .verify_email(&registration.verification_token)
        .await
        .unwrap();

    let err = users
        .verify_email(&registration.verification_token)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn unknown_verification_token_is_rejected() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .users
        .verify_email("not-a-real-token")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = TestApp::new().await;

    let input: RegisterInput = serde_json::from_value(serde_json::json!({
        "first_name": "Nina",
        "last_name": "Simone",
        "email": "nina@example.com",
        "address": "12 Jazz Street",
        "password": "short",
    }))
    .unwrap();

    let err = app.state.services.users.register(input).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn me_endpoint_requires_and_honors_bearer_token() {
    let app = TestApp::new().await;
    let user = app.create_user("nina@example.com", UserRole::Customer, true).await;

    // Without a token
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/auth/me")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With a garbage token
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/auth/me")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With a real token
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/auth/me")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", app.bearer(&user)),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let profile: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(profile["email"], "nina@example.com");
    assert!(profile.get("password_hash").is_none());
}
