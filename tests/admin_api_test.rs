mod common;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{MockGateway, TestApp, VALID_SIGNATURE};
use rust_decimal_macros::dec;
use soundcrate_api::{
    entities::user::UserRole,
    errors::ServiceError,
    services::newsletter::{Audience, NewsletterInput},
};
use tower::ServiceExt;

#[tokio::test]
async fn admin_routes_reject_customers() {
    let app = TestApp::new().await;
    let customer = app.create_user("user@example.com", UserRole::Customer, true).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/admin/stats")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", app.bearer(&customer)),
        )
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_routes_reject_anonymous_callers() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/admin/users")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stats_count_only_paid_orders() {
    let app = TestApp::new().await;
    let buyer = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    app.create_user("admin@example.com", UserRole::Admin, true).await;
    let product = app.create_product("Summer Vibes", dec!(9.99)).await;

    // One paid order
    app.state
        .services
        .cart
        .add_item(buyer.id, product.id, 2)
        .await
        .unwrap();
    let session = app
        .state
        .services
        .checkout
        .create_session(buyer.id, "https://shop.example.com")
        .await
        .unwrap();
    app.gateway.mark_paid(&session.session_id);
    app.state
        .services
        .checkout
        .handle_webhook(
            &MockGateway::webhook_payload(&session.session_id, "paid"),
            VALID_SIGNATURE,
        )
        .await
        .unwrap();

    // One order still pending
    app.state
        .services
        .cart
        .add_item(buyer.id, product.id, 1)
        .await
        .unwrap();
    app.state
        .services
        .checkout
        .create_session(buyer.id, "https://shop.example.com")
        .await
        .unwrap();

    let stats = app.state.services.admin.stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_products, 1);
    assert_eq!(stats.paid_orders, 1);
    assert_eq!(stats.total_revenue, dec!(19.98));
}

#[tokio::test]
async fn role_change_validates_and_protects_the_acting_admin() {
    let app = TestApp::new().await;
    let admin = app.create_user("admin@example.com", UserRole::Admin, true).await;
    let customer = app.create_user("user@example.com", UserRole::Customer, true).await;
    let users = &app.state.services.users;

    // Promote
    let promoted = users
        .set_role(admin.id, customer.id, "admin")
        .await
        .unwrap();
    assert_eq!(promoted.role, UserRole::Admin);

    // Bad role value
    let err = users
        .set_role(admin.id, customer.id, "superuser")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Self-demotion is blocked
    let err = users.set_role(admin.id, admin.id, "customer").await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn deleting_a_user_removes_their_cart() {
    let app = TestApp::new().await;
    let admin = app.create_user("admin@example.com", UserRole::Admin, true).await;
    let customer = app.create_user("user@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(9.99)).await;

    app.state
        .services
        .cart
        .add_item(customer.id, product.id, 1)
        .await
        .unwrap();

    app.state
        .services
        .users
        .delete_user(admin.id, customer.id)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .users
        .profile(customer.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Admins cannot delete themselves
    let err = app
        .state
        .services
        .users
        .delete_user(admin.id, admin.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn newsletter_targets_the_requested_audience() {
    let app = TestApp::new().await;
    app.create_user("verified@example.com", UserRole::Customer, true).await;
    app.create_user("unverified@example.com", UserRole::Customer, false).await;

    let report = app
        .state
        .services
        .newsletter
        .broadcast(NewsletterInput {
            subject: "New releases".to_string(),
            message: "Fresh singles this week".to_string(),
            send_to: Audience::Verified,
        })
        .await
        .unwrap();

    assert_eq!(report.recipients, 1);
    assert_eq!(app.mailer.recipients(), vec!["verified@example.com"]);

    let report = app
        .state
        .services
        .newsletter
        .broadcast(NewsletterInput {
            subject: "New releases".to_string(),
            message: "Fresh singles this week".to_string(),
            send_to: Audience::All,
        })
        .await
        .unwrap();

    assert_eq!(report.recipients, 2);
}

#[tokio::test]
async fn newsletter_rejects_empty_subject() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .newsletter
        .broadcast(NewsletterInput {
            subject: String::new(),
            message: "body".to_string(),
            send_to: Audience::All,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn product_update_and_delete_round_trip() {
    let app = TestApp::new().await;
    let product = app.create_product("Old Title", dec!(9.99)).await;
    let catalog = &app.state.services.catalog;

    let updated = catalog
        .update_product(
            product.id,
            serde_json::from_value(serde_json::json!({
                "title": "New Title",
                "price": "12.49",
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "New Title");
    assert_eq!(updated.price, dec!(12.49));
    assert_eq!(updated.artist, product.artist);

    catalog.delete_product(product.id).await.unwrap();
    let err = catalog.get_product(product.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
