mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use soundcrate_api::{entities::user::UserRole, errors::ServiceError};
use uuid::Uuid;

#[tokio::test]
async fn empty_cart_is_an_empty_view() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;

    let view = app.state.services.cart.get_cart(user.id).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn adding_a_product_creates_the_cart_lazily() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(2.99)).await;

    app.state
        .services
        .cart
        .add_item(user.id, product.id, 1)
        .await
        .unwrap();

    let view = app.state.services.cart.get_cart(user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 1);
    assert_eq!(view.items[0].product.title, "Summer Vibes");
}

#[tokio::test]
async fn re_adding_a_product_increments_its_quantity() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(2.99)).await;

    let carts = &app.state.services.cart;
    carts.add_item(user.id, product.id, 2).await.unwrap();
    carts.add_item(user.id, product.id, 3).await.unwrap();

    let view = carts.get_cart(user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 5);
}

#[tokio::test]
async fn adding_an_unknown_product_fails() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;

    let err = app
        .state
        .services
        .cart
        .add_item(user.id, Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(2.99)).await;

    let err = app
        .state
        .services
        .cart
        .add_item(user.id, product.id, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn removing_a_product_leaves_the_rest() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let keep = app.create_product("Keeper", dec!(2.99)).await;
    let dropped = app.create_product("Dropped", dec!(1.99)).await;

    let carts = &app.state.services.cart;
    carts.add_item(user.id, keep.id, 1).await.unwrap();
    carts.add_item(user.id, dropped.id, 1).await.unwrap();
    carts.remove_item(user.id, dropped.id).await.unwrap();

    let view = carts.get_cart(user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, keep.id);
}

#[tokio::test]
async fn removing_from_a_missing_cart_fails() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(2.99)).await;

    let err = app
        .state
        .services
        .cart
        .remove_item(user.id, product.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn clear_deletes_the_cart_and_is_idempotent() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let product = app.create_product("Summer Vibes", dec!(2.99)).await;

    let carts = &app.state.services.cart;
    carts.add_item(user.id, product.id, 1).await.unwrap();
    carts.clear(user.id).await.unwrap();
    carts.clear(user.id).await.unwrap();

    let view = carts.get_cart(user.id).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn vanished_products_are_omitted_from_the_view() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@example.com", UserRole::Customer, true).await;
    let keep = app.create_product("Keeper", dec!(2.99)).await;
    let gone = app.create_product("Gone", dec!(1.99)).await;

    let carts = &app.state.services.cart;
    carts.add_item(user.id, keep.id, 1).await.unwrap();
    carts.add_item(user.id, gone.id, 1).await.unwrap();
    app.state
        .services
        .catalog
        .delete_product(gone.id)
        .await
        .unwrap();

    let view = carts.get_cart(user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, keep.id);
}
