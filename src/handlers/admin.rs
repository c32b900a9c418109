use crate::handlers::common::{map_service_error, no_content_response, success_response};
use crate::{
    auth::AdminUser,
    errors::ApiError,
    services::{catalog::UpdateProductInput, newsletter::NewsletterInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Creates the router for the admin console API. Every route requires the
/// admin role via the `AdminUser` extractor.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/users", get(list_users))
        .route("/users/{id}/role", patch(set_user_role))
        .route("/users/{id}", delete(delete_user))
        .route("/products/{id}", put(update_product).delete(delete_product))
        .route("/orders", get(list_orders))
        .route("/send-newsletter", post(send_newsletter))
        .route("/seed-products", post(seed_products))
}

/// Dashboard counters
async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .services
        .admin
        .stats()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(stats))
}

/// All accounts
async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .services
        .users
        .list_users()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(users))
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: String,
}

/// Change an account's role
async fn set_user_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .set_role(admin.0.user_id, id, &query.role)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}

/// Delete an account and its cart
async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .delete_user(admin.0.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Update a catalog entry
async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Delete a catalog entry
async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Every order in the store
async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .list_all()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// Broadcast a newsletter to all or verified-only accounts
async fn send_newsletter(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<NewsletterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .newsletter
        .broadcast(payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(report))
}

/// Replace the catalog with the bundled demo releases
async fn seed_products(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .services
        .catalog
        .seed_demo_catalog()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "message": format!("{} products created", count)
    })))
}
