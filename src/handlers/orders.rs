use crate::handlers::common::{map_service_error, success_response};
use crate::{auth::AuthUser, errors::ApiError, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Creates the router for order history endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
}

/// The authenticated user's orders, newest first
async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .list_for_user(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// One of the user's orders with its line-item snapshot
async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_for_user(user.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
