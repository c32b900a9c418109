use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{auth::AuthUser, errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use validator::Validate;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/create-session", post(create_session))
        .route("/status/{session_id}", get(checkout_status))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    /// Origin of the storefront; success/cancel URLs are derived from it
    #[validate(url)]
    pub origin_url: String,
}

/// Open a hosted checkout session for the user's cart
async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let session = state
        .services
        .checkout
        .create_session(user.user_id, &payload.origin_url)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(session))
}

/// Poll the payment status of a session the user owns
async fn checkout_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .services
        .checkout
        .poll_status(user.user_id, &session_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(status))
}
