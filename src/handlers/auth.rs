use crate::handlers::common::{created_response, map_service_error, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::users::RegisterInput,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

/// Creates the router for authentication endpoints
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email/{token}", get(verify_email))
        .route("/login", post(login))
        .route("/me", get(me))
}

/// Register a new account. The verification token is included in the
/// response; the deployment's mailer turns it into a verification link.
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = state
        .services
        .users
        .register(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(registration))
}

/// Confirm an email address from its verification token
async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .verify_email(&token)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "message": "email verified"
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Exchange credentials for a bearer token
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}

/// The authenticated user's profile
async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .profile(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}
