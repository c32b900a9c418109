use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;

use crate::{errors::ServiceError, AppState};

/// Provider-initiated payment notification. Authenticated by the signature
/// header alone; no bearer token. The body must stay raw bytes because the
/// signature covers the exact payload.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get("stripe-signature")
        .or_else(|| headers.get("x-signature"))
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ServiceError::InvalidSignature("missing signature header".to_string()))?;

    state
        .services
        .checkout
        .handle_webhook(&body, signature)
        .await?;

    Ok((StatusCode::OK, "ok"))
}
