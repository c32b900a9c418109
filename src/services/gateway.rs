//! Payment gateway adapter for the hosted-checkout provider.
//!
//! The orchestrator only speaks to [`PaymentGateway`]; the Stripe-backed
//! implementation lives here together with webhook signature verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{config::GatewayConfig, errors::ServiceError};

type HmacSha256 = Hmac<Sha256>;

/// Provider-reported session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Complete,
    Expired,
}

/// Provider-reported settlement state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl SessionPaymentStatus {
    pub fn is_paid(self) -> bool {
        matches!(self, SessionPaymentStatus::Paid)
    }
}

/// Opaque metadata echoed back by the provider on every signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: Uuid,
    pub order_id: Uuid,
}

/// Request to open a hosted checkout session
#[derive(Debug, Clone)]
pub struct OpenSessionRequest {
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: SessionMetadata,
}

/// A hosted checkout session created at the provider
#[derive(Debug, Clone)]
pub struct HostedSession {
    pub session_id: String,
    pub checkout_url: String,
}

/// Live status of a hosted session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub status: SessionState,
    pub payment_status: SessionPaymentStatus,
}

/// A verified, parsed webhook notification
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub session_id: String,
    pub payment_status: SessionPaymentStatus,
}

/// Interface to the external hosted-checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session for the given amount.
    async fn open_session(&self, request: OpenSessionRequest)
        -> Result<HostedSession, ServiceError>;

    /// Fetch the live status of a session from the provider.
    async fn get_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError>;

    /// Verify a webhook payload's authenticity and parse it.
    /// Must not be trusted before this returns Ok.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ServiceError>;
}

/// Stripe-backed implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    cfg: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionBody {
    id: String,
    url: Option<String>,
    status: SessionState,
    payment_status: SessionPaymentStatus,
}

impl StripeGateway {
    pub fn new(cfg: GatewayConfig) -> Result<Self, ServiceError> {
        let timeout = Duration::from_millis(if cfg.timeout_ms > 0 {
            cfg.timeout_ms
        } else {
            15_000
        });
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::GatewayError(e.to_string()))?;

        Ok(Self { http, cfg })
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    /// The provider bills in minor units (cents); Decimal everywhere else.
    fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
        (amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::GatewayError(format!("amount {} out of range", amount))
            })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.metadata.order_id))]
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<HostedSession, ServiceError> {
        let unit_amount = Self::to_minor_units(request.amount)?;

        let form = [
            ("mode", "payment".to_string()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                "Music order".to_string(),
            ),
            ("metadata[user_id]", request.metadata.user_id.to_string()),
            ("metadata[order_id]", request.metadata.order_id.to_string()),
        ];

        let response = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.cfg.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("checkout session call: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Provider rejected checkout session");
            return Err(ServiceError::GatewayError(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let body: CheckoutSessionBody = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("invalid provider response: {}", e)))?;

        let checkout_url = body.url.ok_or_else(|| {
            ServiceError::GatewayError("provider returned a session without a URL".to_string())
        })?;

        Ok(HostedSession {
            session_id: body.id,
            checkout_url,
        })
    }

    #[instrument(skip(self))]
    async fn get_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        let response = self
            .http
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("status call: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "session {} unknown to provider",
                session_id
            )));
        }
        if !response.status().is_success() {
            return Err(ServiceError::GatewayError(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let body: CheckoutSessionBody = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("invalid provider response: {}", e)))?;

        Ok(SessionStatus {
            status: body.status,
            payment_status: body.payment_status,
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ServiceError> {
        verify_signature(
            payload,
            signature_header,
            &self.cfg.webhook_secret,
            self.cfg.webhook_tolerance_secs,
        )?;

        parse_webhook_event(payload)
    }
}

/// Verify a `t=<ts>,v1=<hex>` signature header: HMAC-SHA256 over
/// "timestamp.payload" with a bounded timestamp skew.
fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let mut ts = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().split('=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if ts.is_empty() || v1.is_empty() {
        return Err(ServiceError::InvalidSignature(
            "malformed signature header".to_string(),
        ));
    }

    let ts_i = ts
        .parse::<i64>()
        .map_err(|_| ServiceError::InvalidSignature("bad timestamp".to_string()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if constant_time_eq(&expected, v1) {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Parse a verified event payload into the session id and settlement state.
fn parse_webhook_event(payload: &[u8]) -> Result<WebhookEvent, ServiceError> {
    let json: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook json: {}", e)))?;

    let object = json
        .get("data")
        .and_then(|d| d.get("object"))
        .ok_or_else(|| ServiceError::BadRequest("webhook event without object".to_string()))?;

    let session_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::BadRequest("webhook event without session id".to_string()))?
        .to_string();

    let payment_status = match object.get("payment_status").and_then(|v| v.as_str()) {
        Some("paid") => SessionPaymentStatus::Paid,
        Some("no_payment_required") => SessionPaymentStatus::NoPaymentRequired,
        _ => SessionPaymentStatus::Unpaid,
    };

    Ok(WebhookEvent {
        session_id,
        payment_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let signed = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn event_payload(session_id: &str, payment_status: &str) -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id, "payment_status": payment_status } }
        })
        .to_string()
    }

    #[test]
    fn valid_signature_passes() {
        let payload = event_payload("cs_test_123", "paid");
        let header = sign(&payload, "whsec_test", chrono::Utc::now().timestamp());

        assert!(verify_signature(payload.as_bytes(), &header, "whsec_test", 300).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = event_payload("cs_test_123", "paid");
        let header = sign(&payload, "whsec_test", chrono::Utc::now().timestamp());
        let tampered = payload.replace("cs_test_123", "cs_test_999");

        let err = verify_signature(tampered.as_bytes(), &header, "whsec_test", 300).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = event_payload("cs_test_123", "paid");
        let header = sign(&payload, "whsec_other", chrono::Utc::now().timestamp());

        let err = verify_signature(payload.as_bytes(), &header, "whsec_test", 300).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature(_)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = event_payload("cs_test_123", "paid");
        let stale = chrono::Utc::now().timestamp() - 3600;
        let header = sign(&payload, "whsec_test", stale);

        let err = verify_signature(payload.as_bytes(), &header, "whsec_test", 300).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature(_)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let payload = event_payload("cs_test_123", "paid");
        let err =
            verify_signature(payload.as_bytes(), "not-a-signature", "whsec_test", 300).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature(_)));
    }

    #[test]
    fn parses_paid_event() {
        let payload = event_payload("cs_test_123", "paid");
        let event = parse_webhook_event(payload.as_bytes()).unwrap();
        assert_eq!(event.session_id, "cs_test_123");
        assert!(event.payment_status.is_paid());
    }

    #[test]
    fn parses_unpaid_event() {
        let payload = event_payload("cs_test_123", "unpaid");
        let event = parse_webhook_event(payload.as_bytes()).unwrap();
        assert!(!event.payment_status.is_paid());
    }

    #[test]
    fn minor_unit_conversion_rounds() {
        use rust_decimal_macros::dec;
        assert_eq!(StripeGateway::to_minor_units(dec!(19.98)).unwrap(), 1998);
        assert_eq!(StripeGateway::to_minor_units(dec!(2.999)).unwrap(), 300);
        assert_eq!(StripeGateway::to_minor_units(dec!(0.01)).unwrap(), 1);
    }
}
