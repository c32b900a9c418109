#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use soundcrate_api::{
    auth::{hash_password, AuthService},
    config::AppConfig,
    db,
    entities::{
        product::{self, ProductKind},
        user::{self, UserRole},
    },
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        gateway::{
            HostedSession, OpenSessionRequest, PaymentGateway, SessionPaymentStatus, SessionState,
            SessionStatus, WebhookEvent,
        },
        newsletter::EmailSender,
    },
    AppState,
};

pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// In-memory stand-in for the hosted-checkout provider. Records every
/// `get_status` call so tests can prove the paid fast-path short-circuit.
#[derive(Default)]
pub struct MockGateway {
    sessions: Mutex<HashMap<String, SessionStatus>>,
    status_calls: AtomicUsize,
    fail_next_open: AtomicBool,
}

impl MockGateway {
    /// Flip the provider-side state of a session to complete/paid.
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            session_id.to_string(),
            SessionStatus {
                status: SessionState::Complete,
                payment_status: SessionPaymentStatus::Paid,
            },
        );
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Make the next open_session call fail like a provider outage.
    pub fn fail_next_open(&self) {
        self.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// A webhook payload the mock's verify_webhook accepts with signature
    /// `VALID_SIGNATURE`.
    pub fn webhook_payload(session_id: &str, payment_status: &str) -> Vec<u8> {
        serde_json::json!({
            "session_id": session_id,
            "payment_status": payment_status,
        })
        .to_string()
        .into_bytes()
    }
}

pub const VALID_SIGNATURE: &str = "t=0,v1=valid";

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn open_session(
        &self,
        _request: OpenSessionRequest,
    ) -> Result<HostedSession, ServiceError> {
        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "provider unavailable".to_string(),
            ));
        }

        let session_id = format!("cs_test_{}", Uuid::new_v4().simple());
        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            SessionStatus {
                status: SessionState::Open,
                payment_status: SessionPaymentStatus::Unpaid,
            },
        );

        Ok(HostedSession {
            checkout_url: format!("https://pay.example.com/c/{}", session_id),
            session_id,
        })
    }

    async fn get_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("session {} unknown", session_id)))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ServiceError> {
        if signature_header != VALID_SIGNATURE {
            return Err(ServiceError::InvalidSignature(
                "signature mismatch".to_string(),
            ));
        }

        let json: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook json: {}", e)))?;

        Ok(WebhookEvent {
            session_id: json["session_id"].as_str().unwrap_or_default().to_string(),
            payment_status: if json["payment_status"] == "paid" {
                SessionPaymentStatus::Paid
            } else {
                SessionPaymentStatus::Unpaid
            },
        })
    }
}

/// Email sender that records instead of delivering.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmailSender {
    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Helper harness for spinning up an application state backed by an
/// in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub gateway: Arc<MockGateway>,
    pub mailer: Arc<RecordingEmailSender>,
    _upload_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let upload_dir = tempfile::tempdir().expect("failed to create upload dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            24,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps every query on the same
        // in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.upload_dir = upload_dir.path().to_string_lossy().into_owned();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(&cfg.jwt_secret, cfg.jwt_expiration_hours));
        let gateway = Arc::new(MockGateway::default());
        let mailer = Arc::new(RecordingEmailSender::default());

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            auth.clone(),
            gateway.clone(),
            mailer.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            auth,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", soundcrate_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            gateway,
            mailer,
            _upload_dir: upload_dir,
            _event_task: event_task,
        }
    }

    /// Insert an account directly, bypassing the registration flow.
    pub async fn create_user(&self, email: &str, role: UserRole, verified: bool) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set("Test".to_string()),
            last_name: Set("User".to_string()),
            email: Set(email.to_string()),
            address: Set("1 Test Lane".to_string()),
            password_hash: Set(hash_password(TEST_PASSWORD).expect("hashing failed")),
            email_verified: Set(verified),
            role: Set(role),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert test user")
    }

    /// Insert a catalog entry directly.
    pub async fn create_product(&self, title: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            artist: Set("Test Artist".to_string()),
            kind: Set(ProductKind::Single),
            price: Set(price),
            image_url: Set("https://img.example.com/cover.jpg".to_string()),
            audio_preview_url: Set("https://cdn.example.com/preview.mp3".to_string()),
            audio_file_url: Set(format!(
                "https://cdn.example.com/{}.mp3",
                title.to_lowercase().replace(' ', "-")
            )),
            description: Set(format!("{} description", title)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert test product")
    }

    /// Bearer token for a user, as the login endpoint would mint it.
    pub fn bearer(&self, account: &user::Model) -> String {
        self.state
            .auth
            .generate_token(account)
            .expect("failed to generate token")
    }
}
