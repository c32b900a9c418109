//! Checkout orchestration: turns a cart into an order, opens a hosted
//! payment session, and reconciles the payment outcome from the two
//! independent signals (client poll, provider webhook) into one consistent
//! order/transaction state.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        cart, cart_item, order,
        order::OrderPaymentStatus,
        order_item, payment_transaction,
        payment_transaction::{PaymentState, TransactionStatus},
        Cart, CartItem, Order, PaymentTransaction, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender, ReconciliationSource},
    services::gateway::{
        OpenSessionRequest, PaymentGateway, SessionMetadata, SessionPaymentStatus, SessionState,
    },
};

/// Result of a hosted checkout session creation
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub checkout_url: String,
    pub session_id: String,
    pub order_id: Uuid,
}

/// Result of a checkout status poll
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStatusResponse {
    pub status: SessionState,
    pub payment_status: SessionPaymentStatus,
    pub order_id: Uuid,
}

/// Outcome of a reconciliation attempt for one session id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This invocation won the race and applied the transition
    Applied { order_id: Uuid },
    /// The session was already paid; nothing changed
    AlreadyPaid { order_id: Uuid },
    /// No transaction is keyed by this session id
    UnknownSession,
}

/// Checkout orchestrator service
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Open a hosted checkout session for the user's cart.
    ///
    /// Cart lines are resolved against the current catalog and snapshotted
    /// into immutable order items; lines whose product vanished are silently
    /// dropped. The order is persisted before the gateway call, so a gateway
    /// failure leaves a pending order with no session id. Such an order has
    /// no transaction and can never be reconciled; this is an accepted
    /// limitation.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        origin_url: &str,
    ) -> Result<CreateSessionResponse, ServiceError> {
        let cart_row = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("cart is empty".to_string()))?;

        let lines = cart_row.find_related(CartItem).all(&*self.db).await?;
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        // Snapshot resolved lines; catalog price changes after this point
        // never affect the order.
        let mut total = Decimal::ZERO;
        let mut snapshot = Vec::new();
        for line in &lines {
            match Product::find_by_id(line.product_id).one(&*self.db).await? {
                Some(product) => {
                    total += product.price * Decimal::from(line.quantity);
                    snapshot.push((product, line.quantity));
                }
                None => {
                    warn!(
                        product_id = %line.product_id,
                        "Dropping vanished product from checkout"
                    );
                }
            }
        }

        if snapshot.is_empty() || total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "cart contains no valid products".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;
        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            total: Set(total),
            currency: Set(self.currency.clone()),
            session_id: Set(None),
            payment_status: Set(OrderPaymentStatus::Pending),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        for (product, quantity) in &snapshot {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                title: Set(product.title.clone()),
                unit_price: Set(product.price),
                quantity: Set(*quantity),
                download_url: Set(product.audio_file_url.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        let origin = origin_url.trim_end_matches('/');
        let session = self
            .gateway
            .open_session(OpenSessionRequest {
                amount: total,
                currency: self.currency.clone(),
                success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", origin),
                cancel_url: format!("{}/cart", origin),
                metadata: SessionMetadata { user_id, order_id },
            })
            .await
            .map_err(|e| {
                warn!(
                    order_id = %order_id,
                    "Gateway rejected session creation; order left pending without session id"
                );
                e
            })?;

        let mut order_update: order::ActiveModel = Default::default();
        order_update.id = Set(order_id);
        order_update.session_id = Set(Some(session.session_id.clone()));
        order_update.updated_at = Set(Some(Utc::now()));
        Order::update(order_update).exec(&*self.db).await?;

        payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.session_id.clone()),
            user_id: Set(user_id),
            order_id: Set(order_id),
            amount: Set(total),
            currency: Set(self.currency.clone()),
            status: Set(TransactionStatus::Pending),
            payment_status: Set(PaymentState::Unpaid),
            metadata: Set(Some(serde_json::json!({
                "user_id": user_id,
                "order_id": order_id,
            }))),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                order_id,
                session_id: session.session_id.clone(),
            })
            .await;

        info!(order_id = %order_id, session_id = %session.session_id, total = %total, "Checkout session opened");

        Ok(CreateSessionResponse {
            checkout_url: session.checkout_url,
            session_id: session.session_id,
            order_id,
        })
    }

    /// Poll the payment status of a session on behalf of its owner.
    ///
    /// If the transaction is already paid, returns immediately without
    /// contacting the provider. Otherwise fetches the live status and, when
    /// the provider reports paid, applies the reconciliation transition.
    #[instrument(skip(self))]
    pub async fn poll_status(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<CheckoutStatusResponse, ServiceError> {
        let record = PaymentTransaction::find()
            .filter(payment_transaction::Column::SessionId.eq(session_id))
            .filter(payment_transaction::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("transaction for session {} not found", session_id))
            })?;

        // Idempotent fast path: no provider call once paid.
        if record.payment_status == PaymentState::Paid {
            return Ok(CheckoutStatusResponse {
                status: SessionState::Complete,
                payment_status: SessionPaymentStatus::Paid,
                order_id: record.order_id,
            });
        }

        let live = self.gateway.get_status(session_id).await?;

        if live.payment_status.is_paid() {
            self.reconcile(session_id, ReconciliationSource::Poll)
                .await?;
            return Ok(CheckoutStatusResponse {
                status: live.status,
                payment_status: SessionPaymentStatus::Paid,
                order_id: record.order_id,
            });
        }

        Ok(CheckoutStatusResponse {
            status: live.status,
            payment_status: live.payment_status,
            order_id: record.order_id,
        })
    }

    /// Handle a provider webhook notification.
    ///
    /// The payload is only trusted after the gateway verified its signature.
    /// Unknown session ids are acknowledged without error so the provider
    /// stops retrying an event we can never correlate.
    #[instrument(skip(self, payload, signature_header))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<(), ServiceError> {
        let event = self.gateway.verify_webhook(payload, signature_header)?;

        if !event.payment_status.is_paid() {
            info!(
                session_id = %event.session_id,
                "Ignoring non-paid webhook event"
            );
            return Ok(());
        }

        match self
            .reconcile(&event.session_id, ReconciliationSource::Webhook)
            .await?
        {
            ReconcileOutcome::UnknownSession => {
                warn!(
                    session_id = %event.session_id,
                    "Webhook referenced unknown session; acknowledging"
                );
            }
            ReconcileOutcome::Applied { .. } | ReconcileOutcome::AlreadyPaid { .. } => {}
        }

        Ok(())
    }

    /// The reconciliation transition, shared by poll and webhook.
    ///
    /// Race-safe under duplicate invocation for the same session id: the
    /// transition is a conditional update (`payment_status != paid`) inside
    /// one database transaction, so exactly one caller wins, marks the order
    /// paid and clears the owner's cart; every other caller is a no-op.
    pub async fn reconcile(
        &self,
        session_id: &str,
        source: ReconciliationSource,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let Some(record) = PaymentTransaction::find()
            .filter(payment_transaction::Column::SessionId.eq(session_id))
            .one(&txn)
            .await?
        else {
            return Ok(ReconcileOutcome::UnknownSession);
        };

        // Set paid only if not already paid; losing this race means another
        // poll or webhook already applied the transition.
        let result = PaymentTransaction::update_many()
            .set(payment_transaction::ActiveModel {
                status: Set(TransactionStatus::Completed),
                payment_status: Set(PaymentState::Paid),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(payment_transaction::Column::SessionId.eq(session_id))
            .filter(payment_transaction::Column::PaymentStatus.ne(PaymentState::Paid))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.commit().await?;
            return Ok(ReconcileOutcome::AlreadyPaid {
                order_id: record.order_id,
            });
        }

        Order::update_many()
            .set(order::ActiveModel {
                payment_status: Set(OrderPaymentStatus::Paid),
                updated_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(record.order_id))
            .exec(&txn)
            .await?;

        if let Some(cart_row) = Cart::find()
            .filter(cart::Column::UserId.eq(record.user_id))
            .one(&txn)
            .await?
        {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart_row.id))
                .exec(&txn)
                .await?;
            cart_row.delete(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentReconciled {
                order_id: record.order_id,
                session_id: session_id.to_string(),
                source,
            })
            .await;

        info!(
            session_id = %session_id,
            order_id = %record.order_id,
            source = ?source,
            "Payment reconciled"
        );

        Ok(ReconcileOutcome::Applied {
            order_id: record.order_id,
        })
    }
}
