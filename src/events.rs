use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where a payment reconciliation signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationSource {
    Poll,
    Webhook,
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Identity events
    UserRegistered(Uuid),
    UserVerified(Uuid),
    UserDeleted(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // Cart events
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Checkout and payment events
    CheckoutStarted { order_id: Uuid, session_id: String },
    PaymentReconciled {
        order_id: Uuid,
        session_id: String,
        source: ReconciliationSource,
    },

    // Newsletter events
    NewsletterSent { recipients: usize },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Event delivery is best-effort; losing one must never fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Processes incoming events from the channel until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::UserRegistered(user_id) => {
                info!(user_id = %user_id, "User registered");
            }
            Event::UserVerified(user_id) => {
                info!(user_id = %user_id, "User verified their email");
            }
            Event::UserDeleted(user_id) => {
                info!(user_id = %user_id, "User deleted");
            }
            Event::ProductCreated(product_id) => {
                info!(product_id = %product_id, "Product created");
            }
            Event::ProductUpdated(product_id) => {
                info!(product_id = %product_id, "Product updated");
            }
            Event::ProductDeleted(product_id) => {
                info!(product_id = %product_id, "Product deleted");
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "Cart item added");
            }
            Event::CartItemRemoved {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "Cart item removed");
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "Cart cleared");
            }
            Event::CheckoutStarted {
                order_id,
                session_id,
            } => {
                info!(order_id = %order_id, session_id = %session_id, "Checkout session opened");
            }
            Event::PaymentReconciled {
                order_id,
                session_id,
                source,
            } => {
                info!(
                    order_id = %order_id,
                    session_id = %session_id,
                    source = ?source,
                    "Payment reconciled"
                );
            }
            Event::NewsletterSent { recipients } => {
                info!(recipients, "Newsletter broadcast finished");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let sender = EventSender::new(tx);
        // Must not panic or error out
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
        assert!(sender.send(Event::UserRegistered(Uuid::new_v4())).await.is_err());
    }
}
