use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    entities::{user, User},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Outbound email transport. Delivery mechanics are out of scope for this
/// service; the default sender only records the send in the logs.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

/// Tracing-backed sender used outside of a real mail integration
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        info!(recipient, subject, "Newsletter email dispatched");
        Ok(())
    }
}

/// Who a broadcast goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    All,
    Verified,
}

impl Default for Audience {
    fn default() -> Self {
        Audience::All
    }
}

/// Newsletter broadcast input
#[derive(Debug, Deserialize, Validate)]
pub struct NewsletterInput {
    #[validate(length(min = 1))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub send_to: Audience,
}

/// Broadcast result
#[derive(Debug, Serialize)]
pub struct NewsletterReport {
    pub recipients: usize,
}

/// Newsletter broadcast service for the admin console.
#[derive(Clone)]
pub struct NewsletterService {
    db: Arc<DatabaseConnection>,
    sender: Arc<dyn EmailSender>,
    event_sender: Arc<EventSender>,
}

impl NewsletterService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sender: Arc<dyn EmailSender>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            sender,
            event_sender,
        }
    }

    /// Send a newsletter to every targeted account. Individual delivery
    /// failures are logged and skipped; the report counts successful sends.
    #[instrument(skip(self, input), fields(subject = %input.subject, audience = ?input.send_to))]
    pub async fn broadcast(&self, input: NewsletterInput) -> Result<NewsletterReport, ServiceError> {
        input.validate()?;

        let mut query = User::find();
        if input.send_to == Audience::Verified {
            query = query.filter(user::Column::EmailVerified.eq(true));
        }
        let users = query.all(&*self.db).await?;

        let mut recipients = 0;
        for account in &users {
            match self
                .sender
                .send(&account.email, &input.subject, &input.message)
                .await
            {
                Ok(()) => recipients += 1,
                Err(e) => warn!(email = %account.email, error = %e, "Newsletter delivery failed"),
            }
        }

        self.event_sender
            .send_or_log(Event::NewsletterSent { recipients })
            .await;

        info!(recipients, targeted = users.len(), "Newsletter broadcast finished");
        Ok(NewsletterReport { recipients })
    }
}
