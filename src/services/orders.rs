use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, OrderPaymentStatus},
        order_item, Order, OrderItem,
    },
    errors::ServiceError,
};

/// One immutable order line as returned to the caller
#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub download_url: String,
}

impl From<order_item::Model> for OrderItemView {
    fn from(model: order_item::Model) -> Self {
        Self {
            product_id: model.product_id,
            title: model.title,
            unit_price: model.unit_price,
            quantity: model.quantity,
            download_url: model.download_url,
        }
    }
}

/// Order with its line-item snapshot
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: Decimal,
    pub currency: String,
    pub session_id: Option<String>,
    pub payment_status: OrderPaymentStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

/// Order history service. Orders are written by the checkout orchestrator
/// and immutable once paid; this service only reads them.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn with_items(&self, order_row: order::Model) -> Result<OrderView, ServiceError> {
        let items = order_row.find_related(OrderItem).all(&*self.db).await?;

        Ok(OrderView {
            id: order_row.id,
            user_id: order_row.user_id,
            total: order_row.total,
            currency: order_row.currency,
            session_id: order_row.session_id,
            payment_status: order_row.payment_status,
            created_at: order_row.created_at,
            items: items.into_iter().map(OrderItemView::from).collect(),
        })
    }

    /// A user's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order_row in orders {
            views.push(self.with_items(order_row).await?);
        }
        Ok(views)
    }

    /// One order, scoped to its owner. Not-found covers both a missing order
    /// and an order belonging to someone else.
    #[instrument(skip(self))]
    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let order_row = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        self.with_items(order_row).await
    }

    /// Every order in the store, newest first (admin)
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order_row in orders {
            views.push(self.with_items(order_row).await?);
        }
        Ok(views)
    }
}
