use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    entities::{
        order::{self, OrderPaymentStatus},
        Order, Product, User,
    },
    errors::ServiceError,
};

/// Dashboard counters for the admin console
#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_products: u64,
    pub paid_orders: u64,
    pub total_revenue: Decimal,
}

/// Store-wide aggregates for the admin console.
#[derive(Clone)]
pub struct AdminService {
    db: Arc<DatabaseConnection>,
}

impl AdminService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Revenue counts only paid orders; pending and failed checkouts are
    /// invisible here.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<AdminStats, ServiceError> {
        let total_users = User::find().count(&*self.db).await?;
        let total_products = Product::find().count(&*self.db).await?;

        let paid = Order::find()
            .filter(order::Column::PaymentStatus.eq(OrderPaymentStatus::Paid))
            .all(&*self.db)
            .await?;

        let paid_orders = paid.len() as u64;
        let total_revenue = paid.iter().map(|o| o.total).sum();

        Ok(AdminStats {
            total_users,
            total_products,
            paid_orders,
            total_revenue,
        })
    }
}
