use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, product, Cart, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// One cart line joined with its current catalog entry
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: product::Model,
}

/// A user's cart as returned to the frontend. Lines whose product no longer
/// exists in the catalog are omitted.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
}

/// Shopping cart service. Each user owns at most one cart, created lazily on
/// the first add.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// The user's cart with product details; empty view when no cart exists.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let Some(cart_row) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(CartView { items: Vec::new() });
        };

        let lines = cart_row.find_related(CartItem).all(&*self.db).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(product) = Product::find_by_id(line.product_id).one(&*self.db).await? {
                items.push(CartLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product,
                });
            }
        }

        Ok(CartView { items })
    }

    /// Add a product to the user's cart, incrementing the quantity when the
    /// product is already in it.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", product_id)))?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let cart_row = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(existing) => {
                let mut update: cart::ActiveModel = existing.clone().into();
                update.updated_at = Set(now);
                update.update(&txn).await?;
                existing
            }
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let existing_line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing_line {
            Some(line) => {
                let current = line.quantity;
                let mut update: cart_item::ActiveModel = line.into();
                update.quantity = Set(current + quantity);
                update.updated_at = Set(now);
                update.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_row.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart_row.id,
                product_id,
            })
            .await;

        info!(cart_id = %cart_row.id, product_id = %product_id, quantity, "Added item to cart");
        Ok(())
    }

    /// Remove a product's line from the user's cart. Removing a product that
    /// is not in the cart is a no-op; a missing cart is an error.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let cart_row = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("cart is empty".to_string()))?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart_row.id,
                product_id,
            })
            .await;

        Ok(())
    }

    /// Delete the user's cart and all its lines; succeeds even when no cart
    /// exists.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart_row) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        let cart_id = cart_row.id;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&*self.db)
            .await?;
        cart_row.delete(&*self.db).await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;

        Ok(())
    }
}
