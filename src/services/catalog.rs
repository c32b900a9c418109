use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        product::{self, ProductKind},
        Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input for creating a catalog entry
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub artist: String,
    pub kind: ProductKind,
    pub price: Decimal,
    pub image_url: String,
    pub audio_preview_url: String,
    pub audio_file_url: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for a catalog entry; absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub kind: Option<ProductKind>,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub audio_preview_url: Option<String>,
    pub audio_file_url: Option<String>,
    pub description: Option<String>,
}

/// Product catalog service. Read-mostly; the catalog is authoritative for
/// prices only at order-creation time.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// All products, newest first
    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", id)))
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be greater than zero".to_string(),
            ));
        }

        let product_id = Uuid::new_v4();
        let created = product::ActiveModel {
            id: Set(product_id),
            title: Set(input.title),
            artist: Set(input.artist),
            kind: Set(input.kind),
            price: Set(input.price),
            image_url: Set(input.image_url),
            audio_preview_url: Set(input.audio_preview_url),
            audio_file_url: Set(input.audio_file_url),
            description: Set(input.description),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(product_id = %product_id, "Product created");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    pub async fn update_product(
        &self,
        id: Uuid,
        changes: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;

        if let Some(price) = changes.price {
            if price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must be greater than zero".to_string(),
                ));
            }
        }

        let mut update: product::ActiveModel = existing.into();
        if let Some(title) = changes.title {
            update.title = Set(title);
        }
        if let Some(artist) = changes.artist {
            update.artist = Set(artist);
        }
        if let Some(kind) = changes.kind {
            update.kind = Set(kind);
        }
        if let Some(price) = changes.price {
            update.price = Set(price);
        }
        if let Some(image_url) = changes.image_url {
            update.image_url = Set(image_url);
        }
        if let Some(audio_preview_url) = changes.audio_preview_url {
            update.audio_preview_url = Set(audio_preview_url);
        }
        if let Some(audio_file_url) = changes.audio_file_url {
            update.audio_file_url = Set(audio_file_url);
        }
        if let Some(description) = changes.description {
            update.description = Set(description);
        }

        let updated = update.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(id))
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_product(id).await?;
        existing.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;

        Ok(())
    }

    /// Replace the catalog with the bundled demo releases (dev/admin tooling).
    #[instrument(skip(self))]
    pub async fn seed_demo_catalog(&self) -> Result<usize, ServiceError> {
        Product::delete_many().exec(&*self.db).await?;

        let demo: [(&str, &str, ProductKind, Decimal, u8); 6] = [
            ("Midnight Dreams", "DJ Shadow", ProductKind::Album, dec!(15.99), 1),
            ("Summer Vibes", "The Sunsets", ProductKind::Single, dec!(2.99), 2),
            ("Urban Rhythm", "MC Flow", ProductKind::Album, dec!(12.99), 3),
            ("Acoustic Sessions", "Sarah Woods", ProductKind::Single, dec!(1.99), 4),
            ("Electronic Fusion", "Synth Masters", ProductKind::Album, dec!(18.99), 5),
            ("Jazz Nights", "The Quartet", ProductKind::Album, dec!(14.99), 6),
        ];

        for (title, artist, kind, price, track) in demo {
            let audio_url =
                format!("https://www.soundhelix.com/examples/mp3/SoundHelix-Song-{}.mp3", track);
            product::ActiveModel {
                id: Set(Uuid::new_v4()),
                title: Set(title.to_string()),
                artist: Set(artist.to_string()),
                kind: Set(kind),
                price: Set(price),
                image_url: Set(format!(
                    "https://images.soundcrate.io/covers/demo-{}.jpg",
                    track
                )),
                audio_preview_url: Set(audio_url.clone()),
                audio_file_url: Set(audio_url),
                description: Set(format!("{} by {}", title, artist)),
                created_at: Set(Utc::now()),
            }
            .insert(&*self.db)
            .await?;
        }

        info!("Seeded demo catalog");
        Ok(6)
    }
}
