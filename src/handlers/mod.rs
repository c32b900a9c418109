use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        admin::AdminService,
        carts::CartService,
        catalog::CatalogService,
        checkout::CheckoutService,
        gateway::PaymentGateway,
        newsletter::{EmailSender, NewsletterService},
        orders::OrderService,
        uploads::UploadService,
        users::UserService,
    },
};

pub mod admin;
pub mod auth;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
pub mod uploads;

/// Aggregated services used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub admin: Arc<AdminService>,
    pub newsletter: Arc<NewsletterService>,
    pub uploads: Arc<UploadService>,
}

impl AppServices {
    /// Build the service container. The payment gateway and email sender are
    /// injected so tests can substitute doubles for the external systems.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth: Arc<AuthService>,
        gateway: Arc<dyn PaymentGateway>,
        email_sender: Arc<dyn EmailSender>,
        config: &AppConfig,
    ) -> Self {
        let users = Arc::new(UserService::new(
            db.clone(),
            event_sender.clone(),
            auth.clone(),
        ));
        let catalog = Arc::new(CatalogService::new(db.clone(), event_sender.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            config.currency.clone(),
        ));
        let orders = Arc::new(OrderService::new(db.clone()));
        let admin = Arc::new(AdminService::new(db.clone()));
        let newsletter = Arc::new(NewsletterService::new(
            db.clone(),
            email_sender,
            event_sender,
        ));
        let uploads = Arc::new(UploadService::new(
            config.upload_dir.clone(),
            config.upload_max_bytes,
        ));

        Self {
            users,
            catalog,
            cart,
            checkout,
            orders,
            admin,
            newsletter,
            uploads,
        }
    }
}
