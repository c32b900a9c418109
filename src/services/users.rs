use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, AuthService},
    entities::{
        cart, cart_item, email_verification_token,
        user::{self, UserRole},
        Cart, CartItem, EmailVerificationToken, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

/// Registration input
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// Outcome of a successful registration. The verification token is returned
/// to the caller because email delivery transport is out of scope; the real
/// deployment mails a link built from it.
#[derive(Debug, Serialize)]
pub struct Registration {
    pub user_id: Uuid,
    pub verification_token: String,
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub email_verified: bool,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            address: model.address,
            email_verified: model.email_verified,
            role: model.role,
            created_at: model.created_at,
        }
    }
}

/// Successful login: bearer token plus the profile it represents
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Identity service: registration, email verification, login, profiles and
/// the admin-side account operations.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth,
        }
    }

    /// Register a new customer account and create its verification token.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<Registration, ServiceError> {
        input.validate()?;

        let existing = User::find()
            .filter(user::Column::Email.eq(input.email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "this email address is already in use".to_string(),
            ));
        }

        let user_id = Uuid::new_v4();
        let now = Utc::now();

        user::ActiveModel {
            id: Set(user_id),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            email: Set(input.email),
            address: Set(input.address),
            password_hash: Set(hash_password(&input.password)?),
            email_verified: Set(false),
            role: Set(UserRole::Customer),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        let token = Uuid::new_v4().to_string();
        email_verification_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            token: Set(token.clone()),
            expires_at: Set(now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(user_id))
            .await;

        info!(user_id = %user_id, "User registered");
        Ok(Registration {
            user_id,
            verification_token: token,
        })
    }

    /// Mark a user's email verified and consume the token.
    #[instrument(skip(self, token))]
    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        let record = EmailVerificationToken::find()
            .filter(email_verification_token::Column::Token.eq(token))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("invalid verification token".to_string())
            })?;

        if Utc::now() > record.expires_at {
            return Err(ServiceError::ValidationError(
                "verification token expired".to_string(),
            ));
        }

        let user_id = record.user_id;
        let user_row = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))?;

        let mut update: user::ActiveModel = user_row.into();
        update.email_verified = Set(true);
        update.update(&*self.db).await?;

        record.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserVerified(user_id))
            .await;

        Ok(())
    }

    /// Authenticate with email and password; returns a bearer token.
    /// A single error message covers both unknown email and wrong password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        let user_row = User::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::AuthError("invalid email or password".to_string()))?;

        verify_password(password, &user_row.password_hash)?;

        if !user_row.email_verified {
            return Err(ServiceError::Forbidden(
                "please verify your email before logging in".to_string(),
            ));
        }

        let token = self.auth.generate_token(&user_row)?;

        Ok(LoginResponse {
            token,
            user: user_row.into(),
        })
    }

    /// Fetch one profile
    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let user_row = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))?;

        Ok(user_row.into())
    }

    /// All accounts, newest first (admin)
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ServiceError> {
        let users = User::find()
            .order_by_desc(user::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    /// Change an account's role (admin). Admins cannot change their own role,
    /// so the store can never lose its last administrator by accident.
    #[instrument(skip(self))]
    pub async fn set_role(
        &self,
        acting_admin: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<UserProfile, ServiceError> {
        let role = UserRole::from_str(role)
            .map_err(|_| ServiceError::ValidationError(format!("invalid role value: {}", role)))?;

        if user_id == acting_admin {
            return Err(ServiceError::ValidationError(
                "administrators cannot change their own role".to_string(),
            ));
        }

        let user_row = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))?;

        let mut update: user::ActiveModel = user_row.into();
        update.role = Set(role);
        let updated = update.update(&*self.db).await?;

        info!(user_id = %user_id, role = %role, "User role changed");
        Ok(updated.into())
    }

    /// Delete an account and its cart (admin). Self-deletion is rejected.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, acting_admin: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        if user_id == acting_admin {
            return Err(ServiceError::ValidationError(
                "administrators cannot delete their own account".to_string(),
            ));
        }

        let user_row = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))?;

        if let Some(cart_row) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart_row.id))
                .exec(&*self.db)
                .await?;
            cart_row.delete(&*self.db).await?;
        }

        EmailVerificationToken::delete_many()
            .filter(email_verification_token::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        user_row.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserDeleted(user_id))
            .await;

        Ok(())
    }
}
