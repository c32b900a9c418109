//! Authentication for the store API.
//!
//! Bearer tokens are HS256 JWTs carrying the user id, email and role.
//! Password hashing delegates to Argon2id; token mechanics to jsonwebtoken.

use std::str::FromStr;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::user::{self, UserRole},
    errors::ServiceError,
    AppState,
};

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// User's email
    pub email: String,
    /// User's role
    pub role: String,
    /// Issued at time
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

/// Issues and validates bearer tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime: Duration,
}

impl AuthService {
    pub fn new(jwt_secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_lifetime: Duration::hours(expiration_hours),
        }
    }

    /// Generate a bearer token for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_lifetime).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::JwtError(e.to_string()))
    }

    /// Validate a bearer token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::AuthError("token expired".to_string())
                }
                _ => ServiceError::AuthError("invalid token".to_string()),
            })
    }
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<(), ServiceError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| ServiceError::AuthError("invalid email or password".to_string()))?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ServiceError::AuthError("invalid email or password".to_string()))
}

/// Authenticated user data extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError("missing authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::AuthError("expected bearer token".to_string()))?
            .trim();

        let claims = state.auth.validate_token(token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::AuthError("invalid token subject".to_string()))?;
        let role = UserRole::from_str(&claims.role)
            .map_err(|_| ServiceError::ValidationError("invalid role value".to_string()))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role,
        })
    }
}

/// Extractor that additionally requires the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden(
                "administrator access required".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            first_name: "Nina".to_string(),
            last_name: "Simone".to_string(),
            email: "nina@example.com".to_string(),
            address: "12 Jazz Street".to_string(),
            password_hash: String::new(),
            email_verified: true,
            role: UserRole::Customer,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trip_preserves_claims() {
        let auth = AuthService::new("a_unit_test_secret_that_is_long_enough!!", 24);
        let user = sample_user();

        let token = auth.generate_token(&user).expect("token should issue");
        let claims = auth.validate_token(&token).expect("token should validate");

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, "customer");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn validate_rejects_token_from_other_secret() {
        let issuer = AuthService::new("secret_number_one_padded_to_length!!!!!!", 24);
        let verifier = AuthService::new("secret_number_two_padded_to_length!!!!!!", 24);

        let token = issuer.generate_token(&sample_user()).unwrap();
        assert!(verifier.validate_token(&token).is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).is_ok());
        assert!(verify_password("wrong password", &hash).is_err());
    }
}
