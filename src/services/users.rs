//! User authentication: credential verification, JWT issuance and the
//! bootstrap administrator account.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::LedgerError;
use crate::models::{Identity, Role, User};
use crate::store::CardStore;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("credential processing failed")]
    Crypto,

    #[error(transparent)]
    Store(#[from] LedgerError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the authenticated user.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    jwt_secret: Secret<String>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>, jwt_secret: Secret<String>) -> Self {
        Self {
            store,
            clock,
            jwt_secret,
        }
    }

    /// Verifies the credentials and returns a signed bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let now = self.clock.now();
        let expires = now + Duration::hours(TOKEN_TTL_HOURS);
        let claims = Claims {
            sub: user.username.clone(),
            exp: expires.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes()),
        )
        .map_err(|_| AuthError::Crypto)?;

        tracing::info!(username = %user.username, "user logged in");
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        let data =
            decode::<Claims>(token, &decoding_key, &validation).map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims)
    }

    /// Resolves a bearer token to the acting identity.
    pub async fn identity_for_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.verify_token(token)?;
        let user = self
            .store
            .find_user_by_username(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        Ok(user.identity())
    }

    /// Creates the bootstrap administrator account if it is missing.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if self.store.find_user_by_username(username).await?.is_some() {
            return Ok(());
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role: Role::Admin,
        };
        self.store.insert_user(&user).await?;
        tracing::info!(username, "bootstrap administrator account created");
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Crypto)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::SystemClock;
    use crate::store::MemoryCardStore;

    fn service(store: Arc<MemoryCardStore>) -> AuthService {
        AuthService::new(
            store,
            Arc::new(SystemClock),
            Secret::new("test-secret".to_string()),
        )
    }

    #[tokio::test]
    async fn ensure_admin_creates_the_account_once() {
        let store = Arc::new(MemoryCardStore::new());
        let auth = service(store.clone());

        auth.ensure_admin("admin", "s3cret").await.unwrap();
        auth.ensure_admin("admin", "different").await.unwrap();

        let admin = store
            .find_user_by_username("admin")
            .await
            .unwrap()
            .expect("admin should exist");
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn login_round_trips_through_token_verification() {
        let store = Arc::new(MemoryCardStore::new());
        let auth = service(store);
        auth.ensure_admin("admin", "s3cret").await.unwrap();

        let token = auth.login("admin", "s3cret").await.unwrap();
        let identity = auth.identity_for_token(&token).await.unwrap();
        assert_eq!(identity.username, "admin");
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let store = Arc::new(MemoryCardStore::new());
        let auth = service(store);
        auth.ensure_admin("admin", "s3cret").await.unwrap();

        assert!(matches!(
            auth.login("admin", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("ghost", "s3cret").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let store = Arc::new(MemoryCardStore::new());
        let auth = service(store);
        assert!(matches!(
            auth.identity_for_token("not-a-token").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
