//! Authentication service
//!
//! Issues and validates the HS256 bearer tokens used by the HTTP surface
//! and the control channel. The control channel only consumes
//! `verify_access_token`; everything else backs the /auth HTTP routes.

pub mod ports;

pub use ports::*;

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt_secret: String,
    access_token_ttl_hours: i64,
    refresh_token_ttl_hours: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        jwt_secret: String,
        access_token_ttl_hours: i64,
        refresh_token_ttl_hours: i64,
    ) -> Self {
        Self {
            users,
            jwt_secret,
            access_token_ttl_hours,
            refresh_token_ttl_hours,
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        if password.len() < 8 {
            return Err(AuthError::WeakPassword);
        }

        if self
            .users
            .get_by_username(username)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to look up user: {e}")))?
            .is_some()
        {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash_password(password);
        self.users
            .create(username, &password_hash)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to create user: {e}")))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .users
            .get_by_username(username.trim())
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to look up user: {e}")))?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        debug!(user_id = %user.id, "Login succeeded");
        self.issue_tokens(&user)
    }

    /// Exchange a valid refresh token for a fresh token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(refresh_token)?;
        if claims.token_use != TokenUse::Refresh {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .users
            .get_by_id(claims.id)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to get user: {e}")))?
            .ok_or(AuthError::InvalidToken)?;

        self.issue_tokens(&user)
    }

    /// Validate an access token and return its claims
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims = self.decode(token)?;
        if claims.token_use != TokenUse::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Load the user behind a validated token's subject
    pub async fn current_user_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        self.users
            .get_by_id(id)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to get user: {e}")))?
            .ok_or(AuthError::InvalidToken)
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access_token = self.encode(user, TokenUse::Access, self.access_token_ttl_hours)?;
        let refresh_token = self.encode(user, TokenUse::Refresh, self.refresh_token_ttl_hours)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn encode(&self, user: &User, token_use: TokenUse, ttl_hours: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            id: user.id,
            username: user.username.clone(),
            token_use,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(ttl_hours)).timestamp(),
        };

        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::InternalError(format!("Failed to create jwt: {e}")))
    }

    fn decode(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let data = jsonwebtoken::decode::<AccessTokenClaims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.exp < Utc::now().timestamp() {
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }
}

/// Salted SHA-256 password hash, stored as `<salt-hex>$<digest-hex>`
fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    hex::encode(salted_digest(&salt, password)) == digest_hex
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct InMemoryUsers {
        users: Mutex<Vec<User>>,
    }

    impl InMemoryUsers {
        fn new() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUsers {
        async fn create(&self, username: &str, password_hash: &str) -> Result<User> {
            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            };
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }

        async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.username == username)
                .cloned())
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned())
        }
    }

    fn service() -> AuthService {
        AuthService::new(Arc::new(InMemoryUsers::new()), "test-secret".to_string(), 1, 168)
    }

    #[test]
    fn password_hashing_round_trip() {
        let hashed = hash_password("correct horse battery");
        assert!(verify_password("correct horse battery", &hashed));
        assert!(!verify_password("wrong", &hashed));
        assert!(!verify_password("anything", "malformed"));
    }

    #[tokio::test]
    async fn register_login_and_verify() {
        let auth = service();
        let user = auth.register("dr.garcia", "a-long-password").await.unwrap();

        let tokens = auth.login("dr.garcia", "a-long-password").await.unwrap();
        let claims = auth.verify_access_token(&tokens.access_token).unwrap();
        assert_eq!(claims.id, user.id);
        assert_eq!(claims.username, "dr.garcia");

        // A refresh token is not accepted where an access token is required
        assert!(matches!(
            auth.verify_access_token(&tokens.refresh_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn refresh_issues_new_pair() {
        let auth = service();
        auth.register("dr.garcia", "a-long-password").await.unwrap();
        let tokens = auth.login("dr.garcia", "a-long-password").await.unwrap();

        let refreshed = auth.refresh(&tokens.refresh_token).await.unwrap();
        assert!(auth.verify_access_token(&refreshed.access_token).is_ok());

        // Access tokens cannot be used to refresh
        assert!(matches!(
            auth.refresh(&tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_weak_passwords() {
        let auth = service();
        auth.register("dr.garcia", "a-long-password").await.unwrap();

        assert!(matches!(
            auth.register("dr.garcia", "another-password").await,
            Err(AuthError::UsernameTaken)
        ));
        assert!(matches!(
            auth.register("dr.chen", "short").await,
            Err(AuthError::WeakPassword)
        ));
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let auth = service();
        auth.register("dr.garcia", "a-long-password").await.unwrap();

        assert!(matches!(
            auth.login("dr.garcia", "not-the-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "a-long-password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
