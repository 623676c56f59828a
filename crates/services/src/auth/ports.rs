use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clinician account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, username: &str, password_hash: &str) -> Result<User>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

/// What a token is good for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Bearer token claims: the subject's identity plus standard timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "use")]
    pub token_use: TokenUse,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Internal error: {0}")]
    InternalError(String),
}
