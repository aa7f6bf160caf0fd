//! Types shared between the Identity Client and the Token Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bundle of tokens returned by the identity provider on password auth or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds until `access_token` expires, as returned by the provider.
    pub expires_in: i64,
}

/// Minimal user info extracted from a validated access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable external user id (`sub` claim).
    pub sub: Uuid,
    pub display_name: String,
    pub email: String,
}

/// Transient, per-socket authentication state. Never persisted.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub socket_id: String,
    pub admin_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
