//! Holds the per-socket `AuthSession` for every currently-authenticated
//! connection. Entries are purely in-memory: a socket that disconnects and
//! reconnects must re-authenticate, there is nothing to resume from disk.

use std::sync::Arc;

use chrono::Utc;
use domain::{AuthSession, ErrorCode};
use tokio::sync::RwLock;

use crate::errors::ServiceError;
use crate::identity::IdentityClient;

#[derive(Default)]
pub struct TokenStore {
    sessions: RwLock<std::collections::HashMap<String, AuthSession>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: AuthSession) {
        self.sessions
            .write()
            .await
            .insert(session.socket_id.clone(), session);
    }

    pub async fn remove(&self, socket_id: &str) {
        self.sessions.write().await.remove(socket_id);
    }

    pub async fn get(&self, socket_id: &str) -> Option<AuthSession> {
        self.sessions.read().await.get(socket_id).cloned()
    }

    /// Returns the session for `socket_id`, transparently refreshing it
    /// through `identity` if it has expired. Fails with `AUTH_SESSION_NOT_FOUND`
    /// if the socket was never authenticated, or the identity provider's own
    /// error if the refresh token itself has expired.
    pub async fn get_valid(
        &self,
        socket_id: &str,
        identity: &Arc<dyn IdentityClient>,
    ) -> Result<AuthSession, ServiceError> {
        let session = self
            .get(socket_id)
            .await
            .ok_or_else(|| ServiceError::new(ErrorCode::AuthSessionNotFound, "socket is not authenticated"))?;

        if !session.is_expired() {
            return Ok(session);
        }

        let refreshed = identity.refresh(&session.refresh_token).await?;
        let renewed = AuthSession {
            socket_id: session.socket_id.clone(),
            admin_id: session.admin_id,
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            id_token: refreshed.id_token,
            expires_at: Utc::now() + chrono::Duration::seconds(refreshed.expires_in),
        };
        self.insert(renewed.clone()).await;
        Ok(renewed)
    }

    /// Proactively refreshes every expired session, evicting the ones whose
    /// refresh token has itself expired or been invalidated rather than
    /// waiting for the socket to send a message and hit `get_valid`. Returns
    /// the socket ids evicted this way so the caller can force them back to
    /// unauthenticated.
    pub async fn sweep_expired(&self, identity: &Arc<dyn IdentityClient>) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_expired())
            .map(|s| s.socket_id.clone())
            .collect();

        let mut evicted = Vec::new();
        for socket_id in expired {
            if self.get_valid(&socket_id, identity).await.is_err() {
                self.remove(&socket_id).await;
                evicted.push(socket_id);
            }
        }
        evicted
    }
}
