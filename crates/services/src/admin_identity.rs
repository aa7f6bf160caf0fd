//! Manages `AdminIdentity` records: lookup/creation on first sign-in, and the
//! transient set of socket ids currently attached to each admin (never
//! persisted — rebuilt from live connections on every process start).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{AdminIdentity, ErrorCode};
use persistence::AdminStore;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ServiceError;

pub struct AdminIdentityManager {
    store: Arc<AdminStore>,
    identities: RwLock<HashMap<Uuid, AdminIdentity>>,
    active_sockets: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl AdminIdentityManager {
    pub async fn load(store: Arc<AdminStore>) -> Result<Self, ServiceError> {
        let identities = store.load_all().await?;
        let identities = identities
            .into_iter()
            .map(|identity| (identity.admin_id, identity))
            .collect();
        Ok(Self {
            store,
            identities: RwLock::new(identities),
            active_sockets: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the identity for `admin_id`, creating one named `display_name`
    /// the first time this admin id is seen.
    pub async fn get_or_create(
        &self,
        admin_id: Uuid,
        display_name: &str,
    ) -> Result<AdminIdentity, ServiceError> {
        if let Some(identity) = self.identities.read().await.get(&admin_id).cloned() {
            return Ok(identity);
        }

        let identity = AdminIdentity::new(admin_id, display_name.to_string());
        self.store.save(&identity).await?;
        self.identities
            .write()
            .await
            .insert(admin_id, identity.clone());
        Ok(identity)
    }

    pub async fn get(&self, admin_id: Uuid) -> Result<AdminIdentity, ServiceError> {
        self.identities
            .read()
            .await
            .get(&admin_id)
            .cloned()
            .ok_or_else(|| ServiceError::new(ErrorCode::AdminNotFound, "no admin identity on record"))
    }

    pub async fn record_owned_session(&self, admin_id: Uuid, session_id: &str) -> Result<(), ServiceError> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(&admin_id)
            .ok_or_else(|| ServiceError::new(ErrorCode::AdminNotFound, "no admin identity on record"))?;
        identity.owned_session_ids.insert(session_id.to_string());
        identity.last_seen = chrono::Utc::now();
        self.store.save(identity).await?;
        Ok(())
    }

    pub async fn forget_owned_session(&self, admin_id: Uuid, session_id: &str) -> Result<(), ServiceError> {
        let mut identities = self.identities.write().await;
        if let Some(identity) = identities.get_mut(&admin_id) {
            identity.owned_session_ids.remove(session_id);
            self.store.save(identity).await?;
        }
        Ok(())
    }

    pub async fn attach_socket(&self, admin_id: Uuid, socket_id: &str) {
        self.active_sockets
            .write()
            .await
            .entry(admin_id)
            .or_default()
            .insert(socket_id.to_string());
    }

    pub async fn detach_socket(&self, admin_id: Uuid, socket_id: &str) {
        let mut sockets = self.active_sockets.write().await;
        if let Some(set) = sockets.get_mut(&admin_id) {
            set.remove(socket_id);
            if set.is_empty() {
                sockets.remove(&admin_id);
            }
        }
    }

    pub async fn has_active_socket(&self, admin_id: Uuid) -> bool {
        self.active_sockets
            .read()
            .await
            .get(&admin_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Drops identities that own no sessions, have no attached socket, and
    /// haven't been seen in longer than `retention`. Used by the retention
    /// sweep; an admin with owned sessions is never dropped regardless of age.
    pub async fn sweep_stale(&self, retention: chrono::Duration) -> Vec<Uuid> {
        let cutoff = chrono::Utc::now() - retention;
        let active = self.active_sockets.read().await;
        let mut identities = self.identities.write().await;

        let stale: Vec<Uuid> = identities
            .values()
            .filter(|identity| {
                identity.owned_session_ids.is_empty()
                    && identity.last_seen < cutoff
                    && !active.contains_key(&identity.admin_id)
            })
            .map(|identity| identity.admin_id)
            .collect();

        for admin_id in &stale {
            identities.remove(admin_id);
            if let Err(err) = self.store.delete(*admin_id).await {
                tracing::warn!(%admin_id, error = %err, "failed to delete stale admin identity file");
            }
        }
        stale
    }
}
