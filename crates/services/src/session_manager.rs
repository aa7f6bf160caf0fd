//! Owns the canonical in-memory `Session` table and enforces the session
//! state machine: `started -> active -> paused -> ... -> ended`, plus the
//! terminal `error` state. Every mutation is persisted before it's reflected
//! in the in-memory table, so a crash between the two never leaves a stale
//! file on disk ahead of what's served to clients.

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    ClientMembership, ErrorCode, ErrorDetails, Session, SessionConfig, SessionListFilter,
    SessionStatus, SessionSummary,
};
use persistence::SessionStore;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ServiceError;

fn with_session(session_id: &str) -> ErrorDetails {
    ErrorDetails { session_id: Some(session_id.to_string()), ..Default::default() }
}

fn not_found(session_id: &str) -> ServiceError {
    ServiceError::new(ErrorCode::SessionNotFound, format!("no session '{session_id}'"))
        .with_details(with_session(session_id))
}

fn not_owned(session_id: &str) -> ServiceError {
    ServiceError::new(ErrorCode::AuthzSessionNotOwned, "caller does not own this session")
        .with_details(with_session(session_id))
}

fn terminal(session_id: &str) -> ServiceError {
    ServiceError::new(
        ErrorCode::AuthzOperationNotAllowed,
        format!("session '{session_id}' is in a terminal state"),
    )
    .with_details(with_session(session_id))
}

/// Legal status transitions. `Error` is reachable from anywhere and is not
/// listed as a source since it's driven by failure, not a requested operation.
fn transition_allowed(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!(
        (from, to),
        (Started, Active)
            | (Active, Paused)
            | (Paused, Active)
            | (Active, Ending)
            | (Paused, Ending)
            | (Ending, Ended)
    )
}

pub struct SessionManager {
    store: Arc<SessionStore>,
    sessions: RwLock<HashMap<String, Session>>,
    max_clients_per_session: usize,
    ended_session_retention: chrono::Duration,
}

impl SessionManager {
    pub async fn load(
        store: Arc<SessionStore>,
        max_clients_per_session: usize,
        ended_session_retention_minutes: i64,
    ) -> Result<Self, ServiceError> {
        let loaded = store.load_all().await?;
        let sessions = loaded
            .into_iter()
            .map(|session| (session.session_id.clone(), session))
            .collect();
        Ok(Self {
            store,
            sessions: RwLock::new(sessions),
            max_clients_per_session,
            ended_session_retention: chrono::Duration::minutes(ended_session_retention_minutes),
        })
    }

    /// Deletes an ended session's file from disk after `ended_session_retention`
    /// has elapsed, giving a reconnecting client a grace window to still read
    /// its final state before the file disappears.
    fn schedule_ended_deletion(&self, session_id: &str) {
        let store = self.store.clone();
        let id = session_id.to_string();
        let retention = self.ended_session_retention.to_std().unwrap_or(std::time::Duration::ZERO);
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Err(err) = store.delete(&id).await {
                tracing::warn!(session_id = %id, error = %err, "failed to delete ended session file");
            }
        });
    }

    pub async fn create(
        &self,
        session_id: String,
        admin_id: Uuid,
        admin_socket_id: String,
        created_by: String,
        config: SessionConfig,
    ) -> Result<Session, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::new(ErrorCode::SessionInvalidConfig, e.to_string()))?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(ServiceError::new(
                ErrorCode::SessionAlreadyExists,
                format!("session '{session_id}' already exists"),
            ));
        }

        let session = Session::new(session_id.clone(), admin_id, admin_socket_id, created_by, config);
        self.store.save(&session).await?;
        sessions.insert(session_id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Session, ServiceError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found(session_id))
    }

    pub async fn list_owned_by(&self, admin_id: Uuid) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_owned_by(admin_id))
            .cloned()
            .collect()
    }

    /// `listSessions`: `owned` restricts to the requester's own sessions,
    /// `all` returns every session with `isOwner` marking which are theirs.
    pub async fn list_sessions(&self, requester_admin_id: Uuid, filter: SessionListFilter) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| filter == SessionListFilter::All || s.is_owned_by(requester_admin_id))
            .map(|s| s.summarize(requester_admin_id))
            .collect()
    }

    /// Number of sessions currently held in memory (i.e. not yet `Ended`).
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn check_ownership(session: &Session, admin_id: Uuid) -> Result<(), ServiceError> {
        if !session.is_owned_by(admin_id) {
            return Err(not_owned(&session.session_id));
        }
        Ok(())
    }

    pub async fn update_config(
        &self,
        session_id: &str,
        admin_id: Uuid,
        config: SessionConfig,
    ) -> Result<Session, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::new(ErrorCode::SessionInvalidConfig, e.to_string()))?;

        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| not_found(session_id))?;
        Self::check_ownership(session, admin_id)?;
        if session.status.is_terminal() {
            return Err(terminal(session_id));
        }

        session.config = config;
        session.touch();
        self.store.save(session).await?;
        Ok(session.clone())
    }

    pub async fn transition(
        &self,
        session_id: &str,
        admin_id: Uuid,
        to: SessionStatus,
    ) -> Result<Session, ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| not_found(session_id))?;
        Self::check_ownership(session, admin_id)?;

        if !transition_allowed(session.status, to) {
            return Err(ServiceError::new(
                ErrorCode::AuthzOperationNotAllowed,
                format!("cannot move session '{session_id}' from {:?} to {:?}", session.status, to),
            ));
        }

        session.status = to;
        session.touch();
        self.store.save(session).await?;
        let result = session.clone();

        if to == SessionStatus::Ended {
            sessions.remove(session_id);
            self.schedule_ended_deletion(session_id);
        }

        Ok(result)
    }

    pub async fn mark_error(&self, session_id: &str, reason: &str) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            tracing::error!(session_id, reason, "session transitioned to error state");
            session.status = SessionStatus::Error;
            session.touch();
            self.store.save(session).await?;
        }
        Ok(())
    }

    pub async fn set_admin_socket(
        &self,
        session_id: &str,
        admin_id: Uuid,
        socket_id: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| not_found(session_id))?;
        Self::check_ownership(session, admin_id)?;
        session.current_admin_socket_id = socket_id;
        session.touch();
        self.store.save(session).await?;
        Ok(())
    }

    pub async fn add_client(
        &self,
        session_id: &str,
        membership: ClientMembership,
    ) -> Result<Session, ServiceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| not_found(session_id))?;
        if session.status.is_terminal() {
            return Err(terminal(session_id));
        }
        if session.clients.len() >= self.max_clients_per_session
            && !session.clients.contains_key(&membership.socket_id)
        {
            return Err(ServiceError::new(
                ErrorCode::SessionClientLimitExceeded,
                format!("session '{session_id}' already has {} clients", session.clients.len()),
            ));
        }

        session.clients.insert(membership.socket_id.clone(), membership);
        session.touch();
        self.store.save(session).await?;
        Ok(session.clone())
    }

    pub async fn remove_client(&self, session_id: &str, socket_id: &str) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.clients.remove(socket_id);
            session.touch();
            self.store.save(session).await?;
        }
        Ok(())
    }

    /// Sessions whose `current_admin_socket_id` is `None` and that have been
    /// inactive longer than `timeout`. Used by the idle-session sweep.
    pub async fn inactive_active_sessions(&self, timeout: chrono::Duration) -> Vec<String> {
        let cutoff = chrono::Utc::now() - timeout;
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| {
                matches!(s.status, SessionStatus::Active | SessionStatus::Paused)
                    && s.current_admin_socket_id.is_none()
                    && s.last_activity < cutoff
            })
            .map(|s| s.session_id.clone())
            .collect()
    }

    /// System-initiated `active|paused -> ended` for a session abandoned by
    /// its admin for longer than the configured inactivity timeout. Bypasses
    /// the ownership check used by `transition`, since the inactivity sweep
    /// has no caller-admin to check against.
    pub async fn end_inactive(&self, session_id: &str) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = SessionStatus::Ended;
            session.touch();
            self.store.save(session).await?;
            sessions.remove(session_id);
            self.schedule_ended_deletion(session_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{AudioConfig, AudioEncoding, AudioQuality, TtsMode};
    use std::collections::BTreeSet;

    fn config() -> SessionConfig {
        SessionConfig {
            source_language: "pt".to_string(),
            target_languages: BTreeSet::from(["en".to_string()]),
            enabled_languages: BTreeSet::from(["en".to_string()]),
            tts_mode: TtsMode::Standard,
            audio_quality: AudioQuality::Medium,
            audio_config: AudioConfig {
                sample_rate: 16000,
                encoding: AudioEncoding::Pcm,
                channels: 1,
            },
        }
    }

    async fn manager() -> (SessionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let manager = SessionManager::load(store, 2, 30).await.unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();

        let err = manager
            .create("CHURCH-1".to_string(), admin_id, "sock-2".to_string(), "Jim".to_string(), config())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionAlreadyExists);
    }

    #[tokio::test]
    async fn non_owner_cannot_mutate() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();

        let err = manager
            .transition("CHURCH-1", Uuid::new_v4(), SessionStatus::Active)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthzSessionNotOwned);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();

        let err = manager
            .transition("CHURCH-1", admin_id, SessionStatus::Ended)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthzOperationNotAllowed);
    }

    #[tokio::test]
    async fn client_limit_is_enforced() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let membership = |id: &str| ClientMembership {
            socket_id: id.to_string(),
            preferred_language: "en".to_string(),
            joined_at: now,
            last_seen: now,
            audio_capabilities: Default::default(),
        };

        manager.add_client("CHURCH-1", membership("c1")).await.unwrap();
        manager.add_client("CHURCH-1", membership("c2")).await.unwrap();
        let err = manager.add_client("CHURCH-1", membership("c3")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionClientLimitExceeded);
    }

    #[tokio::test]
    async fn list_sessions_owned_filters_to_the_requester() {
        let (manager, _dir) = manager().await;
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        manager.create("CHURCH-1".to_string(), owner, "sock-1".to_string(), "Jim".to_string(), config()).await.unwrap();
        manager.create("CHURCH-2".to_string(), other, "sock-2".to_string(), "Ann".to_string(), config()).await.unwrap();

        let owned = manager.list_sessions(owner, SessionListFilter::Owned).await;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].session_id, "CHURCH-1");
        assert!(owned[0].is_owner);
    }

    #[tokio::test]
    async fn list_sessions_all_annotates_is_owner_per_session() {
        let (manager, _dir) = manager().await;
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        manager.create("CHURCH-1".to_string(), owner, "sock-1".to_string(), "Jim".to_string(), config()).await.unwrap();
        manager.create("CHURCH-2".to_string(), other, "sock-2".to_string(), "Ann".to_string(), config()).await.unwrap();

        let mut all = manager.list_sessions(owner, SessionListFilter::All).await;
        all.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        assert_eq!(all.len(), 2);
        assert!(all[0].is_owner);
        assert!(!all[1].is_owner);
    }

    #[tokio::test]
    async fn ending_a_session_removes_it_from_the_active_table() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Active).await.unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Ending).await.unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Ended).await.unwrap();

        let err = manager.get("CHURCH-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn ended_session_file_survives_until_retention_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let manager = SessionManager::load(store.clone(), 2, 60).await.unwrap();
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Active).await.unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Ending).await.unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Ended).await.unwrap();

        assert_eq!(manager.get("CHURCH-1").await.unwrap_err().code, ErrorCode::SessionNotFound);
        assert!(store.load("CHURCH-1").await.is_ok(), "the on-disk file should outlive the in-memory entry");
    }

    #[tokio::test]
    async fn inactivity_sweep_ends_sessions_with_no_attached_admin_socket() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Active).await.unwrap();
        manager.set_admin_socket("CHURCH-1", admin_id, None).await.unwrap();

        assert!(manager.inactive_active_sessions(chrono::Duration::minutes(0)).await.contains(&"CHURCH-1".to_string()));
        assert!(manager.inactive_active_sessions(chrono::Duration::minutes(30)).await.is_empty());

        manager.end_inactive("CHURCH-1").await.unwrap();
        let err = manager.get("CHURCH-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn inactivity_sweep_ignores_sessions_with_an_attached_admin_socket() {
        let (manager, _dir) = manager().await;
        let admin_id = Uuid::new_v4();
        manager
            .create("CHURCH-1".to_string(), admin_id, "sock-1".to_string(), "Jim".to_string(), config())
            .await
            .unwrap();
        manager.transition("CHURCH-1", admin_id, SessionStatus::Active).await.unwrap();

        assert!(manager.inactive_active_sessions(chrono::Duration::minutes(0)).await.is_empty());
    }

    fn any_status() -> impl proptest::strategy::Strategy<Value = SessionStatus> {
        use proptest::prelude::*;
        prop_oneof![
            Just(SessionStatus::Started),
            Just(SessionStatus::Active),
            Just(SessionStatus::Paused),
            Just(SessionStatus::Ending),
            Just(SessionStatus::Ended),
            Just(SessionStatus::Error),
        ]
    }

    proptest::proptest! {
        #[test]
        fn transition_into_error_is_never_reachable_via_transition(from in any_status()) {
            proptest::prop_assert!(!transition_allowed(from, SessionStatus::Error));
        }

        #[test]
        fn legal_transitions_never_skip_ending_on_the_way_to_ended(from in any_status()) {
            if transition_allowed(from, SessionStatus::Ended) {
                proptest::prop_assert_eq!(from, SessionStatus::Ending);
            }
        }

        #[test]
        fn started_is_never_a_valid_destination(to in any_status()) {
            if to == SessionStatus::Started {
                proptest::prop_assert!(!transition_allowed(SessionStatus::Started, to));
                proptest::prop_assert!(!transition_allowed(SessionStatus::Active, to));
                proptest::prop_assert!(!transition_allowed(SessionStatus::Paused, to));
                proptest::prop_assert!(!transition_allowed(SessionStatus::Ending, to));
                proptest::prop_assert!(!transition_allowed(SessionStatus::Ended, to));
            }
        }

        /// A mutating operation from a non-owning admin is always rejected
        /// with `AUTHZ_SESSION_NOT_OWNED`, and the session's state is left
        /// exactly as it was.
        #[test]
        fn non_owner_transition_is_rejected_and_leaves_state_unchanged(
            owner_bits in proptest::num::u128::ANY,
            intruder_bits in proptest::num::u128::ANY,
        ) {
            let owner = Uuid::from_u128(owner_bits);
            let intruder = Uuid::from_u128(intruder_bits);
            proptest::prop_assume!(owner != intruder);

            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (manager, _dir) = manager().await;
                manager
                    .create("CHURCH-1".to_string(), owner, "sock-1".to_string(), "Jim".to_string(), config())
                    .await
                    .unwrap();

                let before = manager.get("CHURCH-1").await.unwrap();
                let err = manager
                    .transition("CHURCH-1", intruder, SessionStatus::Active)
                    .await
                    .unwrap_err();
                proptest::prop_assert_eq!(err.code, ErrorCode::AuthzSessionNotOwned);

                let after = manager.get("CHURCH-1").await.unwrap();
                proptest::prop_assert_eq!(before.status, after.status);
                proptest::prop_assert_eq!(before.admin_id, after.admin_id);
                Ok(())
            }).unwrap();
        }
    }
}
