use std::sync::Arc;

use config::HubConfig;
use services::security::{ConnectionLimiter, OperationRateLimiter};
use services::{AdminIdentityManager, AudioCache, Broadcaster, SessionManager, TokenStore};
use services::identity::IdentityClient;
use tokio::sync::broadcast;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState(pub Arc<AppStateInner>);

pub struct AppStateInner {
    pub config: HubConfig,
    pub sessions: SessionManager,
    pub admins: AdminIdentityManager,
    pub tokens: TokenStore,
    pub broadcaster: Broadcaster,
    pub audio_cache: AudioCache,
    pub identity: Arc<dyn IdentityClient>,
    pub connection_limiter: ConnectionLimiter,
    pub create_session_limiter: OperationRateLimiter,
    pub broadcast_limiter: OperationRateLimiter,
    pub metrics: Metrics,
    /// Fired once on process shutdown; every open connection task subscribes
    /// and closes its socket instead of being killed mid-write.
    pub shutdown: broadcast::Sender<()>,
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
