use axum::extract::State;
use axum::response::Json as ResponseJson;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatusResponse {
    pub active_sessions: usize,
    pub total_connections: usize,
    pub distinct_connected_ips: usize,
    pub max_connections_per_ip: usize,
    pub audio_cache_entries: usize,
}

/// GET /security — a coarse snapshot of the hub's admission-control state,
/// useful for operators watching for abuse without exposing any session or
/// client identities.
pub async fn security_status(State(state): State<AppState>) -> ResponseJson<SecurityStatusResponse> {
    ResponseJson(SecurityStatusResponse {
        active_sessions: state.sessions.active_count().await,
        total_connections: state.connection_limiter.total_connections().await,
        distinct_connected_ips: state.connection_limiter.distinct_ips().await,
        max_connections_per_ip: state.config.limits.max_connections_per_ip,
        audio_cache_entries: state.audio_cache.len().await,
    })
}
