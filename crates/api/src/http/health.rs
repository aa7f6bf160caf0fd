use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json as ResponseJson;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub active_sessions: usize,
    pub active_connections: usize,
    pub audio_cache_entries: usize,
}

/// GET /health — liveness probe for load balancers. Requires no authentication.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, ResponseJson<HealthResponse>) {
    (
        StatusCode::OK,
        ResponseJson(HealthResponse {
            status: "ok".to_string(),
            version: option_env!("CARGO_PKG_VERSION").map(|v| v.to_string()),
            timestamp: Utc::now(),
            active_sessions: state.sessions.active_count().await,
            active_connections: state.connection_limiter.total_connections().await,
            audio_cache_entries: state.audio_cache.len().await,
        }),
    )
}

