use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// GET /metrics — Prometheus text-exposition format, scraped by operators.
pub async fn metrics_handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics.gather_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {err}")),
    }
}
