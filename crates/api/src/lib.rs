//! HTTP and WebSocket surface for the translation session hub. Wires the
//! `services` crate's ports onto axum routes and owns no business logic of
//! its own.

pub mod http;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod state;
pub mod ws;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use config::CorsConfig;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub use state::{AppState, AppStateInner};

/// True if `origin` is one of the operator-configured allowed origins, or a
/// `localhost`/`127.0.0.1` dev origin (any port).
pub fn is_origin_allowed(origin: &str, cors_config: &CorsConfig) -> bool {
    if cors_config.allowed_origins.iter().any(|allowed| allowed == origin) {
        return true;
    }

    for host in ["http://localhost", "http://127.0.0.1"] {
        if let Some(remainder) = origin.strip_prefix(host) {
            if remainder.is_empty() || remainder.starts_with(':') {
                return true;
            }
        }
    }

    false
}

/// Builds the full application router: `/ws` for session traffic,
/// `/health`, `/metrics` and `/security` for operators, `/audio/{filename}`
/// for cached synthesized speech.
pub fn build_router(state: AppState) -> Router {
    let cors_config = state.config.cors.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin
                    .to_str()
                    .map(|origin| is_origin_allowed(origin, &cors_config))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(http::health_check))
        .route("/metrics", get(http::metrics_handler))
        .route("/security", get(http::security_status))
        .route("/audio/{filename}", get(http::serve_audio))
        .layer(cors)
        .with_state(state)
}
