use std::collections::HashSet;
use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use domain::ErrorCode;

use crate::middleware::extract_client_ip;
use crate::state::AppState;
use crate::ws::connection::handle_socket;

/// GET /ws — upgrades to a WebSocket for either an admin or a client
/// connection. Which role the socket plays is decided by its first message
/// (`authenticate` for admins, `joinSession` for clients), not by the path.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // No trusted reverse proxies are configured by default; operators that
    // run behind one should plumb trusted_proxy_ips through HubConfig.
    let trusted_proxy_ips = HashSet::new();
    let client_ip = extract_client_ip(&headers, addr, &trusted_proxy_ips);

    if !state.connection_limiter.try_acquire(&client_ip).await {
        tracing::warn!(client_ip = %client_ip, "rejecting websocket upgrade: connection limit reached");
        state.metrics.connections_rejected_total.inc();
        let envelope = domain::ErrorEnvelope::new(
            "error",
            ErrorCode::SystemConnectionLimitExceeded,
            "too many connections from this address",
        );
        return (axum::http::StatusCode::TOO_MANY_REQUESTS, axum::Json(envelope)).into_response();
    }

    state.metrics.connections_total.inc();
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_ip))
}
