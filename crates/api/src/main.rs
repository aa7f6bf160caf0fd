use std::net::SocketAddr;
use std::sync::Arc;

use api::metrics::Metrics;
use api::state::{AppState, AppStateInner};
use config::{HubConfig, LoggingConfig};
use persistence::{AdminStore, SessionStore};
use services::identity::{HttpIdentityClient, IdentityClient, MockIdentityClient};
use services::security::{ConnectionLimiter, OperationRateLimiter};
use services::tts::{MockTtsService, TtsService};
use services::{AdminIdentityManager, AudioCache, Broadcaster, SessionManager, TokenStore};

#[tokio::main]
async fn main() {
    let config = HubConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);
    tracing::debug!(?config, "loaded configuration");

    let session_store = Arc::new(SessionStore::new(&config.persistence.sessions_dir));
    let admin_store = Arc::new(AdminStore::new(&config.persistence.admin_identities_dir));

    let sessions = SessionManager::load(
        session_store,
        config.limits.max_clients_per_session,
        config.persistence.ended_session_retention_minutes,
    )
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to load persisted sessions: {e}");
            std::process::exit(1);
        });
    let admins = AdminIdentityManager::load(admin_store)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to load persisted admin identities: {e}");
            std::process::exit(1);
        });

    let identity: Arc<dyn IdentityClient> = if config.identity_provider.use_mock {
        tracing::warn!("using in-memory mock identity provider, not suitable for production");
        Arc::new(MockIdentityClient::new())
    } else {
        Arc::new(HttpIdentityClient::new(
            &config.identity_provider.issuer_url,
            &config.identity_provider.client_id,
            std::time::Duration::from_secs(config.identity_provider.request_timeout_secs),
        ))
    };

    let tts: Arc<dyn TtsService> = Arc::new(MockTtsService);

    let audio_cache = AudioCache::load(
        std::path::PathBuf::from(&config.persistence.audio_dir),
        config.audio_cache.max_size_bytes,
        chrono::Duration::hours(config.audio_cache.max_age_hours),
        tts,
    )
    .await
    .unwrap_or_else(|e| {
        eprintln!("Failed to load audio cache: {e}");
        std::process::exit(1);
    });

    let create_session_limiter = {
        let bucket = config.limits.bucket_for("createSession");
        OperationRateLimiter::new(bucket.capacity, std::time::Duration::from_secs(bucket.window_secs))
    };
    let broadcast_limiter = {
        let bucket = config.limits.bucket_for("broadcastTranslation");
        OperationRateLimiter::new(bucket.capacity, std::time::Duration::from_secs(bucket.window_secs))
    };
    let connection_limiter = ConnectionLimiter::new(config.limits.max_connections_per_ip);
    let soft_limit = config.limits.outbound_queue_soft_limit;
    let hard_limit = config.limits.outbound_queue_hard_limit;

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let session_inactivity_timeout_minutes = config.limits.session_inactivity_timeout_minutes;
    let admin_retention_minutes = config.persistence.admin_retention_minutes;
    let audio_cache_cleanup_interval_minutes = config.audio_cache.cleanup_interval_minutes;

    let state = AppState(Arc::new(AppStateInner {
        config,
        sessions,
        admins,
        tokens: TokenStore::new(),
        broadcaster: Broadcaster::new(soft_limit, hard_limit),
        audio_cache,
        identity,
        connection_limiter,
        create_session_limiter,
        broadcast_limiter,
        metrics: Metrics::new(),
        shutdown: shutdown_tx.clone(),
    }));

    spawn_token_expiry_sweep(state.clone());
    spawn_admin_retention_sweep(state.clone(), admin_retention_minutes);
    spawn_audio_cache_sweep(state.clone(), audio_cache_cleanup_interval_minutes);
    if let Some(timeout_minutes) = session_inactivity_timeout_minutes {
        spawn_session_inactivity_sweep(state.clone(), timeout_minutes);
    }

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind {bind_address}: {e}");
            std::process::exit(1);
        });

    tracing::info!(address = %bind_address, "translation session hub listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, closing connections");
        let _ = shutdown_tx.send(());
    })
    .await
    .unwrap();
}

/// Proactively refreshes expired access tokens and evicts the ones whose
/// refresh token can no longer be used, instead of leaving that discovery to
/// the next admin message on an otherwise-idle socket.
fn spawn_token_expiry_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = state.tokens.sweep_expired(&state.identity).await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "evicted sockets with unrefreshable tokens");
            }
        }
    });
}

/// Periodically drops admin identities that own no sessions, have no
/// attached socket, and haven't been seen in longer than the configured
/// retention window.
fn spawn_admin_retention_sweep(state: AppState, retention_minutes: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        interval.tick().await;
        loop {
            interval.tick().await;
            let dropped = state.admins.sweep_stale(chrono::Duration::minutes(retention_minutes)).await;
            if !dropped.is_empty() {
                tracing::info!(count = dropped.len(), "swept stale admin identities");
            }
        }
    });
}

/// Periodically evicts audio artifacts past `max_age_hours`, catching entries
/// that age out without ever being read again between writes (the cache also
/// evicts inline on every write, but a quiet fingerprint would otherwise sit
/// on disk forever).
fn spawn_audio_cache_sweep(state: AppState, interval_minutes: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_minutes.max(1) * 60));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = state.audio_cache.sweep().await {
                tracing::warn!(error = %err, "audio cache sweep failed");
            }
        }
    });
}

/// Periodically ends sessions left `active`/`paused` with no attached admin
/// socket for longer than `timeout_minutes`.
fn spawn_session_inactivity_sweep(state: AppState, timeout_minutes: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let timeout = chrono::Duration::minutes(timeout_minutes);
            for session_id in state.sessions.inactive_active_sessions(timeout).await {
                if let Err(err) = state.sessions.end_inactive(&session_id).await {
                    tracing::warn!(session_id, error = %err, "failed to end inactive session, marking it errored");
                    if let Err(err) = state.sessions.mark_error(&session_id, "inactivity sweep failed to end session").await {
                        tracing::warn!(session_id, error = %err, "failed to mark session errored");
                    }
                }
            }
        }
    });
}

fn init_tracing(logging_config: &LoggingConfig) {
    let mut filter = logging_config.level.clone();
    for (module, level) in &logging_config.modules {
        filter.push_str(&format!(",{module}={level}"));
    }

    match logging_config.format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        "compact" => tracing_subscriber::fmt().compact().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().pretty().with_env_filter(filter).init(),
    }
}
