#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use api::metrics::Metrics;
use api::state::{AppState, AppStateInner};
use config::{
    AudioCacheConfig, CorsConfig, HubConfig, IdentityProviderConfig, LimitsConfig, LoggingConfig,
    PersistenceConfig, RateLimitBucket, ServerConfig,
};
use persistence::{AdminStore, SessionStore};
use services::identity::{IdentityClient, MockIdentityClient};
use services::security::{ConnectionLimiter, OperationRateLimiter};
use services::tts::{MockTtsService, TtsService};
use services::{AdminIdentityManager, AudioCache, Broadcaster, SessionManager, TokenStore};

/// One admin account, already registered against the mock identity client.
pub struct TestAdmin {
    pub username: &'static str,
    pub password: &'static str,
}

pub const ADMIN_A: TestAdmin = TestAdmin { username: "admin-a", password: "hunter2" };
pub const ADMIN_B: TestAdmin = TestAdmin { username: "admin-b", password: "hunter2" };

/// A TTS backend that always fails, for exercising graceful degradation
/// when audio synthesis errors out mid-broadcast.
pub struct FailingTtsService;

#[async_trait::async_trait]
impl TtsService for FailingTtsService {
    async fn synthesize(
        &self,
        _request: services::tts::SpeechRequest,
    ) -> Result<services::tts::SpeechResponse, services::ServiceError> {
        Err(services::ServiceError::new(
            domain::ErrorCode::SystemInternalError,
            "tts provider unavailable",
        ))
    }
}

/// Spawns the hub on a loopback port backed by a tempdir and mock
/// identity/TTS services, returning its address. The tempdir is returned
/// so the caller keeps it alive for the test's duration; the server task
/// is aborted when it drops.
pub async fn test_server() -> (SocketAddr, tempfile::TempDir) {
    test_server_with_tts(Arc::new(MockTtsService)).await
}

/// Like [`test_server`] but lets the caller swap in a TTS backend, e.g.
/// [`FailingTtsService`] to exercise degraded-broadcast behavior.
pub async fn test_server_with_tts(tts: Arc<dyn TtsService>) -> (SocketAddr, tempfile::TempDir) {
    test_server_with_outbound_limits(tts, 64, 256).await
}

/// Like [`test_server`] but with a small, test-controlled outbound queue
/// soft/hard limit, for exercising backpressure behavior without waiting on
/// hundreds of real broadcasts.
pub async fn test_server_with_outbound_limits(
    tts: Arc<dyn TtsService>,
    soft_limit: usize,
    hard_limit: usize,
) -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let identity = MockIdentityClient::new();
    identity.register(ADMIN_A.username, ADMIN_A.password, "Admin A", "a@example.com");
    identity.register(ADMIN_B.username, ADMIN_B.password, "Admin B", "b@example.com");
    let identity: Arc<dyn IdentityClient> = Arc::new(identity);

    let sessions_dir = dir.path().join("sessions");
    let admins_dir = dir.path().join("admins");
    let audio_dir = dir.path().join("audio");

    let config = HubConfig {
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0 },
        identity_provider: IdentityProviderConfig {
            region: "local".to_string(),
            user_pool_id: "local".to_string(),
            client_id: "local".to_string(),
            issuer_url: "http://localhost".to_string(),
            use_mock: true,
            request_timeout_secs: 5,
        },
        persistence: PersistenceConfig {
            sessions_dir: sessions_dir.to_string_lossy().to_string(),
            admin_identities_dir: admins_dir.to_string_lossy().to_string(),
            audio_dir: audio_dir.to_string_lossy().to_string(),
            admin_retention_minutes: 43200,
            ended_session_retention_minutes: 30,
        },
        limits: LimitsConfig {
            max_clients_per_session: 500,
            max_connections_per_ip: 50,
            heartbeat_interval_secs: 30,
            heartbeat_missed_pongs: 3,
            outbound_queue_soft_limit: soft_limit,
            outbound_queue_hard_limit: hard_limit,
            operation_rate_limits: HashMap::from([
                ("createSession".to_string(), RateLimitBucket { capacity: 10, window_secs: 60 }),
                ("broadcastTranslation".to_string(), RateLimitBucket { capacity: 1000, window_secs: 60 }),
            ]),
            session_inactivity_timeout_minutes: None,
            admin_reconnect_grace_secs: 30,
        },
        audio_cache: AudioCacheConfig { max_size_bytes: 10_000_000, max_age_hours: 24, cleanup_interval_minutes: 60 },
        cors: CorsConfig::default(),
        logging: LoggingConfig { level: "debug".to_string(), format: "compact".to_string(), modules: HashMap::new() },
    };

    let session_store = Arc::new(SessionStore::new(&config.persistence.sessions_dir));
    let admin_store = Arc::new(AdminStore::new(&config.persistence.admin_identities_dir));
    let sessions = SessionManager::load(
        session_store,
        config.limits.max_clients_per_session,
        config.persistence.ended_session_retention_minutes,
    )
    .await
    .unwrap();
    let admins = AdminIdentityManager::load(admin_store).await.unwrap();

    let audio_cache = AudioCache::load(
        audio_dir,
        config.audio_cache.max_size_bytes,
        chrono::Duration::hours(config.audio_cache.max_age_hours),
        tts,
    )
    .await
    .unwrap();

    let create_session_limiter = {
        let bucket = config.limits.bucket_for("createSession");
        OperationRateLimiter::new(bucket.capacity, std::time::Duration::from_secs(bucket.window_secs))
    };
    let broadcast_limiter = {
        let bucket = config.limits.bucket_for("broadcastTranslation");
        OperationRateLimiter::new(bucket.capacity, std::time::Duration::from_secs(bucket.window_secs))
    };
    let connection_limiter = ConnectionLimiter::new(config.limits.max_connections_per_ip);
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

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
        shutdown: shutdown_tx,
    }));

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    (addr, dir)
}

/// Opens a WebSocket connection against `/ws` on a spawned test server.
pub async fn connect_ws(
    addr: SocketAddr,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let url = format!("ws://{addr}/ws");
    let (socket, _) = tokio_tungstenite::connect_async(url).await.expect("websocket connect failed");
    socket
}
