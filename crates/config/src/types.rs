use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub identity_provider: IdentityProviderConfig,
    pub persistence: PersistenceConfig,
    pub limits: LimitsConfig,
    pub audio_cache: AudioCacheConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    pub issuer_url: String,
    /// When true, use the in-memory mock identity client instead of calling out.
    #[serde(default)]
    pub use_mock: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub sessions_dir: String,
    pub admin_identities_dir: String,
    pub audio_dir: String,
    #[serde(default = "default_admin_retention_minutes")]
    pub admin_retention_minutes: i64,
    #[serde(default = "default_ended_session_retention_minutes")]
    pub ended_session_retention_minutes: i64,
}

fn default_admin_retention_minutes() -> i64 {
    60 * 24 * 30
}

fn default_ended_session_retention_minutes() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub capacity: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_clients_per_session")]
    pub max_clients_per_session: usize,
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_missed_pongs")]
    pub heartbeat_missed_pongs: u32,
    #[serde(default = "default_outbound_queue_soft_limit")]
    pub outbound_queue_soft_limit: usize,
    #[serde(default = "default_outbound_queue_hard_limit")]
    pub outbound_queue_hard_limit: usize,
    #[serde(default)]
    pub operation_rate_limits: HashMap<String, RateLimitBucket>,
    /// Minutes of no attached admin socket before `active -> ended` sweep fires.
    /// `None` disables the automatic end-on-inactivity sweep entirely.
    #[serde(default)]
    pub session_inactivity_timeout_minutes: Option<i64>,
    #[serde(default = "default_admin_reconnect_grace_secs")]
    pub admin_reconnect_grace_secs: u64,
}

fn default_max_clients_per_session() -> usize {
    500
}
fn default_max_connections_per_ip() -> usize {
    50
}
fn default_heartbeat_interval_secs() -> u64 {
    15
}
fn default_heartbeat_missed_pongs() -> u32 {
    3
}
fn default_outbound_queue_soft_limit() -> usize {
    64
}
fn default_outbound_queue_hard_limit() -> usize {
    256
}
fn default_admin_reconnect_grace_secs() -> u64 {
    30
}

impl LimitsConfig {
    /// The configured bucket for `operation`, or a conservative built-in default.
    pub fn bucket_for(&self, operation: &str) -> RateLimitBucket {
        self.operation_rate_limits
            .get(operation)
            .cloned()
            .unwrap_or(RateLimitBucket {
                capacity: 30,
                window_secs: 60,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCacheConfig {
    pub max_size_bytes: u64,
    pub max_age_hours: i64,
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Empty means no cross-origin restriction beyond same-origin defaults.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}
