// Configuration Management
//
// This crate handles all configuration loading for the session hub binary.
// It provides:
// - Configuration structs (`types`)
// - YAML file loading with environment variable overrides
// - Default configuration values
//
// This keeps configuration concerns separate from domain logic.

use std::env;
use std::path::Path;

use thiserror::Error;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid environment override {var}: {reason}")]
    EnvOverride { var: String, reason: String },
}

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

impl HubConfig {
    /// Loads configuration from a YAML file, then applies a handful of
    /// environment variable overrides for values operators commonly need to
    /// change per-deployment without editing the file (host, port, log level).
    ///
    /// The file path is taken from `HUB_CONFIG_PATH`, defaulting to
    /// `config.yaml` in the current directory. A `.env` file, if present, is
    /// loaded first so overrides can live alongside secrets.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let path = env::var("HUB_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("HUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("HUB_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::EnvOverride {
                var: "HUB_SERVER_PORT".to_string(),
                reason: "expected a u16".to_string(),
            })?;
        }
        if let Ok(level) = env::var("HUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("HUB_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }
}
