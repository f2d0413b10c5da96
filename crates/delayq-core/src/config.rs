use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// Paths searched, in order, when no explicit config file is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["delayq.toml", "/etc/delayq/delayq.toml"];

/// Top-level configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DelayqConfig {
    pub store: StoreConfig,
    pub queue: QueueOptions,
    pub consumer: ConsumerConfig,
}

/// Backing store connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    /// Upper bound on a single store round trip.
    pub response_timeout_ms: u64,
}

/// Options shared by every queue a client addresses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Prepended to the queue id to form the sorted-set key. Empty by default
    /// so the key is the bare queue id.
    pub key_prefix: String,
}

/// Polling consumer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Dequeue limit per poll; `<= 0` drains every due message.
    pub batch_size: i64,
    /// Sleep between polls that return nothing.
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            response_timeout_ms: 5_000,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 200,
        }
    }
}

impl StoreConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl DelayqConfig {
    /// Load configuration from `path`, or from the first default location
    /// that exists. Falls back to defaults when no file is found. An explicit
    /// path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for path in DEFAULT_CONFIG_PATHS.iter().map(Path::new) {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        info!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(path),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}
