// src/config/model.rs

use serde::Deserialize;
use shared::constants::{
    DEFAULT_API_PORT, DEFAULT_BUS_URL, DEFAULT_CAPACITY, DEFAULT_DB_FILE, DEFAULT_QUERY_LIMIT,
    DEFAULT_TOPIC,
};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Top-level runtime config
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging:   LoggingConfig,
    pub database:  DatabaseConfig,
    pub retention: RetentionConfig,
    pub bus:       BusConfig,
    pub api:       ApiConfig,
    pub metrics:   MetricsConfig,
}

/// The file as written: durations and addresses are still strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub logging:   LoggingConfig,
    pub database:  DatabaseStub,
    pub retention: RetentionConfig,
    pub bus:       BusStub,
    pub api:       ApiConfig,
    pub metrics:   MetricsConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enable: bool,
    pub file:   Option<String>,
    pub level:  String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: "INFO".into() }
    }
}

/// Raw `[database]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseStub {
    pub path:                String,
    pub purge_on_restart:    bool,
    pub synchronous:         String,
    pub busy_timeout:        String,
    pub journal_size_limit:  u64,
    pub checkpoint_interval: String,
}

impl Default for DatabaseStub {
    fn default() -> Self {
        Self {
            path:                DEFAULT_DB_FILE.into(),
            purge_on_restart:    false,
            synchronous:         "NORMAL".into(),
            busy_timeout:        "1s".into(),
            journal_size_limit:  50_000_000,
            checkpoint_interval: "5m".into(),
        }
    }
}

/// Fully-typed `[database]` settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Relative paths are resolved against the executable directory.
    pub path:                PathBuf,
    pub purge_on_restart:    bool,
    pub synchronous:         Synchronous,
    /// Upper bound on any wait for a database lock.
    pub busy_timeout:        Duration,
    pub journal_size_limit:  u64,
    /// `None` disables periodic WAL checkpoints.
    pub checkpoint_interval: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path:                PathBuf::from(DEFAULT_DB_FILE),
            purge_on_restart:    false,
            synchronous:         Synchronous::Normal,
            busy_timeout:        Duration::from_secs(1),
            journal_size_limit:  50_000_000,
            checkpoint_interval: Some(Duration::from_secs(300)),
        }
    }
}

/// SQLite `synchronous` levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronous {
    Off,
    Normal,
    Full,
    Extra,
}

impl Synchronous {
    pub fn as_str(self) -> &'static str {
        match self {
            Synchronous::Off    => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full   => "FULL",
            Synchronous::Extra  => "EXTRA",
        }
    }
}

/// Allow `"normal"` → `Synchronous::Normal`
impl FromStr for Synchronous {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OFF"    => Ok(Synchronous::Off),
            "NORMAL" => Ok(Synchronous::Normal),
            "FULL"   => Ok(Synchronous::Full),
            "EXTRA"  => Ok(Synchronous::Extra),
            other    => Err(ConfigError::InvalidValue {
                key:    "database.synchronous",
                reason: format!("unknown level '{other}'"),
            }),
        }
    }
}

/// Mirror of the `[retention]` table
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub capacity:    u64,
    /// Run the trim after every K-th insert.
    pub check_every: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, check_every: 1 }
    }
}

/// Raw `[bus]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusStub {
    pub url:             String,
    pub topic:           String,
    pub client_id:       String,
    pub qos:             u8,
    pub keep_alive:      String,
    pub reconnect_delay: String,
    pub queue_capacity:  usize,
}

impl Default for BusStub {
    fn default() -> Self {
        Self {
            url:             DEFAULT_BUS_URL.into(),
            topic:           DEFAULT_TOPIC.into(),
            client_id:       "greengrid-ingest".into(),
            qos:             1,
            keep_alive:      "30s".into(),
            reconnect_delay: "2s".into(),
            queue_capacity:  1_024,
        }
    }
}

/// Fully-typed `[bus]` settings
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host:            String,
    pub port:            u16,
    pub topic:           String,
    pub client_id:       String,
    pub qos:             u8,
    pub keep_alive:      Duration,
    pub reconnect_delay: Duration,
    pub queue_capacity:  usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host:            "localhost".into(),
            port:            1883,
            topic:           DEFAULT_TOPIC.into(),
            client_id:       "greengrid-ingest".into(),
            qos:             1,
            keep_alive:      Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            queue_capacity:  1_024,
        }
    }
}

/// Mirror of the `[api]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen:        SocketAddr,
    pub default_limit: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen:        SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT)),
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Mirror of the `[metrics]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape address; no exporter when absent.
    pub listen: Option<SocketAddr>,
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("invalid bus url '{0}'")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
