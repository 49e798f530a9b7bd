// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML file, deserializes it into `ConfigFile`, and converts the
//! raw tables into the typed runtime `Config`.

use crate::config::model::{
    BusConfig, BusStub, Config, ConfigError, ConfigFile, DatabaseConfig, DatabaseStub,
    RetentionConfig,
};
use crate::greengrid_log;
use std::{fs, path::{Path, PathBuf}, time::Duration};

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Load and parse the configuration from `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    greengrid_log!(log::Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    greengrid_log!(log::Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text. Missing tables and keys take their defaults.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: ConfigFile = toml::from_str(txt)?;
    Config::try_from(raw)
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(raw: ConfigFile) -> Result<Self, Self::Error> {
        if raw.api.default_limit < 0 {
            return Err(ConfigError::InvalidValue {
                key:    "api.default_limit",
                reason: "must not be negative".into(),
            });
        }
        Ok(Config {
            logging:   raw.logging,
            database:  DatabaseConfig::try_from(raw.database)?,
            retention: validate_retention(raw.retention)?,
            bus:       BusConfig::try_from(raw.bus)?,
            api:       raw.api,
            metrics:   raw.metrics,
        })
    }
}

impl TryFrom<DatabaseStub> for DatabaseConfig {
    type Error = ConfigError;

    fn try_from(raw: DatabaseStub) -> Result<Self, Self::Error> {
        let checkpoint = parse_duration(&raw.checkpoint_interval)?;
        Ok(DatabaseConfig {
            path:                PathBuf::from(raw.path),
            purge_on_restart:    raw.purge_on_restart,
            synchronous:         raw.synchronous.parse()?,
            busy_timeout:        parse_duration(&raw.busy_timeout)?,
            journal_size_limit:  raw.journal_size_limit,
            checkpoint_interval: (!checkpoint.is_zero()).then_some(checkpoint),
        })
    }
}

impl TryFrom<BusStub> for BusConfig {
    type Error = ConfigError;

    fn try_from(raw: BusStub) -> Result<Self, Self::Error> {
        let (host, port) = parse_bus_url(&raw.url)?;
        if raw.qos > 2 {
            return Err(ConfigError::InvalidValue {
                key:    "bus.qos",
                reason: format!("{} is not an MQTT QoS level", raw.qos),
            });
        }
        if raw.topic.is_empty() {
            return Err(ConfigError::InvalidValue {
                key:    "bus.topic",
                reason: "must not be empty".into(),
            });
        }
        Ok(BusConfig {
            host,
            port,
            topic:           raw.topic,
            client_id:       raw.client_id,
            qos:             raw.qos,
            keep_alive:      parse_duration(&raw.keep_alive)?,
            reconnect_delay: parse_duration(&raw.reconnect_delay)?,
            queue_capacity:  raw.queue_capacity.max(1),
        })
    }
}

fn validate_retention(cfg: RetentionConfig) -> Result<RetentionConfig, ConfigError> {
    if cfg.capacity == 0 {
        return Err(ConfigError::InvalidValue {
            key:    "retention.capacity",
            reason: "must be at least 1".into(),
        });
    }
    if cfg.check_every == 0 {
        return Err(ConfigError::InvalidValue {
            key:    "retention.check_every",
            reason: "must be at least 1".into(),
        });
    }
    Ok(cfg)
}

/// `"30s"`, `"5m"`, `"1h 30m"` → `Duration`.
fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::InvalidDuration(value.to_owned(), e))
}

/// Split `mqtt://host[:port]` (or `tcp://`) into host and port.
pub fn parse_bus_url(url: &str) -> Result<(String, u16), ConfigError> {
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .ok_or_else(|| ConfigError::InvalidUrl(url.to_owned()))?;
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidUrl(url.to_owned()))?;
            (host, port)
        }
        None => (rest, DEFAULT_MQTT_PORT),
    };
    if host.is_empty() {
        return Err(ConfigError::InvalidUrl(url.to_owned()));
    }
    Ok((host.to_owned(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Synchronous;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.retention.capacity, 5_000);
        assert_eq!(cfg.retention.check_every, 1);
        assert_eq!(cfg.bus.topic, "greengrid/oficinas/data");
        assert_eq!(cfg.bus.host, "localhost");
        assert_eq!(cfg.bus.port, 1883);
        assert_eq!(cfg.api.default_limit, 100);
        assert_eq!(cfg.api.listen.port(), 4000);
        assert_eq!(cfg.database.synchronous, Synchronous::Normal);
        assert_eq!(cfg.database.checkpoint_interval, Some(Duration::from_secs(300)));
        assert!(cfg.metrics.listen.is_none());
    }

    #[test]
    fn tables_override_defaults() {
        let cfg = parse(
            r#"
            [database]
            path = "/var/lib/greengrid/cache.db"
            synchronous = "full"
            busy_timeout = "250ms"
            checkpoint_interval = "0s"

            [retention]
            capacity = 3
            check_every = 10

            [bus]
            url = "mqtt://broker.local:11883"
            topic = "greengrid/planta/data"
            qos = 0

            [api]
            listen = "127.0.0.1:8080"
            default_limit = 25

            [metrics]
            listen = "127.0.0.1:9000"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.path, PathBuf::from("/var/lib/greengrid/cache.db"));
        assert_eq!(cfg.database.synchronous, Synchronous::Full);
        assert_eq!(cfg.database.busy_timeout, Duration::from_millis(250));
        assert_eq!(cfg.database.checkpoint_interval, None);
        assert_eq!(cfg.retention.capacity, 3);
        assert_eq!(cfg.retention.check_every, 10);
        assert_eq!(cfg.bus.host, "broker.local");
        assert_eq!(cfg.bus.port, 11883);
        assert_eq!(cfg.bus.qos, 0);
        assert_eq!(cfg.api.default_limit, 25);
        assert_eq!(cfg.metrics.listen.map(|a| a.port()), Some(9000));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = parse("[retention]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "retention.capacity", .. }));
    }

    #[test]
    fn bad_duration_is_reported_with_its_value() {
        let err = parse("[bus]\nkeep_alive = \"soon\"\n").unwrap_err();
        match err {
            ConfigError::InvalidDuration(v, _) => assert_eq!(v, "soon"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bus_url_parsing() {
        assert_eq!(parse_bus_url("mqtt://localhost").unwrap(), ("localhost".into(), 1883));
        assert_eq!(parse_bus_url("tcp://10.0.0.5:1884/").unwrap(), ("10.0.0.5".into(), 1884));
        assert!(parse_bus_url("http://localhost:1883").is_err());
        assert!(parse_bus_url("mqtt://:1883").is_err());
        assert!(parse_bus_url("mqtt://host:notaport").is_err());
    }
}
