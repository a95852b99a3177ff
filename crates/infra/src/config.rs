//! Configuration loading and representation.
//!
//! Everything is read from environment variables; unset variables fall back
//! to development defaults (in-memory store, in-memory bus).

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ACCOUNT_NUMBER_ATTEMPTS: u32 = 5;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_NOTIFY_CHANNEL: &str = "ledger.notifications";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Where notifications are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyBus {
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres when true, in-memory otherwise.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub lock_timeout: Duration,
    pub account_number_attempts: u32,
    pub notify_bus: NotifyBus,
    pub redis_url: String,
    pub notify_channel: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
            notify_bus: NotifyBus::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            notify_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let use_persistent_stores = match lookup("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => defaults.use_persistent_stores,
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let lock_timeout = match lookup("LOCK_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(parse_positive("LOCK_TIMEOUT_MS", &v)?),
            None => defaults.lock_timeout,
        };

        let account_number_attempts = match lookup("ACCOUNT_NUMBER_ATTEMPTS") {
            Some(v) => {
                let n = parse_positive("ACCOUNT_NUMBER_ATTEMPTS", &v)?;
                u32::try_from(n).map_err(|e| invalid("ACCOUNT_NUMBER_ATTEMPTS", &v, e))?
            }
            None => defaults.account_number_attempts,
        };

        let notify_bus = match lookup("NOTIFY_BUS").as_deref().map(str::to_lowercase) {
            None => defaults.notify_bus,
            Some(v) if v == "memory" => NotifyBus::Memory,
            Some(v) if v == "redis" => NotifyBus::Redis,
            Some(v) => return Err(invalid("NOTIFY_BUS", &v, "expected memory or redis")),
        };

        Ok(Self {
            use_persistent_stores,
            database_url,
            lock_timeout,
            account_number_attempts,
            notify_bus,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            notify_channel: lookup("NOTIFY_CHANNEL").unwrap_or(defaults.notify_channel),
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    value
        .trim()
        .to_lowercase()
        .parse::<bool>()
        .map_err(|e| invalid(name, value, e))
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(invalid(name, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(name, value, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(load(&[]).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("USE_PERSISTENT_STORES", "TRUE"),
            ("DATABASE_URL", "postgres://ledger@localhost/ledger"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("ACCOUNT_NUMBER_ATTEMPTS", "3"),
            ("NOTIFY_BUS", "redis"),
            ("NOTIFY_CHANNEL", "bank.events"),
        ])
        .unwrap();

        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.account_number_attempts, 3);
        assert_eq!(cfg.notify_bus, NotifyBus::Redis);
        assert_eq!(cfg.notify_channel, "bank.events");
        assert_eq!(cfg.redis_url, DEFAULT_REDIS_URL);
    }

    #[test]
    fn persistent_mode_requires_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn rejects_zero_timeout_and_unknown_bus() {
        assert!(matches!(
            load(&[("LOCK_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { name: "LOCK_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            load(&[("NOTIFY_BUS", "kafka")]),
            Err(ConfigError::Invalid { name: "NOTIFY_BUS", .. })
        ));
    }
}
