//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

pub const ENV_DATABASE_URL: &str = "STOCKLEDGER_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "STOCKLEDGER_MAX_CONNECTIONS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "STOCKLEDGER_BUSY_TIMEOUT_MS";
pub const ENV_MAX_CAS_RETRIES: &str = "STOCKLEDGER_MAX_CAS_RETRIES";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Store and engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite URL, e.g. `sqlite://stockledger.db`.
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Compare-and-swap attempts per mutation before giving up.
    pub max_cas_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://stockledger.db".to_string(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            max_cas_retries: 8,
        }
    }
}

impl StoreConfig {
    /// Load from `STOCKLEDGER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup(ENV_DATABASE_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.database_url);

        let max_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => parse_positive(ENV_MAX_CONNECTIONS, &raw)?,
            None => defaults.max_connections,
        };

        let busy_timeout = match lookup(ENV_BUSY_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse_number(ENV_BUSY_TIMEOUT_MS, &raw)?),
            None => defaults.busy_timeout,
        };

        let max_cas_retries = match lookup(ENV_MAX_CAS_RETRIES) {
            Some(raw) => parse_positive(ENV_MAX_CAS_RETRIES, &raw)?,
            None => defaults.max_cas_retries,
        };

        Ok(Self {
            database_url,
            max_connections,
            busy_timeout,
            max_cas_retries,
        })
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
        key,
        expected: "a non-negative integer",
        value: raw.to_string(),
    })
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "a positive integer",
            value: raw.to_string(),
        }),
    }
}
