//! Server configuration, read from `HERDBOOK_*` environment variables.
//!
//! Every variable is optional; unset variables fall back to the library
//! defaults. A variable that is set but malformed is a startup error.

use std::time::Duration;

use herdbook_db::{CoordinatorConfig, DbConfig, DbCredentials};
use herdbook_ops::OpsConfig;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer in range, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} is set without {1}")]
    IncompleteCredentials(&'static str, &'static str),
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub coordinator: CoordinatorConfig,
    pub ops: OpsConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("HERDBOOK_DB_URL") {
            config.db.url = url;
        }
        if let Some(namespace) = lookup("HERDBOOK_DB_NAMESPACE") {
            config.db.namespace = namespace;
        }
        if let Some(database) = lookup("HERDBOOK_DB_DATABASE") {
            config.db.database = database;
        }
        match (lookup("HERDBOOK_DB_USER"), lookup("HERDBOOK_DB_PASSWORD")) {
            (Some(username), Some(password)) => {
                config.db.credentials = Some(DbCredentials { username, password });
            }
            (Some(_), None) => {
                return Err(ConfigError::IncompleteCredentials(
                    "HERDBOOK_DB_USER",
                    "HERDBOOK_DB_PASSWORD",
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteCredentials(
                    "HERDBOOK_DB_PASSWORD",
                    "HERDBOOK_DB_USER",
                ));
            }
            (None, None) => {}
        }
        if config.db.url.starts_with("mem://") {
            config.db.credentials = None;
        }

        if let Some(n) = count(&lookup, "HERDBOOK_MAX_UNITS", Semaphore::MAX_PERMITS)? {
            config.coordinator.max_concurrent_units = n;
        }
        if let Some(ms) = number(&lookup, "HERDBOOK_ACQUIRE_TIMEOUT_MS")? {
            config.coordinator.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = number(&lookup, "HERDBOOK_UNIT_TIMEOUT_MS")? {
            config.coordinator.unit_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = count(&lookup, "HERDBOOK_MAX_BATCH", usize::MAX)? {
            config.ops.max_batch_size = n;
        }

        Ok(config)
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}

/// A [`number`] that must also fit in `usize` and stay at or below `max`.
fn count(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    max: usize,
) -> Result<Option<usize>, ConfigError> {
    let Some(n) = number(lookup, var)? else {
        return Ok(None);
    };
    match usize::try_from(n) {
        Ok(n) if n <= max => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: n.to_string(),
        }),
    }
}
