//! Configuration management for the sync layer.

use std::env;
use std::time::Duration;

use crate::channel::RetryPolicy;

/// Sync configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifier of this device in upload names
    pub sender_id: String,
    /// Interval between scheduled commit cycles
    pub sync_interval: Duration,
    /// Interval between request send attempts
    pub retry_interval: Duration,
    /// Overall request deadline
    pub request_timeout: Duration,
    /// Rows younger than this are not pushed yet
    pub staleness: Duration,
    /// Committed rows older than this are swept
    pub retention: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sender_id: "vigil-phone".to_string(),
            sync_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            staleness: Duration::from_secs(60),
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            sender_id: env::var("VIGIL_SENDER_ID").unwrap_or(defaults.sender_id),
            sync_interval: secs_var("VIGIL_SYNC_INTERVAL_SECS", defaults.sync_interval)?,
            retry_interval: secs_var("VIGIL_RETRY_INTERVAL_SECS", defaults.retry_interval)?,
            request_timeout: secs_var("VIGIL_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            staleness: secs_var("VIGIL_STALENESS_SECS", defaults.staleness)?,
            retention: secs_var("VIGIL_RETENTION_SECS", defaults.retention)?,
        })
    }

    /// The retry policy slice of this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: self.retry_interval,
            timeout: self.request_timeout,
        }
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidSeconds(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a whole number of seconds")]
    InvalidSeconds(&'static str),
}
