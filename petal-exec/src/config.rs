//! Exec server configuration
//!
//! Settings are read from environment variables with fallback to defaults.

use std::time::Duration;

/// Default maximum accepted bundle size (64 MiB)
pub const DEFAULT_MAX_BUNDLE_BYTES: usize = 64 * 1024 * 1024;

/// Exec server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string
    pub database_url: String,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// How often an open log stream polls for new lines
    pub log_poll_interval: Duration,

    /// Largest bundle accepted by StartRun, in bytes
    pub max_bundle_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://petal.db?mode=rwc".to_string(),
            bind_addr: "0.0.0.0:9093".to_string(),
            log_poll_interval: Duration::from_millis(1000),
            max_bundle_bytes: DEFAULT_MAX_BUNDLE_BYTES,
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - PETAL_DATABASE_URL (default: sqlite://petal.db?mode=rwc)
    /// - PETAL_BIND_ADDR (default: 0.0.0.0:9093)
    /// - PETAL_LOG_POLL_INTERVAL_MS (default: 1000)
    /// - PETAL_MAX_BUNDLE_BYTES (default: 67108864)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let log_poll_interval = match lookup("PETAL_LOG_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(raw.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("PETAL_LOG_POLL_INTERVAL_MS must be an integer, got `{}`", raw)
            })?),
            None => defaults.log_poll_interval,
        };

        let max_bundle_bytes = match lookup("PETAL_MAX_BUNDLE_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                anyhow::anyhow!("PETAL_MAX_BUNDLE_BYTES must be an integer, got `{}`", raw)
            })?,
            None => defaults.max_bundle_bytes,
        };

        Ok(Self {
            database_url: lookup("PETAL_DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: lookup("PETAL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_poll_interval,
            max_bundle_bytes,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must be a sqlite: URL");
        }

        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.log_poll_interval.is_zero() {
            anyhow::bail!("log_poll_interval must be greater than 0");
        }

        if self.max_bundle_bytes == 0 {
            anyhow::bail!("max_bundle_bytes must be greater than 0");
        }

        Ok(())
    }
}
