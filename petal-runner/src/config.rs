//! Runner configuration
//!
//! Defines all configurable parameters for the runner including
//! polling intervals, log shipping, execution limits and the app command.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Exec server base URL (e.g., "http://localhost:9093")
    pub exec_url: String,

    /// How often to poll the exec server for queued runs
    pub poll_interval: Duration,

    /// How often to send buffered logs and check for stop requests
    pub log_send_interval: Duration,

    /// Number of buffered log entries that triggers an early send
    pub log_buffer_size: usize,

    /// Maximum time a run can execute before it is killed
    pub run_timeout: Duration,

    /// Max runs executing at once on this runner
    pub max_parallel_runs: usize,

    /// Directory under which each run gets its own workspace
    pub workspace_base: PathBuf,

    /// Program and arguments launched for every run
    pub app_command: Vec<String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, exec_url: String) -> Self {
        Self {
            runner_id,
            exec_url,
            poll_interval: Duration::from_secs(5),
            log_send_interval: Duration::from_secs(2),
            log_buffer_size: 100,
            run_timeout: Duration::from_secs(3600), // 1 hour
            max_parallel_runs: 2,
            workspace_base: std::env::temp_dir().join("petal"),
            app_command: vec!["petal-app".to_string()],
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables (all optional):
    /// - RUNNER_ID (default: random UUID)
    /// - EXEC_URL (default: http://localhost:9093)
    /// - POLL_INTERVAL (seconds, default: 5)
    /// - LOG_SEND_INTERVAL (seconds, default: 2)
    /// - LOG_BUFFER_SIZE (default: 100)
    /// - RUN_TIMEOUT (seconds, default: 3600)
    /// - MAX_PARALLEL_RUNS (default: 2)
    /// - WORKSPACE_BASE (default: $TMPDIR/petal)
    /// - APP_COMMAND (default: petal-app)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(runner_id) = lookup("RUNNER_ID") {
            config.runner_id = runner_id;
        }
        if let Some(exec_url) = lookup("EXEC_URL") {
            config.exec_url = exec_url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "POLL_INTERVAL")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LOG_SEND_INTERVAL")? {
            config.log_send_interval = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, "LOG_BUFFER_SIZE")? {
            config.log_buffer_size = size;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "RUN_TIMEOUT")? {
            config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "MAX_PARALLEL_RUNS")? {
            config.max_parallel_runs = max;
        }
        if let Some(base) = lookup("WORKSPACE_BASE") {
            config.workspace_base = PathBuf::from(base);
        }
        if let Some(command) = lookup("APP_COMMAND") {
            config.app_command = command.split_whitespace().map(str::to_string).collect();
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.exec_url.is_empty() {
            anyhow::bail!("exec_url cannot be empty");
        }

        if !self.exec_url.starts_with("http://") && !self.exec_url.starts_with("https://") {
            anyhow::bail!("exec_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        if self.log_buffer_size == 0 {
            anyhow::bail!("log_buffer_size must be greater than 0");
        }

        if self.run_timeout.is_zero() {
            anyhow::bail!("run_timeout must be greater than 0");
        }

        if self.max_parallel_runs == 0 {
            anyhow::bail!("max_parallel_runs must be greater than 0");
        }

        if self.app_command.is_empty() {
            anyhow::bail!("app_command cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:9093".to_string(),
        )
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e))
        })
        .transpose()
}
