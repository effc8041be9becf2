//! Execution context for runs
//!
//! Contains all state needed while a run executes:
//! - Workspace directory holding the bundle
//! - Log buffer for captured output
//! - Cancellation token tripped when the run is stopped

use anyhow::{Context as AnyhowContext, Result};
use petal_core::domain::bundle::Bundle;
use petal_core::domain::log::{LogEntry, LogSource};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::service::{InMemoryLogBuffer, LogBufferService};

/// File name of the bundle inside a run workspace
pub const BUNDLE_FILE_NAME: &str = "bundle.fab";

/// Execution context shared between a run's tasks
pub struct RunContext {
    pub run_id: i64,

    /// Per-run directory, removed on cleanup
    pub workspace: PathBuf,

    /// Captured output waiting to be shipped
    pub logs: InMemoryLogBuffer,

    /// Tripped when the exec server reports the run as stopped
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Creates a new execution context
    ///
    /// The workspace is `<workspace_base>/<run_id>`; nothing is created on
    /// disk until [`RunContext::prepare`].
    pub fn new(run_id: i64, workspace_base: &Path, log_buffer_size: usize) -> Self {
        Self {
            run_id,
            workspace: workspace_base.join(run_id.to_string()),
            logs: InMemoryLogBuffer::new(log_buffer_size),
            cancel: CancellationToken::new(),
        }
    }

    /// Path the bundle is written to
    pub fn bundle_path(&self) -> PathBuf {
        self.workspace.join(BUNDLE_FILE_NAME)
    }

    /// Creates the workspace and writes the bundle into it
    pub async fn prepare(&self, bundle: &Bundle) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .with_context(|| format!("Failed to create workspace {}", self.workspace.display()))?;

        let path = self.bundle_path();
        tokio::fs::write(&path, &bundle.content)
            .await
            .with_context(|| format!("Failed to write bundle to {}", path.display()))?;

        Ok(path)
    }

    /// Removes the workspace and everything in it
    pub async fn cleanup(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.workspace).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove workspace {}", self.workspace.display())
            }),
        }
    }

    /// Records a line of app output
    pub fn log_output(&self, source: LogSource, message: String) {
        self.logs.add_entry(LogEntry::new(source, message));
    }

    /// Records a runner lifecycle message
    pub fn log_system(&self, message: impl Into<String>) {
        self.logs.add_entry(LogEntry::system(message));
    }

    /// Drains all log entries from the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        self.logs.drain()
    }

    /// Returns entries whose send failed so they go out with the next batch
    pub fn requeue_logs(&self, entries: Vec<LogEntry>) {
        self.logs.requeue(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_and_cleanup_workspace() {
        let base = tempfile::tempdir().unwrap();
        let context = RunContext::new(42, base.path(), 10);

        let path = context
            .prepare(&Bundle::new(b"bundle bytes".to_vec()))
            .await
            .unwrap();
        assert_eq!(path, base.path().join("42").join(BUNDLE_FILE_NAME));
        assert_eq!(std::fs::read(&path).unwrap(), b"bundle bytes");

        context.cleanup().await.unwrap();
        assert!(!context.workspace.exists());

        // Cleaning up twice is harmless
        context.cleanup().await.unwrap();
    }

    #[test]
    fn test_logs_are_drained_in_order() {
        let context = RunContext::new(1, Path::new("/tmp"), 10);
        context.log_system("starting");
        context.log_output(LogSource::Stdout, "hello".to_string());

        let logs = context.drain_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].source, LogSource::System);
        assert_eq!(logs[1].message, "hello");
        assert!(context.drain_logs().is_empty());
    }
}
