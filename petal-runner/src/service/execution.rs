//! Execution service
//!
//! Handles launching the app for a claimed run:
//! - Building the app's command line and environment
//! - Capturing stdout/stderr line by line into the run's log buffer
//! - Enforcing the run timeout and reacting to cancellation
//!
//! This service contains the core business logic for running apps.

use async_trait::async_trait;
use petal_core::domain::log::LogSource;
use petal_core::dto::run::ClaimedRun;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::execution::ExecutionResult;

/// Grace period for output readers after the process is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Service trait for executing runs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes a claimed run whose bundle is already in the workspace
    ///
    /// Must return promptly once `context.cancel` is triggered.
    async fn execute_run(&self, run: &ClaimedRun, context: Arc<RunContext>) -> ExecutionResult;
}

/// Runs the app as a child process
pub struct ProcessExecutionService {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessExecutionService {
    /// Creates a new process execution service
    ///
    /// `command` is the program followed by its arguments.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn build_command(&self, run: &ClaimedRun, context: &RunContext) -> Option<Command> {
        let (program, args) = self.command.split_first()?;

        let run_config =
            serde_json::to_string(&run.override_config).unwrap_or_else(|_| "{}".to_string());

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&context.workspace)
            .env("PETAL_RUN_ID", run.run_id.to_string())
            .env("PETAL_BUNDLE_PATH", context.bundle_path())
            .env("PETAL_BUNDLE_HASH", &run.bundle.hash_str)
            .env("PETAL_RUN_CONFIG", run_config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Some(command)
    }
}

#[async_trait]
impl ExecutionService for ProcessExecutionService {
    async fn execute_run(&self, run: &ClaimedRun, context: Arc<RunContext>) -> ExecutionResult {
        let Some(mut command) = self.build_command(run, &context) else {
            return ExecutionResult::SpawnFailed {
                error: "app command is empty".to_string(),
            };
        };

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn app for run {}: {}", run.run_id, e);
                return ExecutionResult::SpawnFailed {
                    error: e.to_string(),
                };
            }
        };

        info!(
            "Launched app for run {} (pid {:?})",
            run.run_id,
            child.id()
        );
        context.log_system(format!("Launched {}", self.command.join(" ")));

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogSource::Stdout, Arc::clone(&context)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogSource::Stderr, Arc::clone(&context)));
        }

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => ExecutionResult::Exited { code: status.code() },
                Err(e) => ExecutionResult::SpawnFailed { error: e.to_string() },
            },
            _ = tokio::time::sleep(self.timeout) => {
                warn!("Run {} exceeded its timeout of {:?}", run.run_id, self.timeout);
                kill(&mut child, run.run_id).await;
                ExecutionResult::TimedOut
            }
            _ = context.cancel.cancelled() => {
                info!("Run {} was stopped, killing app", run.run_id);
                kill(&mut child, run.run_id).await;
                ExecutionResult::Cancelled
            }
        };

        drain_readers(readers).await;

        match &result {
            ExecutionResult::Exited { code } => {
                context.log_system(format!("App exited with status {:?}", code))
            }
            ExecutionResult::TimedOut => {
                context.log_system(format!("Run timed out after {:?}", self.timeout))
            }
            ExecutionResult::Cancelled => context.log_system("Run stopped"),
            ExecutionResult::SpawnFailed { error } => {
                context.log_system(format!("Lost track of app: {}", error))
            }
        }

        result
    }
}

/// Forwards each line of a child pipe into the run's log buffer
fn spawn_reader<R>(pipe: R, source: LogSource, context: Arc<RunContext>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => context.log_output(source, line),
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading {} of run {}: {}", source.as_str(), context.run_id, e);
                    break;
                }
            }
        }
    })
}

/// Waits for output readers to hit EOF, abandoning them if a leftover
/// grandchild keeps the pipe open
async fn drain_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            reader.abort();
        }
    }
}

async fn kill(child: &mut Child, run_id: i64) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill app of run {}: {}", run_id, e);
    }
}
