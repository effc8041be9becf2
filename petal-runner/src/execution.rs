//! Execution outcomes for the Petal runner
//!
//! These types only exist at runtime during run execution.
//! They are not persisted or sent over the network.

use petal_core::domain::run::{RunResult, RunStatus};

/// Exit code reported when the app process could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// How an app process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The process exited on its own; signal deaths carry no code
    Exited { code: Option<i32> },
    /// The process could not be launched
    SpawnFailed { error: String },
    /// The process ran past the run timeout and was killed
    TimedOut,
    /// The run was stopped and the process killed
    Cancelled,
}

impl ExecutionResult {
    /// Final status and result to report to the exec server
    pub fn into_completion(self) -> (RunStatus, RunResult) {
        match self {
            ExecutionResult::Exited { code: Some(0) } => {
                (RunStatus::Succeeded, RunResult::succeeded())
            }
            ExecutionResult::Exited { code: Some(code) } => (
                RunStatus::Failed,
                RunResult::failed(code, format!("App exited with status {}", code)),
            ),
            ExecutionResult::Exited { code: None } => (
                RunStatus::Failed,
                RunResult::failed(SPAWN_FAILURE_EXIT_CODE, "App was terminated by a signal"),
            ),
            ExecutionResult::SpawnFailed { error } => (
                RunStatus::Failed,
                RunResult::failed(
                    SPAWN_FAILURE_EXIT_CODE,
                    format!("Failed to start app: {}", error),
                ),
            ),
            ExecutionResult::TimedOut => (RunStatus::TimedOut, RunResult::timed_out()),
            ExecutionResult::Cancelled => (RunStatus::Cancelled, RunResult::cancelled()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petal_core::domain::run::{CANCELLED_EXIT_CODE, TIMEOUT_EXIT_CODE};

    #[test]
    fn test_execution_result_success() {
        let (status, result) = ExecutionResult::Exited { code: Some(0) }.into_completion();
        assert_eq!(status, RunStatus::Succeeded);
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_execution_result_failure() {
        let (status, result) = ExecutionResult::Exited { code: Some(2) }.into_completion();
        assert_eq!(status, RunStatus::Failed);
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_execution_result_spawn_failure() {
        let (status, result) = ExecutionResult::SpawnFailed {
            error: "No such file or directory".to_string(),
        }
        .into_completion();
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(result.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(result.error_message.unwrap().contains("No such file"));
    }

    #[test]
    fn test_execution_result_timeout_and_cancel() {
        let (status, result) = ExecutionResult::TimedOut.into_completion();
        assert_eq!(status, RunStatus::TimedOut);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);

        let (status, result) = ExecutionResult::Cancelled.into_completion();
        assert_eq!(status, RunStatus::Cancelled);
        assert_eq!(result.exit_code, CANCELLED_EXIT_CODE);
    }
}
