//! Run domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Exit code reported for runs killed after exceeding their timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported for runs stopped on request
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// One execution of a submitted application bundle
///
/// Structure shared between exec server (persists) and runner (updates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: i64,
    pub bundle_hash: String,
    pub override_config: HashMap<String, String>,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runner_id: Option<String>,
    pub result: Option<RunResult>,
}

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RunStatus {
    /// Whether the run has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled | RunStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "Queued",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::TimedOut => "TimedOut",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(RunStatus::Queued),
            "Running" => Ok(RunStatus::Running),
            "Succeeded" => Ok(RunStatus::Succeeded),
            "Failed" => Ok(RunStatus::Failed),
            "Cancelled" => Ok(RunStatus::Cancelled),
            "TimedOut" => Ok(RunStatus::TimedOut),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Result of a run execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub exit_code: i32,
    pub error_message: Option<String>,
}

impl RunResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: 0,
            error_message: None,
        }
    }

    pub fn failed(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            error_message: Some(message.into()),
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(TIMEOUT_EXIT_CODE, "Run timed out")
    }

    pub fn cancelled() -> Self {
        Self::failed(CANCELLED_EXIT_CODE, "Run was stopped")
    }
}
