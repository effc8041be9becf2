//! Run DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::bundle::Bundle;
use crate::domain::run::{Run, RunResult, RunStatus};

/// Request to submit a bundle for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    pub fab: Bundle,
    #[serde(default)]
    pub override_config: HashMap<String, String>,
}

/// Identifier allocated for a submitted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: i64,
}

/// Runner request to take ownership of a queued run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRunRequest {
    pub runner_id: String,
}

/// Everything a runner needs to execute a claimed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedRun {
    pub run_id: i64,
    pub bundle: Bundle,
    pub override_config: HashMap<String, String>,
}

/// Final status reported by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRunRequest {
    pub status: RunStatus,
    pub result: Option<RunResult>,
}

/// Status of a run after a stop request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopRunResponse {
    pub run_id: i64,
    pub status: RunStatus,
}

/// Lightweight run view for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub bundle_hash: String,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runner_id: Option<String>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.run_id,
            bundle_hash: run.bundle_hash,
            status: run.status,
            requested_at: run.requested_at,
            completed_at: run.completed_at,
            runner_id: run.runner_id,
        }
    }
}
