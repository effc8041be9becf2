//! Run Service
//!
//! Business logic for run submission and lifecycle.

use petal_core::config::validate_overrides;
use petal_core::domain::bundle::Bundle;
use petal_core::domain::run::{Run, RunResult, RunStatus};
use petal_core::dto::run::{ClaimedRun, StartRunRequest};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::{bundle_repository, run_repository};

/// Attempts at drawing an unused run id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

/// Submission limits enforced by `start_run`
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_bundle_bytes: usize,
}

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(i64),
    InvalidState(String),
    ValidationError(String),
    Internal(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RunError {
    fn from(err: sqlx::Error) -> Self {
        RunError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Store the submitted bundle and queue a new run for it
///
/// Returns the allocated run id.
pub async fn start_run(pool: &SqlitePool, req: StartRunRequest, limits: RunLimits) -> Result<i64> {
    let bundle_hash = validate_submission(&req, limits)?;

    if bundle_repository::insert_if_absent(pool, &bundle_hash, &req.fab.content).await? {
        tracing::debug!(
            "Stored new bundle {} ({} bytes)",
            bundle_hash,
            req.fab.content.len()
        );
    }

    for _ in 0..MAX_ID_ATTEMPTS {
        let run_id = generate_run_id();
        if let Some(run) =
            run_repository::insert(pool, run_id, &bundle_hash, &req.override_config).await?
        {
            tracing::info!(
                "Run {} queued for bundle {} with {} override(s)",
                run.run_id,
                run.bundle_hash,
                run.override_config.len()
            );
            return Ok(run.run_id);
        }
        tracing::debug!("Run id {} already taken, drawing another", run_id);
    }

    Err(RunError::Internal(
        "Could not allocate a unique run id".to_string(),
    ))
}

/// Get a run by ID
pub async fn get_run(pool: &SqlitePool, run_id: i64) -> Result<Run> {
    run_repository::find_by_id(pool, run_id)
        .await?
        .ok_or(RunError::NotFound(run_id))
}

/// List all runs, newest first
pub async fn list_runs(pool: &SqlitePool) -> Result<Vec<Run>> {
    Ok(run_repository::list_all(pool).await?)
}

/// List runs in a given status, oldest first
pub async fn list_runs_by_status(pool: &SqlitePool, status: RunStatus) -> Result<Vec<Run>> {
    Ok(run_repository::find_by_status(pool, status).await?)
}

/// Reserve a queued run for execution by a runner
pub async fn claim_run(pool: &SqlitePool, run_id: i64, runner_id: &str) -> Result<ClaimedRun> {
    if runner_id.trim().is_empty() {
        return Err(RunError::ValidationError(
            "runner_id cannot be empty".to_string(),
        ));
    }

    let run = get_run(pool, run_id).await?;

    if !run_repository::claim(pool, run_id, runner_id).await? {
        let current = run_repository::find_status(pool, run_id)
            .await?
            .unwrap_or(run.status);
        return Err(RunError::InvalidState(format!(
            "Run {} is not in Queued state (current: {})",
            run_id, current
        )));
    }

    let content = bundle_repository::find_content(pool, &run.bundle_hash)
        .await?
        .ok_or_else(|| {
            RunError::Internal(format!(
                "Bundle {} of run {} is missing",
                run.bundle_hash, run_id
            ))
        })?;

    tracing::info!("Run {} claimed by runner {}", run_id, runner_id);

    Ok(ClaimedRun {
        run_id,
        bundle: Bundle {
            hash_str: run.bundle_hash,
            content,
        },
        override_config: run.override_config,
    })
}

/// Complete a run with final status and result
///
/// A run stopped while executing stays `Cancelled` whatever the runner
/// reports; the report only finalises it. Reports for runs that are already
/// final are accepted and dropped.
pub async fn complete_run(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    result: Option<RunResult>,
) -> Result<()> {
    validate_completion_status(status)?;

    let run = get_run(pool, run_id).await?;

    if run.status != RunStatus::Running && run.status != RunStatus::Cancelled {
        tracing::warn!(
            "Completing run {} that is not in Running state (current: {})",
            run_id,
            run.status
        );
    }

    if run_repository::update_status_to_completed(pool, run_id, status).await? {
        if let Some(result) = result {
            run_repository::update_result(pool, run_id, &result).await?;
        }
        tracing::info!("Run {} completed with status: {}", run_id, status);
        return Ok(());
    }

    if run_repository::finish_cancelled(pool, run_id).await? {
        match result {
            Some(result) if status == RunStatus::Cancelled => {
                run_repository::update_result(pool, run_id, &result).await?;
            }
            _ => tracing::warn!(
                "Run {} was stopped; keeping Cancelled over reported {}",
                run_id,
                status
            ),
        }
        tracing::info!("Stopped run {} finalised by its runner", run_id);
        return Ok(());
    }

    tracing::warn!(
        "Ignoring completion of run {} as {}: already {}",
        run_id,
        status,
        run.status
    );
    Ok(())
}

/// Stop a queued or running run
///
/// A queued run is finalised at once. A running run turns `Cancelled` but is
/// only finalised when its runner, which notices the status on its next
/// check and kills the app, reports completion.
pub async fn stop_run(pool: &SqlitePool, run_id: i64) -> Result<RunStatus> {
    let run = get_run(pool, run_id).await?;

    if run.status.is_terminal() {
        return Err(RunError::InvalidState(format!(
            "Cannot stop run {} in state {}",
            run_id, run.status
        )));
    }

    let stopped = run_repository::cancel_queued(pool, run_id).await?
        || run_repository::cancel_running(pool, run_id).await?;
    if !stopped {
        let current = run_repository::find_status(pool, run_id)
            .await?
            .unwrap_or(run.status);
        return Err(RunError::InvalidState(format!(
            "Cannot stop run {} in state {}",
            run_id, current
        )));
    }

    run_repository::update_result(pool, run_id, &RunResult::cancelled()).await?;

    tracing::info!("Run {} stopped", run_id);

    Ok(RunStatus::Cancelled)
}

// =============================================================================
// Validation
// =============================================================================

fn validate_submission(req: &StartRunRequest, limits: RunLimits) -> Result<String> {
    let bundle_hash = req
        .fab
        .verify()
        .map_err(|e| RunError::ValidationError(e.to_string()))?;

    if req.fab.content.len() > limits.max_bundle_bytes {
        return Err(RunError::ValidationError(format!(
            "Bundle is {} bytes (max: {})",
            req.fab.content.len(),
            limits.max_bundle_bytes
        )));
    }

    validate_overrides(&req.override_config)
        .map_err(|e| RunError::ValidationError(e.to_string()))?;

    Ok(bundle_hash)
}

fn validate_completion_status(status: RunStatus) -> Result<()> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(RunError::ValidationError(format!(
            "Invalid completion status: {}",
            status
        )))
    }
}

/// Random positive 63-bit run id
fn generate_run_id() -> i64 {
    loop {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        let id = (high >> 1) as i64;
        if id > 0 {
            return id;
        }
    }
}
