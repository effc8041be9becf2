//! Run Repository
//!
//! Handles all database operations related to runs.

use petal_core::domain::run::{Run, RunResult, RunStatus};
use sqlx::SqlitePool;
use std::collections::HashMap;

const RUN_COLUMNS: &str = r#"
    run_id, bundle_hash, override_config, status, requested_at, started_at,
    completed_at, runner_id, result_success, result_exit_code, result_error_message
"#;

/// Insert a new queued run
///
/// Returns `None` without touching the table when `run_id` is already taken.
pub async fn insert(
    pool: &SqlitePool,
    run_id: i64,
    bundle_hash: &str,
    override_config: &HashMap<String, String>,
) -> Result<Option<Run>, sqlx::Error> {
    let now = chrono::Utc::now();
    let config_json = serde_json::to_string(override_config)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO runs (run_id, bundle_hash, override_config, status, requested_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_id)
    .bind(bundle_hash)
    .bind(config_json)
    .bind(RunStatus::Queued.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(Run {
        run_id,
        bundle_hash: bundle_hash.to_string(),
        override_config: override_config.clone(),
        status: RunStatus::Queued,
        requested_at: now,
        started_at: None,
        completed_at: None,
        runner_id: None,
        result: None,
    }))
}

/// Find a run by ID
pub async fn find_by_id(pool: &SqlitePool, run_id: i64) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs WHERE run_id = ?",
        RUN_COLUMNS
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Current status of a run, without loading the rest of the row
pub async fn find_status(pool: &SqlitePool, run_id: i64) -> Result<Option<RunStatus>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM runs WHERE run_id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| string_to_status(&r.0)))
}

/// Status of a run plus whether it has been finalised
///
/// A stopped run is `Cancelled` before its runner has reported; it only gets
/// `completed_at` once the runner's completion arrives.
pub async fn find_state(
    pool: &SqlitePool,
    run_id: i64,
) -> Result<Option<(RunStatus, bool)>, sqlx::Error> {
    let row: Option<(String, Option<chrono::DateTime<chrono::Utc>>)> =
        sqlx::query_as("SELECT status, completed_at FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(status, completed_at)| (string_to_status(&status), completed_at.is_some())))
}

/// Find runs by status, oldest first
pub async fn find_by_status(pool: &SqlitePool, status: RunStatus) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs WHERE status = ? ORDER BY requested_at ASC",
        RUN_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// List all runs, newest first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs ORDER BY requested_at DESC",
        RUN_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Move a queued run to Running for the given runner
///
/// The update only applies while the run is still queued, so concurrent
/// claims resolve to a single winner. Returns whether this call won.
pub async fn claim(pool: &SqlitePool, run_id: i64, runner_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = ?, started_at = ?, runner_id = ?
        WHERE run_id = ? AND status = ?
        "#,
    )
    .bind(RunStatus::Running.as_str())
    .bind(chrono::Utc::now())
    .bind(runner_id)
    .bind(run_id)
    .bind(RunStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a non-terminal run to a terminal status
///
/// Returns `false` when the run was already terminal.
pub async fn update_status_to_completed(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = ?, completed_at = ?
        WHERE run_id = ? AND status IN (?, ?)
        "#,
    )
    .bind(status.as_str())
    .bind(chrono::Utc::now())
    .bind(run_id)
    .bind(RunStatus::Queued.as_str())
    .bind(RunStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel a run that no runner holds yet, finalising it
///
/// Returns `false` unless the run was still queued.
pub async fn cancel_queued(pool: &SqlitePool, run_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = ?, completed_at = ?
        WHERE run_id = ? AND status = ?
        "#,
    )
    .bind(RunStatus::Cancelled.as_str())
    .bind(chrono::Utc::now())
    .bind(run_id)
    .bind(RunStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark an executing run as cancelled, leaving `completed_at` unset until
/// its runner reports
///
/// Returns `false` unless the run was running.
pub async fn cancel_running(pool: &SqlitePool, run_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = ?
        WHERE run_id = ? AND status = ?
        "#,
    )
    .bind(RunStatus::Cancelled.as_str())
    .bind(run_id)
    .bind(RunStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finalise a cancelled run whose runner has now reported
///
/// Returns `false` when the run is not awaiting that report.
pub async fn finish_cancelled(pool: &SqlitePool, run_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET completed_at = ?
        WHERE run_id = ? AND status = ? AND completed_at IS NULL
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(run_id)
    .bind(RunStatus::Cancelled.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Update run result
pub async fn update_result(
    pool: &SqlitePool,
    run_id: i64,
    result: &RunResult,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE runs
        SET result_success = ?, result_exit_code = ?, result_error_message = ?
        WHERE run_id = ?
        "#,
    )
    .bind(result.success)
    .bind(result.exit_code)
    .bind(&result.error_message)
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_status(s: &str) -> RunStatus {
    s.parse().unwrap_or_else(|e| {
        tracing::warn!("{}; treating run as Failed", e);
        RunStatus::Failed
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: i64,
    bundle_hash: String,
    override_config: String,
    status: String,
    requested_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    runner_id: Option<String>,
    result_success: Option<bool>,
    result_exit_code: Option<i32>,
    result_error_message: Option<String>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        let status = string_to_status(&row.status);

        let result = row.result_success.map(|success| RunResult {
            success,
            exit_code: row.result_exit_code.unwrap_or(0),
            error_message: row.result_error_message,
        });

        let override_config = serde_json::from_str(&row.override_config).unwrap_or_default();

        Run {
            run_id: row.run_id,
            bundle_hash: row.bundle_hash,
            override_config,
            status,
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            runner_id: row.runner_id,
            result,
        }
    }
}
