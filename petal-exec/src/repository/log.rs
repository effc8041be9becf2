//! Log Repository
//!
//! Handles all database operations related to run logs.

use petal_core::domain::log::{LogEntry, LogSource};
use sqlx::SqlitePool;

/// Append log entries for a run, preserving their order
pub async fn add_entries(
    pool: &SqlitePool,
    run_id: i64,
    entries: &[LogEntry],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO run_logs (run_id, timestamp, source, message)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(entry.timestamp)
        .bind(entry.source.as_str())
        .bind(&entry.message)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Log entries of a run with a cursor greater than `after`, in cursor order
///
/// Each entry is paired with its cursor.
pub async fn find_after(
    pool: &SqlitePool,
    run_id: i64,
    after: i64,
    limit: i64,
) -> Result<Vec<(i64, LogEntry)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT id, timestamp, source, message
        FROM run_logs
        WHERE run_id = ? AND id > ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(run_id)
    .bind(after)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_source(s: &str) -> LogSource {
    s.parse().unwrap_or_else(|e| {
        tracing::warn!("{}; treating line as Stdout", e);
        LogSource::Stdout
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    timestamp: chrono::DateTime<chrono::Utc>,
    source: String,
    message: String,
}

impl From<LogRow> for (i64, LogEntry) {
    fn from(row: LogRow) -> Self {
        (
            row.id,
            LogEntry {
                timestamp: row.timestamp,
                source: string_to_source(&row.source),
                message: row.message,
            },
        )
    }
}
