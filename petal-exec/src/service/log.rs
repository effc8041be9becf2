//! Log Service
//!
//! Business logic for run log ingestion and streaming.

use std::time::Duration;

use futures::Stream;
use petal_core::domain::log::LogEntry;
use petal_core::dto::log::StreamLogsResponse;
use sqlx::SqlitePool;

use crate::repository::{log_repository, run_repository};

/// Lines fetched per database round trip while streaming
const STREAM_BATCH_SIZE: i64 = 500;

/// Service error type
#[derive(Debug)]
pub enum LogError {
    RunNotFound(i64),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for LogError {
    fn from(err: sqlx::Error) -> Self {
        LogError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, LogError>;

/// Add log entries for a run
pub async fn add_log_entries(pool: &SqlitePool, run_id: i64, entries: Vec<LogEntry>) -> Result<()> {
    validate_log_entries(&entries)?;

    if run_repository::find_status(pool, run_id).await?.is_none() {
        return Err(LogError::RunNotFound(run_id));
    }

    if entries.is_empty() {
        return Ok(());
    }

    log_repository::add_entries(pool, run_id, &entries).await?;

    tracing::debug!("Added {} log entries for run: {}", entries.len(), run_id);

    Ok(())
}

/// Log entries after `after`, paired with their cursor
pub async fn get_logs_after(
    pool: &SqlitePool,
    run_id: i64,
    after: i64,
    limit: i64,
) -> Result<Vec<(i64, LogEntry)>> {
    Ok(log_repository::find_after(pool, run_id, after, limit).await?)
}

struct StreamState {
    pool: SqlitePool,
    run_id: i64,
    cursor: i64,
    poll_interval: Duration,
}

/// Stream the output of a run, starting after `after`
///
/// Every item carries the lines that arrived since the previous one. Once the
/// run is finalised and everything has been delivered the stream ends. A run
/// stopped while executing counts as finalised only after its runner reports,
/// so the runner's last lines still reach open streams. The run's state is
/// read before its lines so nothing written before completion can be missed.
pub fn log_stream(
    pool: SqlitePool,
    run_id: i64,
    after: i64,
    poll_interval: Duration,
) -> impl Stream<Item = Result<StreamLogsResponse>> + Send + 'static {
    let state = StreamState {
        pool,
        run_id,
        cursor: after,
        poll_interval,
    };

    futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match next_chunk(&mut state).await {
                Ok(Step::Chunk(response)) => return Some((Ok(response), Some(state))),
                Ok(Step::Finished) => {
                    tracing::debug!("Log stream for run {} finished", state.run_id);
                    return None;
                }
                Ok(Step::Idle) => tokio::time::sleep(state.poll_interval).await,
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}

enum Step {
    Chunk(StreamLogsResponse),
    Idle,
    Finished,
}

async fn next_chunk(state: &mut StreamState) -> Result<Step> {
    let (status, finalised) = run_repository::find_state(&state.pool, state.run_id)
        .await?
        .ok_or(LogError::RunNotFound(state.run_id))?;

    let lines =
        get_logs_after(&state.pool, state.run_id, state.cursor, STREAM_BATCH_SIZE).await?;

    if let Some((last, _)) = lines.last() {
        state.cursor = *last;
        let log_output = lines.iter().map(|(_, entry)| entry.render()).collect();
        return Ok(Step::Chunk(StreamLogsResponse {
            log_output,
            cursor: state.cursor,
        }));
    }

    if status.is_terminal() && finalised {
        Ok(Step::Finished)
    } else {
        Ok(Step::Idle)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_log_entries(entries: &[LogEntry]) -> Result<()> {
    const MAX_MESSAGE_LENGTH: usize = 10_000;
    const MAX_BATCH_SIZE: usize = 1000;

    if entries.len() > MAX_BATCH_SIZE {
        return Err(LogError::ValidationError(format!(
            "Too many log entries in batch (max: {})",
            MAX_BATCH_SIZE
        )));
    }

    for (i, entry) in entries.iter().enumerate() {
        if entry.message.len() > MAX_MESSAGE_LENGTH {
            return Err(LogError::ValidationError(format!(
                "Log entry {} message too long (max: {} chars)",
                i, MAX_MESSAGE_LENGTH
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::run_service::{self, RunLimits};
    use crate::service::test_support::{pool, start_request};
    use futures::StreamExt;
    use petal_core::domain::log::LogSource;
    use petal_core::domain::run::{RunResult, RunStatus};

    const LIMITS: RunLimits = RunLimits {
        max_bundle_bytes: 1024,
    };
    const POLL: Duration = Duration::from_millis(10);

    async fn queued_run(pool: &SqlitePool) -> i64 {
        run_service::start_run(pool, start_request(b"app", &[]), LIMITS)
            .await
            .unwrap()
    }

    fn stdout(message: &str) -> LogEntry {
        LogEntry::new(LogSource::Stdout, message)
    }

    #[test]
    fn test_validate_log_entries_valid() {
        let entries = vec![stdout("Test message"), LogEntry::new(LogSource::Stderr, "oops")];
        assert!(validate_log_entries(&entries).is_ok());
    }

    #[test]
    fn test_validate_log_entries_too_many() {
        let entries: Vec<LogEntry> = (0..1001).map(|i| stdout(&format!("Message {}", i))).collect();
        assert!(matches!(
            validate_log_entries(&entries),
            Err(LogError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_log_entries_message_too_long() {
        let entries = vec![stdout(&"x".repeat(10_001))];
        assert!(matches!(
            validate_log_entries(&entries),
            Err(LogError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_add_logs_for_unknown_run() {
        let pool = pool().await;
        assert!(matches!(
            add_log_entries(&pool, 42, vec![stdout("hello")]).await,
            Err(LogError::RunNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_logs_after_cursor() {
        let pool = pool().await;
        let run_id = queued_run(&pool).await;

        add_log_entries(&pool, run_id, vec![stdout("one"), stdout("two")])
            .await
            .unwrap();
        add_log_entries(&pool, run_id, vec![stdout("three")])
            .await
            .unwrap();

        let all = get_logs_after(&pool, run_id, 0, 100).await.unwrap();
        assert_eq!(all.len(), 3);

        let rest = get_logs_after(&pool, run_id, all[0].0, 100).await.unwrap();
        let messages: Vec<_> = rest.iter().map(|(_, e)| e.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_stream_of_finished_run_drains_and_ends() {
        let pool = pool().await;
        let run_id = queued_run(&pool).await;
        add_log_entries(&pool, run_id, vec![stdout("hello"), stdout("world")])
            .await
            .unwrap();
        run_service::stop_run(&pool, run_id).await.unwrap();

        let chunks: Vec<_> = log_stream(pool, run_id, 0, POLL).collect().await;
        assert_eq!(chunks.len(), 1);
        let chunk = chunks.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.log_output, "hello\nworld\n");
        assert!(chunk.cursor > 0);
    }

    #[tokio::test]
    async fn test_stream_resumes_after_cursor() {
        let pool = pool().await;
        let run_id = queued_run(&pool).await;
        add_log_entries(&pool, run_id, vec![stdout("first")])
            .await
            .unwrap();

        let mut stream = Box::pin(log_stream(pool.clone(), run_id, 0, POLL));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.log_output, "first\n");
        drop(stream);

        add_log_entries(&pool, run_id, vec![stdout("second")])
            .await
            .unwrap();
        run_service::claim_run(&pool, run_id, "runner").await.unwrap();
        run_service::complete_run(
            &pool,
            run_id,
            RunStatus::Succeeded,
            Some(RunResult::succeeded()),
        )
        .await
        .unwrap();

        let rest: Vec<_> = log_stream(pool, run_id, first.cursor, POLL)
            .map(|chunk| chunk.unwrap().log_output)
            .collect()
            .await;
        assert_eq!(rest, vec!["second\n".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_waits_for_new_lines() {
        let pool = pool().await;
        let run_id = queued_run(&pool).await;

        let mut stream = Box::pin(log_stream(pool.clone(), run_id, 0, POLL));

        let writer = {
            let pool = pool.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                add_log_entries(&pool, run_id, vec![stdout("late line")])
                    .await
                    .unwrap();
                run_service::stop_run(&pool, run_id).await.unwrap();
            })
        };

        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(chunk.log_output, "late line\n");

        let end = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_of_stopped_run_waits_for_runner_tail() {
        let pool = pool().await;
        let run_id = queued_run(&pool).await;
        run_service::claim_run(&pool, run_id, "runner").await.unwrap();
        add_log_entries(&pool, run_id, vec![stdout("round 1")])
            .await
            .unwrap();

        let follower = tokio::spawn(
            log_stream(pool.clone(), run_id, 0, POLL)
                .map(|chunk| chunk.unwrap().log_output)
                .collect::<Vec<_>>(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        run_service::stop_run(&pool, run_id).await.unwrap();
        // Give the follower several polls against the stopped run
        tokio::time::sleep(Duration::from_millis(100)).await;

        add_log_entries(
            &pool,
            run_id,
            vec![stdout("round 2"), LogEntry::system("Run stopped")],
        )
        .await
        .unwrap();
        run_service::complete_run(
            &pool,
            run_id,
            RunStatus::Cancelled,
            Some(RunResult::cancelled()),
        )
        .await
        .unwrap();

        let followed = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .unwrap()
            .unwrap()
            .concat();
        let full: String = log_stream(pool, run_id, 0, POLL)
            .map(|chunk| chunk.unwrap().log_output)
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(full, "round 1\nround 2\nRun stopped\n");
        assert_eq!(followed, full);
    }

    #[tokio::test]
    async fn test_stream_of_unknown_run_errors() {
        let pool = pool().await;
        let mut stream = Box::pin(log_stream(pool, 7, 0, POLL));
        assert!(matches!(
            stream.next().await,
            Some(Err(LogError::RunNotFound(7)))
        ));
        assert!(stream.next().await.is_none());
    }
}
