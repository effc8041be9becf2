//! `petal log`

use anyhow::{Context, Result};
use colored::*;
use futures::StreamExt;
use petal_client::{ExecClient, LogStream};
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

/// How long a log connection is kept before it is reopened
pub const CONN_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Pause before reopening a log connection
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connections in a row that may drop without delivering anything
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// How long `--no-follow` waits for output
const NO_FOLLOW_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct StreamTiming {
    refresh_period: Duration,
    reconnect_delay: Duration,
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            refresh_period: CONN_REFRESH_PERIOD,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Print a run's output, following it until the run ends unless `follow` is off
pub async fn show_logs(client: &ExecClient, run_id: i64, follow: bool) -> Result<()> {
    let mut stdout = std::io::stdout();

    let outcome = tokio::select! {
        result = async {
            if follow {
                follow_logs(client, run_id, &mut stdout, StreamTiming::default()).await
            } else {
                print_available_logs(client, run_id, &mut stdout, NO_FOLLOW_WINDOW).await
            }
        } => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("{}", "Exiting logstream".yellow());
            return Ok(());
        }
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) if is_unknown_run(&e) => {
            eprintln!("{}", format!("Invalid run_id `{}`, exiting", run_id).red());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn is_unknown_run(err: &anyhow::Error) -> bool {
    err.downcast_ref::<petal_client::ClientError>()
        .is_some_and(|e| e.is_not_found())
}

fn is_parse_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<petal_client::ClientError>(),
        Some(petal_client::ClientError::ParseError(_))
    )
}

/// Stream output until the server closes the stream for a finished run
///
/// Connections are reopened every `refresh_period`, resuming after the last
/// line printed, so a long run never holds one request open indefinitely.
/// Undecodable output ends the follow at once; dropped connections are
/// retried until `MAX_CONSECUTIVE_FAILURES` of them deliver nothing.
async fn follow_logs(
    client: &ExecClient,
    run_id: i64,
    out: &mut impl Write,
    timing: StreamTiming,
) -> Result<()> {
    let mut cursor = None;
    let mut failures = 0;

    loop {
        let stream = client.stream_logs(run_id, cursor).await?;
        let deadline = Instant::now() + timing.refresh_period;
        let before = cursor;

        match pump(stream, out, &mut cursor, deadline).await {
            Ok(StreamEnd::Finished) => return Ok(()),
            Ok(StreamEnd::Deadline) => {
                failures = 0;
                tracing::debug!("Refreshing log connection for run {}", run_id);
            }
            Err(e) if is_parse_error(&e) => return Err(e),
            Err(e) => {
                failures = if cursor != before { 1 } else { failures + 1 };
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(e.context(format!(
                        "Log connection for run {} failed {} times in a row",
                        run_id, failures
                    )));
                }
                tracing::warn!("Log connection for run {} dropped: {}", run_id, e);
            }
        }

        tokio::time::sleep(timing.reconnect_delay).await;
    }
}

/// Print whatever output shows up within `window`
async fn print_available_logs(
    client: &ExecClient,
    run_id: i64,
    out: &mut impl Write,
    window: Duration,
) -> Result<()> {
    let stream = client.stream_logs(run_id, None).await?;
    let mut cursor = None;
    pump(stream, out, &mut cursor, Instant::now() + window).await?;
    Ok(())
}

enum StreamEnd {
    Finished,
    Deadline,
}

/// Copy chunks to `out` until the stream ends or `deadline` passes
async fn pump(
    mut stream: LogStream,
    out: &mut impl Write,
    cursor: &mut Option<i64>,
    deadline: Instant,
) -> Result<StreamEnd> {
    loop {
        let next = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(StreamEnd::Deadline),
        };

        let Some(chunk) = next else {
            return Ok(StreamEnd::Finished);
        };
        let chunk = chunk?;

        out.write_all(chunk.log_output.as_bytes())
            .context("Failed to write logs")?;
        out.flush().context("Failed to write logs")?;
        *cursor = Some(chunk.cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petal_core::domain::bundle::Bundle;
    use petal_core::domain::log::{LogEntry, LogSource};
    use petal_core::domain::run::{RunResult, RunStatus};
    use petal_core::dto::run::StartRunRequest;
    use petal_exec::AppState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn spawn_exec_server() -> ExecClient {
        let pool = petal_exec::db::create_memory_pool().await.unwrap();
        petal_exec::db::run_migrations(&pool).await.unwrap();

        let config = petal_exec::config::Config {
            log_poll_interval: Duration::from_millis(20),
            ..Default::default()
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(petal_exec::serve(listener, AppState::new(pool, &config)));

        ExecClient::new(format!("http://{}", addr))
    }

    /// Serves every request with the same 200 NDJSON response, declaring
    /// `declared_len` bytes of body
    async fn spawn_canned_server(
        body: &'static str,
        declared_len: usize,
    ) -> (ExecClient, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        declared_len
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(body.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (ExecClient::new(format!("http://{}", addr)), hits)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|len| len.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }

    fn quick_timing() -> StreamTiming {
        StreamTiming {
            refresh_period: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(10),
        }
    }

    async fn running_run(client: &ExecClient) -> i64 {
        let run_id = client
            .start_run(StartRunRequest {
                fab: Bundle::new(b"app".to_vec()),
                override_config: Default::default(),
            })
            .await
            .unwrap()
            .run_id;
        client.claim_run(run_id, "runner").await.unwrap();
        run_id
    }

    async fn say(client: &ExecClient, run_id: i64, line: &str) {
        client
            .send_logs(run_id, &[LogEntry::new(LogSource::Stdout, line)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_follow_finished_run_prints_everything() {
        let client = spawn_exec_server().await;
        let run_id = running_run(&client).await;
        say(&client, run_id, "one").await;
        say(&client, run_id, "two").await;
        client
            .complete_run(run_id, RunStatus::Succeeded, Some(RunResult::succeeded()))
            .await
            .unwrap();

        let mut out = Vec::new();
        follow_logs(&client, run_id, &mut out, StreamTiming::default())
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_follow_resumes_across_refreshes() {
        let client = spawn_exec_server().await;
        let run_id = running_run(&client).await;
        say(&client, run_id, "before").await;

        let timing = StreamTiming {
            refresh_period: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(10),
        };

        let writer = {
            let client = client.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(350)).await;
                say(&client, run_id, "after").await;
                client
                    .complete_run(run_id, RunStatus::Succeeded, Some(RunResult::succeeded()))
                    .await
                    .unwrap();
            })
        };

        let mut out = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(10),
            follow_logs(&client, run_id, &mut out, timing),
        )
        .await
        .unwrap()
        .unwrap();
        writer.await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "before\nafter\n");
    }

    #[tokio::test]
    async fn test_no_follow_stops_after_window() {
        let client = spawn_exec_server().await;
        let run_id = running_run(&client).await;
        say(&client, run_id, "so far").await;

        let mut out = Vec::new();
        print_available_logs(&client, run_id, &mut out, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "so far\n");
    }

    #[tokio::test]
    async fn test_unknown_run_is_detected() {
        let client = spawn_exec_server().await;

        let mut out = Vec::new();
        let err = follow_logs(&client, 404, &mut out, StreamTiming::default())
            .await
            .unwrap_err();
        assert!(is_unknown_run(&err));
    }

    #[tokio::test]
    async fn test_undecodable_output_ends_follow() {
        let body = "not json\n";
        let (client, hits) = spawn_canned_server(body, body.len()).await;

        let mut out = Vec::new();
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            follow_logs(&client, 1, &mut out, quick_timing()),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(is_parse_error(&err));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_repeatedly_dropped_connection_gives_up() {
        // Body is cut off well short of its declared length
        let (client, hits) = spawn_canned_server("{\"log_output\":\"par", 4096).await;

        let mut out = Vec::new();
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            follow_logs(&client, 1, &mut out, quick_timing()),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(!is_parse_error(&err));
        assert_eq!(
            hits.load(Ordering::SeqCst),
            MAX_CONSECUTIVE_FAILURES as usize
        );
        assert!(out.is_empty());
    }
}
