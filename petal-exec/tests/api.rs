//! End-to-end tests of the exec server API through `petal-client`

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use petal_client::ExecClient;
use petal_core::domain::bundle::Bundle;
use petal_core::domain::log::{LogEntry, LogSource};
use petal_core::domain::run::{RunResult, RunStatus};
use petal_core::dto::run::StartRunRequest;
use petal_exec::config::Config;
use petal_exec::{AppState, db};

async fn spawn_server() -> ExecClient {
    let pool = db::create_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let config = Config {
        log_poll_interval: Duration::from_millis(20),
        max_bundle_bytes: 4096,
        ..Config::default()
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(petal_exec::serve(listener, AppState::new(pool, &config)));

    ExecClient::new(format!("http://{}", addr))
}

fn request(content: &[u8], overrides: &[(&str, &str)]) -> StartRunRequest {
    StartRunRequest {
        fab: Bundle::new(content.to_vec()),
        override_config: overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

#[tokio::test]
async fn health_check_responds() {
    let client = spawn_server().await;
    client.health().await.unwrap();
}

#[tokio::test]
async fn start_run_then_inspect() {
    let client = spawn_server().await;

    let started = client
        .start_run(request(b"my app", &[("num-server-rounds", "5")]))
        .await
        .unwrap();

    let run = client.get_run(started.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.override_config["num-server-rounds"], "5");

    let listed = client.list_runs().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].run_id, started.run_id);
    assert_eq!(listed[0].bundle_hash, run.bundle_hash);
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let client = spawn_server().await;

    let err = client.start_run(request(b"", &[])).await.unwrap_err();
    assert!(err.is_client_error());

    let err = client.start_run(request(&[7u8; 5000], &[])).await.unwrap_err();
    assert!(err.is_client_error());

    assert!(client.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let client = spawn_server().await;

    assert!(client.get_run(99).await.unwrap_err().is_not_found());
    assert!(client.stream_logs(99, None).await.err().unwrap().is_not_found());
    assert!(client.stop_run(99).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn second_claim_conflicts() {
    let client = spawn_server().await;
    let started = client.start_run(request(b"app", &[])).await.unwrap();

    let queued = client.list_queued_runs().await.unwrap();
    assert_eq!(queued.len(), 1);

    let claimed = client.claim_run(started.run_id, "runner-1").await.unwrap();
    assert_eq!(claimed.bundle.content, b"app");
    assert_eq!(claimed.bundle.verify().unwrap(), claimed.bundle.hash_str);

    let err = client
        .claim_run(started.run_id, "runner-2")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(client.list_queued_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn logs_stream_until_run_completes() {
    let client = spawn_server().await;
    let run_id = client
        .start_run(request(b"app", &[]))
        .await
        .unwrap()
        .run_id;
    client.claim_run(run_id, "runner-1").await.unwrap();

    client
        .send_logs(
            run_id,
            &[
                LogEntry::new(LogSource::Stdout, "round 1"),
                LogEntry::new(LogSource::Stderr, "warning"),
            ],
        )
        .await
        .unwrap();

    let mut stream = client.stream_logs(run_id, None).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.log_output, "round 1\nwarning\n");

    client
        .send_logs(run_id, &[LogEntry::new(LogSource::Stdout, "round 2")])
        .await
        .unwrap();
    client
        .complete_run(run_id, RunStatus::Succeeded, Some(RunResult::succeeded()))
        .await
        .unwrap();

    let mut rest = String::new();
    let collect = async {
        while let Some(chunk) = stream.next().await {
            rest.push_str(&chunk.unwrap().log_output);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .unwrap();
    assert_eq!(rest, "round 2\n");

    // Resuming from the first chunk replays only what came after it
    let resumed: Vec<_> = client
        .stream_logs(run_id, Some(first.cursor))
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().log_output)
        .collect()
        .await;
    assert_eq!(resumed.concat(), "round 2\n");

    let run = client.get_run(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn stop_cancels_and_cannot_repeat() {
    let client = spawn_server().await;
    let run_id = client
        .start_run(request(b"app", &[]))
        .await
        .unwrap()
        .run_id;

    let stopped = client.stop_run(run_id).await.unwrap();
    assert_eq!(stopped.status, RunStatus::Cancelled);

    assert!(client.stop_run(run_id).await.unwrap_err().is_conflict());

    // A stopped queued run is final, so its stream ends right away
    let chunks: Vec<_> = client
        .stream_logs(run_id, None)
        .await
        .unwrap()
        .collect()
        .await;
    assert!(chunks.is_empty());
}
