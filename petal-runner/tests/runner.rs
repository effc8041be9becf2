//! Runner against an in-process exec server

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use petal_client::ExecClient;
use petal_core::domain::bundle::Bundle;
use petal_core::domain::run::{RunStatus, TIMEOUT_EXIT_CODE};
use petal_core::dto::run::StartRunRequest;
use petal_exec::AppState;
use petal_runner::service::{ExecutionService, ProcessExecutionService};
use petal_runner::{Config, RunPoller};

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

fn runner_config(
    client: &ExecClient,
    workspace: &std::path::Path,
    script: &str,
    timeout: Duration,
) -> Config {
    let mut config = Config::new("test-runner".to_string(), client.base_url().to_string());
    config.log_send_interval = Duration::from_millis(50);
    config.workspace_base = workspace.to_path_buf();
    config.app_command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    config.run_timeout = timeout;
    config
}

fn runner(
    client: &ExecClient,
    workspace: &std::path::Path,
    script: &str,
    timeout: Duration,
) -> RunPoller {
    poller_with(client, runner_config(client, workspace, script, timeout))
}

fn poller_with(client: &ExecClient, config: Config) -> RunPoller {
    let executor: Arc<dyn ExecutionService> = Arc::new(ProcessExecutionService::new(
        config.app_command.clone(),
        config.run_timeout,
    ));
    RunPoller::new(config, Arc::new(client.clone()), executor)
}

async fn submit(client: &ExecClient, overrides: &[(&str, &str)]) -> i64 {
    client
        .start_run(StartRunRequest {
            fab: Bundle::new(b"fab contents".to_vec()),
            override_config: overrides
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
        .await
        .unwrap()
        .run_id
}

async fn run_all(poller: &RunPoller) {
    let handles = poller.poll_once().await.unwrap();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

async fn full_output(client: &ExecClient, run_id: i64) -> String {
    let chunks: Vec<_> = client
        .stream_logs(run_id, None)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().log_output)
        .collect()
        .await;
    chunks.concat()
}

#[tokio::test]
async fn successful_run_ships_output() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();
    let run_id = submit(&client, &[("num-server-rounds", "3")]).await;

    let poller = runner(
        &client,
        workspace.path(),
        "echo \"config $PETAL_RUN_CONFIG\"; echo warn >&2",
        Duration::from_secs(30),
    );
    run_all(&poller).await;

    let run = client.get_run(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.runner_id.as_deref(), Some("test-runner"));

    let output = full_output(&client, run_id).await;
    assert!(output.contains("config {\"num-server-rounds\":\"3\"}\n"));
    assert!(output.contains("warn\n"));

    // Workspace is gone once the run is reported
    assert!(!workspace.path().join(run_id.to_string()).exists());
}

#[tokio::test]
async fn failing_run_reports_exit_code() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();
    let run_id = submit(&client, &[]).await;

    let poller = runner(&client, workspace.path(), "echo bye; exit 4", Duration::from_secs(30));
    run_all(&poller).await;

    let run = client.get_run(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.result.unwrap().exit_code, 4);
    assert!(full_output(&client, run_id).await.contains("bye\n"));
}

#[tokio::test]
async fn slow_run_times_out() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();
    let run_id = submit(&client, &[]).await;

    let poller = runner(&client, workspace.path(), "sleep 30", Duration::from_millis(300));
    run_all(&poller).await;

    let run = client.get_run(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::TimedOut);
    assert_eq!(run.result.unwrap().exit_code, TIMEOUT_EXIT_CODE);
}

#[tokio::test]
async fn stopped_run_is_killed() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();
    let run_id = submit(&client, &[]).await;

    let poller = runner(&client, workspace.path(), "echo started; sleep 30", Duration::from_secs(60));
    let handles = poller.poll_once().await.unwrap();

    // Wait until the app is running
    let mut stream = client.stream_logs(run_id, None).await.unwrap();
    let mut seen = String::new();
    while !seen.contains("started") {
        let chunk = tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        seen.push_str(&chunk.log_output);
    }

    client.stop_run(run_id).await.unwrap();

    // The open stream stays up until the runner has flushed its tail
    let rest = tokio::time::timeout(Duration::from_secs(30), async {
        let mut rest = String::new();
        while let Some(chunk) = stream.next().await {
            rest.push_str(&chunk.unwrap().log_output);
        }
        rest
    })
    .await
    .unwrap();
    seen.push_str(&rest);
    assert!(seen.ends_with("Run stopped\n"), "followed output: {:?}", seen);

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
    }

    let run = client.get_run(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.completed_at.is_some());
    assert_eq!(full_output(&client, run_id).await, seen);
}

#[tokio::test]
async fn every_line_arrives_in_order_with_tiny_buffer() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();

    let mut config = runner_config(
        &client,
        workspace.path(),
        "i=0; while [ $i -lt 300 ]; do echo line$i; i=$((i+1)); done",
        Duration::from_secs(60),
    );
    // Only threshold flushes ship logs while the app runs
    config.log_buffer_size = 1;
    config.log_send_interval = Duration::from_secs(30);
    let poller = poller_with(&client, config);

    let expected: Vec<String> = (0..300).map(|i| format!("line{}", i)).collect();
    for _ in 0..3 {
        let run_id = submit(&client, &[]).await;
        run_all(&poller).await;

        let run = client.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);

        let output = full_output(&client, run_id).await;
        let lines: Vec<String> = output
            .lines()
            .filter(|line| line.starts_with("line"))
            .map(str::to_string)
            .collect();
        assert_eq!(lines, expected);
        assert!(output.contains("App exited with status"));
    }
}

#[tokio::test]
async fn nothing_queued_starts_nothing() {
    let client = spawn_exec_server().await;
    let workspace = tempfile::tempdir().unwrap();

    let poller = runner(&client, workspace.path(), "true", Duration::from_secs(30));
    assert!(poller.poll_once().await.unwrap().is_empty());
}
