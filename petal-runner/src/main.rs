use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petal_client::ExecClient;
use petal_runner::service::{ExecutionService, ProcessExecutionService};
use petal_runner::{Config, RunPoller};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petal_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Petal Runner");

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;
    info!(
        "Loaded configuration: runner_id={}, exec_url={}",
        config.runner_id, config.exec_url
    );

    let client = Arc::new(ExecClient::new(config.exec_url.clone()));

    // Wait for the exec server (with retry logic)
    wait_for_exec_server(&client).await?;
    info!("Exec server is reachable");

    let executor: Arc<dyn ExecutionService> = Arc::new(ProcessExecutionService::new(
        config.app_command.clone(),
        config.run_timeout,
    ));

    let poller = RunPoller::new(config.clone(), client, executor);

    info!(
        "Poll interval: {:?}, Log send interval: {:?}, Max parallel runs: {}",
        config.poll_interval, config.log_send_interval, config.max_parallel_runs
    );

    tokio::select! {
        result = poller.run() => {
            if let Err(e) = &result {
                error!("Poller error: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down runner");
            Ok(())
        }
    }
}

/// Wait for the exec server health check with exponential backoff
///
/// This handles the case where the exec server may not be ready yet when
/// the runner starts (common in container environments).
async fn wait_for_exec_server(client: &ExecClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.health().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Reached exec server after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Exec server unreachable after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Exec server is unreachable: {}", e));
                }

                warn!(
                    "Exec server not ready (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
