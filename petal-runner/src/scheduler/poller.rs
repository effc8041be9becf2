//! Run poller
//!
//! Polls the exec server for queued runs and executes them.
//! Each run executes in its own task with a context holding its workspace,
//! log buffer and cancellation token.

use anyhow::{Context as AnyhowContext, Result};
use petal_client::ExecClient;
use petal_core::domain::run::RunStatus;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::RunContext;
use crate::execution::ExecutionResult;
use crate::service::ExecutionService;

/// Run poller that continuously polls for and executes runs
pub struct RunPoller {
    config: Config,
    client: Arc<ExecClient>,
    executor: Arc<dyn ExecutionService>,
    semaphore: Arc<Semaphore>,
}

impl RunPoller {
    /// Creates a new run poller
    pub fn new(config: Config, client: Arc<ExecClient>, executor: Arc<dyn ExecutionService>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_runs));
        Self {
            config,
            client,
            executor,
            semaphore,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting run poller (interval: {:?})",
            self.config.poll_interval
        );

        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            debug!("Polling for queued runs");

            match self.poll_once().await {
                Ok(started) => {
                    if !started.is_empty() {
                        info!("Started {} run(s) this cycle", started.len());
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle
    ///
    /// Returns the handles of the run tasks it started; they keep running
    /// after this returns.
    pub async fn poll_once(&self) -> Result<Vec<JoinHandle<()>>> {
        let runs = self
            .client
            .list_queued_runs()
            .await
            .context("Failed to fetch queued runs")?;

        if runs.is_empty() {
            debug!("No runs available");
            return Ok(Vec::new());
        }

        debug!("Found {} queued run(s)", runs.len());

        let mut handles = Vec::new();

        for run in runs {
            // Try to acquire semaphore permit, skip if at max capacity
            match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => handles.push(self.spawn_run_task(run.run_id, permit)),
                Err(_) => {
                    debug!("Max parallel runs reached, leaving run {} for later", run.run_id);
                    break;
                }
            }
        }

        Ok(handles)
    }

    /// Spawns a task to execute a single run
    fn spawn_run_task(&self, run_id: i64, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let executor = Arc::clone(&self.executor);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::execute_run(run_id, config, client, executor).await {
                error!("Failed to execute run {}: {:#}", run_id, e);
            }
            // Permit is released when dropped
            drop(permit);
        })
    }

    /// Executes a single run with log streaming
    async fn execute_run(
        run_id: i64,
        config: Config,
        client: Arc<ExecClient>,
        executor: Arc<dyn ExecutionService>,
    ) -> Result<()> {
        // Claim the run
        let claimed = match client.claim_run(run_id, &config.runner_id).await {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!("Run {} was claimed elsewhere", run_id);
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to claim run"),
        };

        info!(
            "Claimed run {} (bundle {})",
            claimed.run_id, claimed.bundle.hash_str
        );

        let context = Arc::new(RunContext::new(
            run_id,
            &config.workspace_base,
            config.log_buffer_size,
        ));

        let result = match context.prepare(&claimed.bundle).await {
            Ok(path) => {
                context.log_system(format!("Bundle written to {}", path.display()));

                let stop_sender = CancellationToken::new();
                let log_sender = Self::spawn_log_sender(
                    Arc::clone(&context),
                    Arc::clone(&client),
                    config.log_send_interval,
                    stop_sender.clone(),
                );

                let result = executor.execute_run(&claimed, Arc::clone(&context)).await;

                // Let an in-flight batch land before the final flush
                stop_sender.cancel();
                if let Err(e) = log_sender.await {
                    warn!("Log sender for run {} failed: {}", run_id, e);
                }
                result
            }
            Err(e) => {
                error!("Failed to prepare workspace for run {}: {:#}", run_id, e);
                ExecutionResult::SpawnFailed {
                    error: format!("{:#}", e),
                }
            }
        };

        info!("Run {} finished: {:?}", run_id, result);

        if let Err(e) = context.cleanup().await {
            warn!("Failed to clean up workspace: {:#}", e);
            context.log_system(format!("Failed to clean up workspace: {}", e));
        }

        // Send remaining logs
        let remaining_logs = context.drain_logs();
        if !remaining_logs.is_empty() {
            debug!(
                "Sending {} remaining logs for run {}",
                remaining_logs.len(),
                run_id
            );
            if let Err(e) = client.send_logs(run_id, &remaining_logs).await {
                warn!("Failed to send final logs: {:#}", e);
            }
        }

        // Report completion
        let (status, run_result) = result.into_completion();
        client
            .complete_run(run_id, status, Some(run_result))
            .await
            .context("Failed to complete run")?;

        Ok(())
    }

    /// Spawns a background task that ships logs and watches for stop requests
    ///
    /// Logs go out every `interval`, or sooner when the buffer fills up.
    /// The run status is checked on every tick. Once `stop` fires the task
    /// returns between batches; anything still buffered is left for the caller.
    /// A batch that fails to send is put back in front of the buffer.
    fn spawn_log_sender(
        context: Arc<RunContext>,
        client: Arc<ExecClient>,
        interval: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let run_id = context.run_id;
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let tick = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => true,
                    _ = context.logs.flush_requested() => false,
                };

                let logs = context.drain_logs();
                if !logs.is_empty() {
                    debug!("Sending {} logs for run {}", logs.len(), run_id);
                    if let Err(e) = client.send_logs(run_id, &logs).await {
                        error!("Failed to send logs for run {}: {:#}", run_id, e);
                        context.requeue_logs(logs);
                    }
                }

                if !tick {
                    continue;
                }

                match client.get_run(run_id).await {
                    Ok(run) if run.status == RunStatus::Cancelled => {
                        info!("Run {} was stopped", run_id);
                        context.cancel.cancel();
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to check status of run {}: {:#}", run_id, e),
                }
            }
        })
    }
}
