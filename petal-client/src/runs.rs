//! Run-related API endpoints

use crate::ExecClient;
use crate::error::Result;
use petal_core::domain::run::{Run, RunResult, RunStatus};
use petal_core::dto::run::{
    ClaimRunRequest, ClaimedRun, CompleteRunRequest, RunSummary, StartRunRequest,
    StartRunResponse, StopRunResponse,
};

impl ExecClient {
    // =============================================================================
    // Run Submission
    // =============================================================================

    /// Submit a bundle for execution
    ///
    /// # Returns
    /// The id of the queued run
    pub async fn start_run(&self, req: StartRunRequest) -> Result<StartRunResponse> {
        let url = format!("{}/run/start", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: i64) -> Result<Run> {
        let url = format!("{}/run/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = format!("{}/run/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List runs waiting for a runner, oldest first
    pub async fn list_queued_runs(&self) -> Result<Vec<Run>> {
        let url = format!("{}/run/list/queued", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a queued or running run
    pub async fn stop_run(&self, run_id: i64) -> Result<StopRunResponse> {
        let url = format!("{}/run/{}/stop", self.base_url, run_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Runner Lifecycle
    // =============================================================================

    /// Claim a queued run for execution
    ///
    /// Fails with a 409 `ApiError` when another runner got there first.
    pub async fn claim_run(&self, run_id: i64, runner_id: &str) -> Result<ClaimedRun> {
        let url = format!("{}/run/{}/claim", self.base_url, run_id);
        let req = ClaimRunRequest {
            runner_id: runner_id.to_string(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Report the final status of a run
    pub async fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        result: Option<RunResult>,
    ) -> Result<()> {
        let url = format!("{}/run/{}/complete", self.base_url, run_id);
        let req = CompleteRunRequest { status, result };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }
}
