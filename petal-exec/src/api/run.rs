//! Run API Handlers
//!
//! HTTP endpoints for run submission and lifecycle management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use petal_core::domain::run::{Run, RunStatus};
use petal_core::dto::run::{
    ClaimRunRequest, ClaimedRun, CompleteRunRequest, RunSummary, StartRunRequest,
    StartRunResponse, StopRunResponse,
};

use crate::AppState;
use crate::api::error::ApiResult;
use crate::service::run_service;

/// POST /run/start
/// Submit a bundle for execution
pub async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> ApiResult<Json<StartRunResponse>> {
    tracing::info!(
        "Starting run for a {} byte bundle with {} override(s)",
        req.fab.content.len(),
        req.override_config.len()
    );

    let run_id = run_service::start_run(&state.pool, req, state.limits).await?;

    Ok(Json(StartRunResponse { run_id }))
}

/// GET /run/{id}
/// Get run details by ID
pub async fn get_run(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    let run = run_service::get_run(&state.pool, id).await?;

    Ok(Json(run))
}

/// GET /run/list
/// List all runs, newest first
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs");

    let runs = run_service::list_runs(&state.pool).await?;

    Ok(Json(runs.into_iter().map(RunSummary::from).collect()))
}

/// GET /run/list/queued
/// List runs waiting for a runner
pub async fn list_queued_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<Run>>> {
    let runs = run_service::list_runs_by_status(&state.pool, RunStatus::Queued).await?;

    tracing::debug!("Found {} queued runs", runs.len());

    Ok(Json(runs))
}

/// POST /run/{id}/stop
/// Cancel a queued or running run
pub async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StopRunResponse>> {
    tracing::info!("Stopping run: {}", id);

    let status = run_service::stop_run(&state.pool, id).await?;

    Ok(Json(StopRunResponse { run_id: id, status }))
}

/// POST /run/{id}/claim
/// Reserve a queued run for a runner and hand over its bundle
pub async fn claim_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ClaimRunRequest>,
) -> ApiResult<Json<ClaimedRun>> {
    tracing::debug!("Runner {} claiming run {}", req.runner_id, id);

    let claimed = run_service::claim_run(&state.pool, id, &req.runner_id).await?;

    Ok(Json(claimed))
}

/// POST /run/{id}/complete
/// Mark a run as complete with final status and result
pub async fn complete_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CompleteRunRequest>,
) -> ApiResult<StatusCode> {
    tracing::info!("Completing run {} with status: {}", id, req.status);

    run_service::complete_run(&state.pool, id, req.status, req.result).await?;

    Ok(StatusCode::NO_CONTENT)
}
