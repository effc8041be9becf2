//! Log API Handlers
//!
//! Log ingestion from runners and log streaming to clients.

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use petal_core::domain::log::LogEntry;
use petal_core::dto::log::{StreamLogsRequest, StreamLogsResponse};

use crate::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::{log_service, run_service};

/// Content type of a log stream: one JSON object per line
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// POST /run/logs/stream
/// Stream the output of a run as newline-delimited JSON
///
/// Each line is a `StreamLogsResponse`. The response ends once the run is
/// finished and all of its output has been sent.
pub async fn stream_logs(
    State(state): State<AppState>,
    Json(req): Json<StreamLogsRequest>,
) -> ApiResult<Response> {
    let after = req.after.unwrap_or(0);
    tracing::info!("Streaming logs for run {} after {}", req.run_id, after);

    // Unknown runs fail before any body is sent
    run_service::get_run(&state.pool, req.run_id).await?;

    let run_id = req.run_id;
    let body = log_service::log_stream(state.pool.clone(), run_id, after, state.log_poll_interval)
        .map(move |chunk| match chunk {
            Ok(response) => encode_line(&response),
            Err(e) => {
                tracing::error!("Log stream for run {} failed: {:?}", run_id, e);
                Err(std::io::Error::other(format!(
                    "log stream for run {} failed",
                    run_id
                )))
            }
        });

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response())
}

fn encode_line(response: &StreamLogsResponse) -> std::io::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(response).map_err(std::io::Error::other)?;
    line.push(b'\n');
    Ok(line)
}

/// POST /run/{id}/logs
/// Append log entries to a run
pub async fn add_run_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(logs): Json<Vec<LogEntry>>,
) -> ApiResult<StatusCode> {
    tracing::debug!("Adding {} log entries for run: {}", logs.len(), id);

    log_service::add_log_entries(&state.pool, id, logs)
        .await
        .map_err(ApiError::from)?;

    Ok(StatusCode::CREATED)
}
