//! API Module
//!
//! HTTP API layer for the exec server.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod log;
pub mod run;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Room left for the JSON envelope and override map around a bundle
const REQUEST_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let body_limit = request_body_limit(state.limits.max_bundle_bytes);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Client-facing endpoints
        .route("/run/start", post(run::start_run))
        .route("/run/logs/stream", post(log::stream_logs))
        .route("/run/list", get(run::list_runs))
        .route("/run/list/queued", get(run::list_queued_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/stop", post(run::stop_run))
        // Runner endpoints
        .route("/run/{id}/claim", post(run::claim_run))
        .route("/run/{id}/logs", post(log::add_run_logs))
        .route("/run/{id}/complete", post(run::complete_run))
        // Add state and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Largest accepted request body for a given bundle size limit
///
/// Bundles travel base64 encoded, which inflates them by a third.
fn request_body_limit(max_bundle_bytes: usize) -> usize {
    max_bundle_bytes
        .saturating_add(2)
        .saturating_div(3)
        .saturating_mul(4)
        .saturating_add(REQUEST_OVERHEAD_BYTES)
}
