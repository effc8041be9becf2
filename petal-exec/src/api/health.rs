//! Health Check API Handler
//!
//! Liveness check used by runners while they wait for the exec server.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::AppState;
use crate::api::error::ApiResult;

/// GET /health
/// Reports OK once the database answers
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
