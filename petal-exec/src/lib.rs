//! Petal exec server
//!
//! Control-plane service that accepts application bundles for execution,
//! queues them as runs for runners to pick up, collects their log output and
//! streams it back to subscribers.
//!
//! Layers:
//! - `api`: HTTP handlers and routing
//! - `service`: Business logic (validation, state transitions, log streaming)
//! - `repository`: SQLite data access
//! - `db`: Pool creation and migrations

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use std::time::Duration;

use sqlx::SqlitePool;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::service::run_service::RunLimits;

/// Shared state handed to every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub limits: RunLimits,
    /// How often an open log stream checks for new lines
    pub log_poll_interval: Duration,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            limits: RunLimits {
                max_bundle_bytes: config.max_bundle_bytes,
            },
            log_poll_interval: config.log_poll_interval,
        }
    }
}

/// Serve the exec API on an already bound listener until it is shut down
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let app = api::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
