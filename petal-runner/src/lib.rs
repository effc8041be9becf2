//! Petal Runner
//!
//! A stateless worker that executes queued runs as app processes.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Context: Per-run workspace, log buffer and cancellation
//! - Services: Business logic (process execution, log buffering)
//! - Scheduler: Run polling and lifecycle management
//!
//! The runner polls the exec server for queued runs, claims them, launches
//! the app against the run's bundle and ships its output back periodically.

pub mod config;
pub mod context;
pub mod execution;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use scheduler::RunPoller;
