//! Repository Module
//!
//! Data access layer for the exec server.
//! Each repository handles database operations for a specific domain entity.

pub mod bundle;
pub mod log;
pub mod run;

// Re-export for convenience
pub use bundle as bundle_repository;
pub use log as log_repository;
pub use run as run_repository;
