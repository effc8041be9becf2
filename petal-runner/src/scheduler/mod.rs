//! Scheduler layer for the runner
//!
//! This layer handles polling the exec server for queued runs and
//! coordinating their execution from claim to completion.

pub mod poller;

pub use poller::RunPoller;
