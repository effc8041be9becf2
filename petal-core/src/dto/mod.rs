//! Data Transfer Objects for inter-service communication
//!
//! This module contains the wire messages exchanged with the exec server by
//! the CLI (run submission, log streaming) and by runners (claiming runs,
//! shipping logs, reporting completion).

pub mod log;
pub mod run;
