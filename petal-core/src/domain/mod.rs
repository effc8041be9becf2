//! Core domain types
//!
//! This module contains the core domain structures used across Petal services.
//! These types are shared between the exec server (for persistence) and the
//! runner (for execution).

pub mod bundle;
pub mod log;
pub mod run;
