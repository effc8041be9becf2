//! Petal Core
//!
//! Core types and abstractions shared by the Petal exec server, runner,
//! client and CLI.
//!
//! This crate contains:
//! - Domain types: Core entities (Run, LogEntry, Bundle)
//! - DTOs: Wire messages exchanged with the exec server
//! - Config: Helpers for building run override configurations

pub mod config;
pub mod domain;
pub mod dto;
