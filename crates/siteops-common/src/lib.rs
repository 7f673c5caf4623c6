//! Shared types for the siteops orchestrator.
//!
//! This crate holds the error taxonomy used across every workspace member and
//! the `CommandSpec` value type that describes an external command to run.

pub mod command;
pub mod errors;

pub use command::CommandSpec;
pub use errors::{OrchestratorError, Result};
