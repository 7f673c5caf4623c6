//! Low-level process primitives for the orchestrator.
//!
//! Spawning, non-destructive liveness checks and graceful/forced termination.
//! Unix only: supervised children are signalled with SIGTERM and, as a bounded
//! last resort, SIGKILL.

mod check;
mod execute;
mod terminate;

pub use check::process_exists;
pub use execute::{run_command, run_command_capture, spawn_command};
pub use terminate::{force_kill, terminate_gracefully};
