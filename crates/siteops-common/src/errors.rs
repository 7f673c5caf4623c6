//! Error taxonomy for the orchestrator.
//!
//! Every fatal condition maps to exactly one variant here, and the CLI prints
//! it as a single categorized line before exiting non-zero. Variants carry the
//! context a user needs to remediate without a debugger.

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// One or more required external tools are not usable. Reported as a
    /// single aggregated list before any mutating action.
    #[error("missing dependencies: {}", tools.join(", "))]
    DependencyMissing { tools: Vec<String> },

    /// A build stage ended unsatisfied (no artifact after primary and, when
    /// present, fallback).
    #[error("build stage '{stage}' failed (fallback attempted: {used_fallback})")]
    BuildStageFailed { stage: String, used_fallback: bool },

    /// The dedicated test stage exited non-zero. Distinct from build failures.
    #[error("test stage failed")]
    TestsFailed,

    /// A supervised process could not be spawned or did not survive its
    /// startup grace period.
    #[error("failed to spawn process '{name}': {reason}")]
    ProcessSpawnFailed { name: String, reason: String },

    /// The readiness probe never returned success within the policy bounds.
    #[error("health check timed out after {attempts} attempts")]
    HealthCheckTimedOut { attempts: u32 },

    /// A CLI flag combination or configuration value is invalid. Reported
    /// before any side effect.
    #[error("invalid argument '{flag}': {reason}")]
    InvalidArgument { flag: String, reason: String },

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Creates a DependencyMissing error from the aggregated tool list.
    pub fn dependency_missing(tools: Vec<String>) -> Self {
        Self::DependencyMissing { tools }
    }

    /// Creates a BuildStageFailed error.
    pub fn stage_failed(stage: impl Into<String>, used_fallback: bool) -> Self {
        Self::BuildStageFailed {
            stage: stage.into(),
            used_fallback,
        }
    }

    /// Creates a ProcessSpawnFailed error.
    pub fn spawn_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawnFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a HealthCheckTimedOut error.
    pub fn health_timeout(attempts: u32) -> Self {
        Self::HealthCheckTimedOut { attempts }
    }

    /// Creates an InvalidArgument error.
    pub fn invalid_argument(flag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            flag: flag.into(),
            reason: reason.into(),
        }
    }
}
