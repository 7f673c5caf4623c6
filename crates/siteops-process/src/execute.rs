//! Process spawning and one-shot command execution.

use siteops_common::{CommandSpec, OrchestratorError, Result};
use std::process::{ExitStatus, Output, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(ref dir) = spec.working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd
}

/// Spawn a long-running process from the given spec.
///
/// The child inherits stdout/stderr so supervised services write straight to
/// the orchestrator's console. `kill_on_drop` is a safety net for the case
/// where the orchestrator itself dies mid-shutdown; ordered teardown still
/// goes through [`crate::terminate_gracefully`].
pub fn spawn_command(name: &str, spec: &CommandSpec) -> Result<Child> {
    debug!("Spawning '{}': {}", name, spec);
    build_command(spec)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| OrchestratorError::spawn_failed(name, e.to_string()))
}

/// Run a command to completion, streaming its output to the console.
///
/// Build-stage commands run through here; they have no enforced upper bound
/// and run to natural completion.
pub async fn run_command(spec: &CommandSpec) -> Result<ExitStatus> {
    debug!("Running: {}", spec);
    build_command(spec)
        .status()
        .await
        .map_err(|e| OrchestratorError::spawn_failed(spec.program.clone(), e.to_string()))
}

/// Run a command to completion, capturing stdout and stderr.
pub async fn run_command_capture(spec: &CommandSpec) -> Result<Output> {
    debug!("Running (captured): {}", spec);
    build_command(spec)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| OrchestratorError::spawn_failed(spec.program.clone(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_success() {
        let status = run_command(&CommandSpec::new("true")).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_run_command_failure_exit_code() {
        let status = run_command(&CommandSpec::new("false")).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = spawn_command("ghost", &CommandSpec::new("definitely-not-a-real-binary"))
            .unwrap_err();
        match err {
            OrchestratorError::ProcessSpawnFailed { name, .. } => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_capture_output() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = run_command_capture(&spec).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }
}
