//! Deployment orchestration.
//!
//! `deploy(tag)` builds the container image, idempotently tears down any
//! prior deployment, brings the new one up and gates success on the
//! readiness probe. A failed health gate reports failure but leaves the
//! deployment running for inspection; rollback is out of scope.
//!
//! The container CLI program is injectable so the workflow can be exercised
//! against a stub in tests.

use siteops_common::{CommandSpec, OrchestratorError, Result};
use siteops_health::{await_ready, HealthCheckPolicy};
use siteops_process::{run_command, run_command_capture};
use tracing::{info, warn};

/// Builds container CLI invocations (`<cli> compose ...` and `<cli> build`).
#[derive(Debug, Clone)]
pub struct ComposeRunner {
    cli: String,
    compose_file: Option<String>,
}

impl ComposeRunner {
    pub fn new(cli: impl Into<String>) -> Self {
        Self {
            cli: cli.into(),
            compose_file: None,
        }
    }

    pub fn with_compose_file(mut self, path: impl Into<String>) -> Self {
        self.compose_file = Some(path.into());
        self
    }

    fn compose(&self, args: &[&str]) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.cli).arg("compose");
        if let Some(ref file) = self.compose_file {
            spec = spec.arg("-f").arg(file);
        }
        spec.args(args.iter().copied())
    }

    fn image_build(&self, image_tag: &str) -> CommandSpec {
        CommandSpec::new(&self.cli).args(["build", "-t", image_tag, "."])
    }
}

/// Deployment settings.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Image name without tag.
    pub image: String,
    /// Lines of recent log output shown by status.
    pub log_tail: u32,
    /// Value passed through as ENVIRONMENT.
    pub environment: String,
}

/// Composes image build, container lifecycle and the health gate into the
/// deploy/status/stop workflow.
pub struct DeploymentOrchestrator {
    runner: ComposeRunner,
    options: DeployOptions,
    health: HealthCheckPolicy,
}

impl DeploymentOrchestrator {
    pub fn new(runner: ComposeRunner, options: DeployOptions, health: HealthCheckPolicy) -> Self {
        Self {
            runner,
            options,
            health,
        }
    }

    /// Build, replace and health-gate the deployment.
    pub async fn deploy(&self, tag: &str) -> Result<()> {
        let image_tag = format!("{}:{}", self.options.image, tag);

        info!("Building image {}", image_tag);
        let status = run_command(&self.runner.image_build(&image_tag)).await?;
        if !status.success() {
            return Err(OrchestratorError::stage_failed("image-build", false));
        }

        // Idempotent teardown; a missing prior deployment is not an error.
        info!("Tearing down previous deployment (if any)");
        let status = run_command(&self.runner.compose(&["down"])).await?;
        if !status.success() {
            warn!("compose down exited with {}, continuing", status);
        }

        info!("Bringing up {}", image_tag);
        let up = self
            .runner
            .compose(&["up", "-d"])
            .env("IMAGE_TAG", tag)
            .env("ENVIRONMENT", &self.options.environment);
        let status = run_command(&up).await?;
        if !status.success() {
            return Err(OrchestratorError::stage_failed("compose-up", false));
        }

        // Health gate. On timeout the deployment stays up for inspection.
        let report = await_ready(&self.health).await?;
        info!(
            "Deployment {} ready after {} health attempt(s)",
            image_tag, report.attempts_used
        );
        Ok(())
    }

    /// Current container state plus a bounded tail of recent log output.
    pub async fn status(&self) -> Result<String> {
        let ps = run_command_capture(&self.runner.compose(&["ps"])).await?;
        let tail = self.options.log_tail.to_string();
        let logs = run_command_capture(&self.runner.compose(&["logs", "--tail", &tail])).await?;

        let mut out = String::new();
        out.push_str(String::from_utf8_lossy(&ps.stdout).trim_end());
        if !ps.stderr.is_empty() {
            out.push('\n');
            out.push_str(String::from_utf8_lossy(&ps.stderr).trim_end());
        }
        out.push_str("\n\nRecent logs:\n");
        out.push_str(String::from_utf8_lossy(&logs.stdout).trim_end());
        Ok(out)
    }

    /// Tear the deployment down. Succeeds when nothing is running.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping deployment");
        let status = run_command(&self.runner.compose(&["down"])).await?;
        if !status.success() {
            return Err(OrchestratorError::stage_failed("compose-down", false));
        }
        Ok(())
    }
}
