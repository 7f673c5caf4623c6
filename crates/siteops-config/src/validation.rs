//! Configuration validation.
//!
//! Runs before any command executes; a bad configuration must never cause a
//! partial build or a half-started deployment.

use crate::SiteConfig;
use anyhow::{bail, Result};
use std::time::Duration;

pub fn validate_config(config: &SiteConfig) -> Result<()> {
    validate_command("site.build_command", &config.site.build_command)?;
    validate_command("site.serve_command", &config.site.serve_command)?;
    validate_command("server.build_command", &config.server.build_command)?;
    validate_command("server.test_command", &config.server.test_command)?;

    if config.site.output_dir.as_os_str().is_empty() {
        bail!("site.output_dir cannot be empty");
    }
    if config.server.binary_path.as_os_str().is_empty() {
        bail!("server.binary_path cannot be empty");
    }
    if config.server.port == 0 {
        bail!("server.port cannot be 0");
    }

    validate_nonzero("supervisor.monitor_interval", config.supervisor.monitor_interval)?;
    validate_nonzero("supervisor.graceful_timeout", config.supervisor.graceful_timeout)?;
    if config.supervisor.restart.backoff_multiplier < 1.0 {
        bail!("supervisor.restart.backoff_multiplier must be >= 1.0");
    }
    if config.supervisor.restart.max_attempts == Some(0) {
        bail!("supervisor.restart.max_attempts must be >= 1 when set");
    }

    if config.health.url.is_empty() {
        bail!("health.url cannot be empty");
    }
    if config.health.max_attempts == 0 {
        bail!("health.max_attempts must be >= 1");
    }
    validate_nonzero("health.interval", config.health.interval)?;
    validate_nonzero("health.timeout", config.health.timeout)?;

    if config.deploy.image.is_empty() {
        bail!("deploy.image cannot be empty");
    }
    if config.deploy.container_cli.is_empty() {
        bail!("deploy.container_cli cannot be empty");
    }
    if config.deploy.log_tail == 0 {
        bail!("deploy.log_tail must be >= 1");
    }

    for req in config.dependencies.build.iter().chain(&config.dependencies.deploy) {
        if req.name.is_empty() {
            bail!("dependency tool names cannot be empty");
        }
    }

    Ok(())
}

fn validate_command(field: &str, command: &str) -> Result<()> {
    if command.split_whitespace().next().is_none() {
        bail!("{} cannot be empty", field);
    }
    Ok(())
}

fn validate_nonzero(field: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        bail!("{} must be greater than zero", field);
    }
    Ok(())
}
