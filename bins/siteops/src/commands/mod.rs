//! Subcommand implementations and shared plumbing.

pub mod build;
pub mod deploy;
pub mod dev;

use anyhow::{Context, Result};
use siteops_common::CommandSpec;
use siteops_config::{RestartPolicyConfig, SiteConfig};
use siteops_deps::{check_tools, ToolRequirement};
use siteops_health::HealthCheckPolicy;
use siteops_supervisor::{RestartPolicy, RestartStrategy, SupervisorOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Probe the given tools and fail with the full missing list.
pub(crate) async fn ensure_tools(requirements: &[ToolRequirement]) -> Result<()> {
    let report = check_tools(requirements).await;
    for (requirement, status) in &report.results {
        debug!("Dependency '{}': {:?}", requirement.name, status);
    }
    report.into_result()?;
    Ok(())
}

/// Parse a configured command line, naming the offending config key on error.
pub(crate) fn parse_command(key: &str, line: &str) -> Result<CommandSpec> {
    CommandSpec::parse(line).with_context(|| format!("Empty command configured for {key}"))
}

pub(crate) fn supervisor_options(config: &SiteConfig) -> SupervisorOptions {
    SupervisorOptions {
        monitor_interval: config.supervisor.monitor_interval,
        startup_grace_period: config.supervisor.startup_grace_period,
        graceful_timeout: config.supervisor.graceful_timeout,
        restart: restart_policy(&config.supervisor.restart),
    }
}

fn restart_policy(config: &RestartPolicyConfig) -> RestartPolicy {
    let strategy = match config.strategy {
        siteops_config::RestartStrategy::Never => RestartStrategy::Never,
        siteops_config::RestartStrategy::OnFailure => RestartStrategy::OnFailure,
        siteops_config::RestartStrategy::Always => RestartStrategy::Always,
    };
    RestartPolicy {
        strategy,
        max_attempts: config.max_attempts,
        delay: config.restart_delay,
        backoff_multiplier: config.backoff_multiplier,
    }
}

pub(crate) fn health_policy(config: &SiteConfig) -> HealthCheckPolicy {
    HealthCheckPolicy {
        url: config.health.url.clone(),
        interval: config.health.interval,
        attempt_timeout: config.health.timeout,
        max_attempts: config.health.max_attempts,
    }
}

/// Cancel the token on SIGTERM or SIGINT. Teardown itself stays inside the
/// supervisor loop; the handler does nothing else.
pub(crate) fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM signal"),
                _ = sigint.recv() => info!("Received SIGINT signal"),
            }
        }
        _ => {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C signal");
        }
    }
}
