//! `siteops deploy` - container deployment, status and teardown.

use anyhow::Result;
use siteops_common::OrchestratorError;
use siteops_config::SiteConfig;
use siteops_deploy::{ComposeRunner, DeployOptions, DeploymentOrchestrator};
use tracing::info;

pub async fn run(
    config: &SiteConfig,
    production: bool,
    tag: &str,
    status: bool,
    stop: bool,
) -> Result<()> {
    if status && stop {
        return Err(OrchestratorError::invalid_argument(
            "--status/--stop",
            "the two actions are mutually exclusive",
        )
        .into());
    }

    super::ensure_tools(&config.dependencies.deploy).await?;

    let mut runner = ComposeRunner::new(&config.deploy.container_cli);
    if let Some(ref file) = config.deploy.compose_file {
        runner = runner.with_compose_file(file);
    }
    let options = DeployOptions {
        image: config.deploy.image.clone(),
        log_tail: config.deploy.log_tail,
        environment: if production {
            "production".to_string()
        } else {
            "development".to_string()
        },
    };
    let orchestrator = DeploymentOrchestrator::new(runner, options, super::health_policy(config));

    if status {
        println!("{}", orchestrator.status().await?);
        return Ok(());
    }
    if stop {
        orchestrator.stop().await?;
        info!("Deployment stopped");
        return Ok(());
    }

    orchestrator.deploy(tag).await?;
    info!("Deployment of {}:{} is ready", config.deploy.image, tag);
    Ok(())
}
