//! `siteops dev` - build, then supervise the development processes.

use anyhow::Result;
use siteops_build::{run_pipeline, BuildOptions};
use siteops_common::{CommandSpec, OrchestratorError};
use siteops_config::SiteConfig;
use siteops_supervisor::Supervisor;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(config: &SiteConfig, jekyll_only: bool, vapor_only: bool) -> Result<()> {
    if jekyll_only && vapor_only {
        return Err(OrchestratorError::invalid_argument(
            "--jekyll-only/--vapor-only",
            "the two modes are mutually exclusive",
        )
        .into());
    }

    super::ensure_tools(&config.dependencies.build).await?;

    // Build what is about to run. The watcher rebuilds the site itself, so
    // only the server needs a compiled binary up front.
    if !jekyll_only {
        let stages = super::build::assemble_stages(config)?;
        let server_stage: Vec<_> = stages.into_iter().filter(|s| s.name == "server").collect();
        let test_command =
            super::parse_command("server.test_command", &config.server.test_command)?;
        run_pipeline(&server_stage, &test_command, BuildOptions::default()).await?;
    }

    let mut supervisor = Supervisor::new(super::supervisor_options(config));

    if !vapor_only {
        let watcher = super::parse_command("site.serve_command", &config.site.serve_command)?;
        supervisor.start("site", watcher).await?;
    }
    if !jekyll_only {
        supervisor.start("server", server_spec(config)?).await?;
    }

    for snapshot in supervisor.snapshots() {
        info!(
            "Supervising '{}' (pid {:?}, state {})",
            snapshot.name, snapshot.pid, snapshot.state
        );
    }

    let cancel = CancellationToken::new();
    super::spawn_signal_handler(cancel.clone());
    supervisor.run(cancel).await?;

    info!("Development processes stopped");
    Ok(())
}

/// The supervised server process: the compiled binary with its configured
/// arguments. PORT, LOG_LEVEL and ENVIRONMENT come from the caller's
/// environment when set, otherwise from configuration.
fn server_spec(config: &SiteConfig) -> Result<CommandSpec> {
    let port =
        std::env::var("PORT").unwrap_or_else(|_| config.server.port.to_string());
    let log_level =
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| config.server.log_level.clone());
    let environment =
        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    Ok(CommandSpec::new(config.server.binary_path.display().to_string())
        .args(config.server.run_args.iter().cloned())
        .env("PORT", port)
        .env("LOG_LEVEL", log_level)
        .env("ENVIRONMENT", environment))
}
