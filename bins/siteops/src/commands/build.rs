//! `siteops build` - run the staged build pipeline.

use anyhow::Result;
use siteops_build::{run_pipeline, BuildOptions, BuildStage, Fallback};
use siteops_config::SiteConfig;
use tracing::{info, warn};

pub async fn run(config: &SiteConfig, with_tests: bool, clean: bool) -> Result<()> {
    super::ensure_tools(&config.dependencies.build).await?;

    let stages = assemble_stages(config)?;
    let test_command = super::parse_command("server.test_command", &config.server.test_command)?;

    let reports = run_pipeline(&stages, &test_command, BuildOptions { clean, with_tests }).await?;

    for report in &reports {
        if report.stale_artifact {
            warn!(
                "Stage '{}' was satisfied by a preexisting artifact; the output may be out of date",
                report.stage
            );
        }
    }
    info!("Build complete ({} stage(s))", reports.len());
    Ok(())
}

/// Site stage first, server stage second. The site stage may fall back to a
/// preexisting output directory when the configuration allows it; the server
/// stage never falls back.
pub(crate) fn assemble_stages(config: &SiteConfig) -> Result<Vec<BuildStage>> {
    let site_command = super::parse_command("site.build_command", &config.site.build_command)?;
    let mut site = BuildStage::new("site", site_command, &config.site.output_dir);
    if config.site.allow_stale_artifact {
        site = site.with_fallback(Fallback::ReuseExisting);
    }

    let server_command =
        super::parse_command("server.build_command", &config.server.build_command)?;
    let server = BuildStage::new("server", server_command, &config.server.binary_path);

    Ok(vec![site, server])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_stage_assembly() {
        let stages = assemble_stages(&SiteConfig::default()).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "site");
        assert_eq!(stages[0].artifact, PathBuf::from("_site"));
        assert!(matches!(stages[0].fallback, Some(Fallback::ReuseExisting)));
        assert_eq!(stages[1].name, "server");
        assert!(stages[1].fallback.is_none());
    }

    #[test]
    fn test_stale_fallback_can_be_disabled() {
        let mut config = SiteConfig::default();
        config.site.allow_stale_artifact = false;
        let stages = assemble_stages(&config).unwrap();
        assert!(stages[0].fallback.is_none());
    }
}
