//! Sequential stage execution.

use crate::stage::{BuildStage, Fallback, StageReport};
use siteops_common::{CommandSpec, OrchestratorError, Result};
use siteops_process::run_command;
use tracing::{error, info, warn};

/// Pipeline mode flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Remove every stage artifact before any stage runs.
    pub clean: bool,
    /// Run the dedicated test stage after the build stages complete.
    pub with_tests: bool,
}

/// Execute the pipeline in order.
///
/// Stages run sequentially; the first unsatisfied required stage halts the
/// pipeline and later stages never run. When `with_tests` is set, the test
/// command runs after all build stages and is itself a hard gate with its own
/// failure category.
pub async fn run_pipeline(
    stages: &[BuildStage],
    test_command: &CommandSpec,
    options: BuildOptions,
) -> Result<Vec<StageReport>> {
    if options.clean {
        clean_artifacts(stages)?;
    }

    let mut reports = Vec::with_capacity(stages.len());
    for stage in stages {
        let report = run_stage(stage).await?;
        let satisfied = report.satisfied;
        let used_fallback = report.used_fallback;
        reports.push(report);

        if !satisfied {
            if stage.required {
                error!("Stage '{}' unsatisfied, halting pipeline", stage.name);
                return Err(OrchestratorError::stage_failed(&stage.name, used_fallback));
            }
            warn!("Optional stage '{}' unsatisfied, continuing", stage.name);
        }
    }

    if options.with_tests {
        info!("Running test stage: {}", test_command);
        let status = run_command(test_command).await?;
        if !status.success() {
            error!("Test stage failed with {}", status);
            return Err(OrchestratorError::TestsFailed);
        }
        info!("Test stage passed");
    }

    Ok(reports)
}

/// Remove prior stage outputs. A missing artifact is not an error.
fn clean_artifacts(stages: &[BuildStage]) -> Result<()> {
    for stage in stages {
        if !stage.artifact.exists() {
            continue;
        }
        info!("Cleaning artifact for '{}': {}", stage.name, stage.artifact.display());
        if stage.artifact.is_dir() {
            std::fs::remove_dir_all(&stage.artifact)?;
        } else {
            std::fs::remove_file(&stage.artifact)?;
        }
    }
    Ok(())
}

async fn run_stage(stage: &BuildStage) -> Result<StageReport> {
    info!("Stage '{}': {}", stage.name, stage.primary);
    let primary_status = run_command(&stage.primary).await?;

    let mut used_fallback = false;
    let mut stale_artifact = false;
    let mut command_ok = primary_status.success();

    if !command_ok {
        warn!(
            "Stage '{}' primary command failed with {}",
            stage.name, primary_status
        );
        match &stage.fallback {
            Some(Fallback::Command(fallback)) => {
                used_fallback = true;
                info!("Stage '{}' falling back to: {}", stage.name, fallback);
                command_ok = run_command(fallback).await?.success();
            }
            Some(Fallback::ReuseExisting) => {
                used_fallback = true;
                if stage.artifact.exists() {
                    // Best-effort degrade: the artifact predates this run.
                    stale_artifact = true;
                    command_ok = true;
                    warn!(
                        "Stage '{}': stale artifact accepted at {}",
                        stage.name,
                        stage.artifact.display()
                    );
                } else {
                    command_ok = false;
                }
            }
            None => {}
        }
    }

    let satisfied = command_ok && stage.artifact.exists();
    if command_ok && !satisfied {
        // Exit code 0 without output is still a failure.
        warn!(
            "Stage '{}' exited successfully but artifact {} is missing",
            stage.name,
            stage.artifact.display()
        );
    }
    if satisfied {
        info!(
            "Stage '{}' satisfied (fallback: {}, stale: {})",
            stage.name, used_fallback, stale_artifact
        );
    }

    Ok(StageReport {
        stage: stage.name.clone(),
        satisfied,
        used_fallback,
        stale_artifact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{BuildStage, Fallback};
    use std::path::Path;
    use tempfile::TempDir;

    fn sh(script: impl Into<String>) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn touch_stage(dir: &Path, name: &str, artifact: &str) -> BuildStage {
        let path = dir.join(artifact);
        BuildStage::new(
            name,
            sh(format!("touch {}", path.display())),
            path,
        )
    }

    fn no_tests() -> CommandSpec {
        CommandSpec::new("true")
    }

    #[tokio::test]
    async fn test_fallback_never_runs_when_primary_succeeds() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("out.txt");
        let marker = dir.path().join("fallback-ran");
        let stage = BuildStage::new(
            "site",
            sh(format!("touch {}", artifact.display())),
            &artifact,
        )
        .with_fallback(Fallback::Command(sh(format!(
            "touch {}",
            marker.display()
        ))));

        let reports = run_pipeline(&[stage], &no_tests(), BuildOptions::default())
            .await
            .unwrap();
        assert!(reports[0].satisfied);
        assert!(!reports[0].used_fallback);
        assert!(!marker.exists(), "fallback must not have been invoked");
    }

    #[tokio::test]
    async fn test_halt_stops_later_stages() {
        let dir = TempDir::new().unwrap();
        let later_marker = dir.path().join("later-ran");
        let failing = BuildStage::new("broken", sh("exit 1"), dir.path().join("never.txt"));
        let later = touch_stage(dir.path(), "later", "later-ran");

        let err = run_pipeline(&[failing, later], &no_tests(), BuildOptions::default())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::BuildStageFailed { stage, used_fallback } => {
                assert_eq!(stage, "broken");
                assert!(!used_fallback);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!later_marker.exists(), "later stage must never run");
    }

    #[tokio::test]
    async fn test_success_exit_without_artifact_is_unsatisfied() {
        let dir = TempDir::new().unwrap();
        let stage = BuildStage::new("empty", sh("true"), dir.path().join("missing.txt"));
        let err = run_pipeline(&[stage], &no_tests(), BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::BuildStageFailed { .. }));
    }

    #[tokio::test]
    async fn test_stale_artifact_accepted_and_flagged() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("_site");
        std::fs::create_dir(&artifact).unwrap();
        let stage = BuildStage::new("site", sh("exit 1"), &artifact)
            .with_fallback(Fallback::ReuseExisting);

        let reports = run_pipeline(&[stage], &no_tests(), BuildOptions::default())
            .await
            .unwrap();
        assert!(reports[0].satisfied);
        assert!(reports[0].used_fallback);
        assert!(reports[0].stale_artifact);
    }

    #[tokio::test]
    async fn test_reuse_without_prior_artifact_fails() {
        let dir = TempDir::new().unwrap();
        let stage = BuildStage::new("site", sh("exit 1"), dir.path().join("_site"))
            .with_fallback(Fallback::ReuseExisting);
        let err = run_pipeline(&[stage], &no_tests(), BuildOptions::default())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::BuildStageFailed { used_fallback, .. } => assert!(used_fallback),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_clean_two_stage_scenario_with_fallback() {
        // Stage 1 primary fails but its fallback command succeeds; stage 2
        // succeeds. Overall result is success with the fallback recorded.
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("_site");
        let binary = dir.path().join("server-bin");
        // Prior artifact that --clean must remove before stage 1 runs.
        std::fs::create_dir(&site).unwrap();
        std::fs::write(site.join("stale.html"), "old").unwrap();

        let stage1 = BuildStage::new("site", sh("exit 1"), &site)
            .with_fallback(Fallback::Command(sh(format!(
                "mkdir -p {}",
                site.display()
            ))));
        let stage2 = BuildStage::new(
            "server",
            sh(format!("touch {}", binary.display())),
            &binary,
        );

        let reports = run_pipeline(
            &[stage1, stage2],
            &no_tests(),
            BuildOptions { clean: true, with_tests: false },
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].satisfied && reports[0].used_fallback);
        assert!(reports[1].satisfied && !reports[1].used_fallback);
        // The clean pass removed the stale page before the fallback rebuilt
        // the directory.
        assert!(!site.join("stale.html").exists());
    }

    #[tokio::test]
    async fn test_tests_failed_is_distinct_category() {
        let dir = TempDir::new().unwrap();
        let stage = touch_stage(dir.path(), "site", "out.txt");
        let err = run_pipeline(
            &[stage],
            &sh("exit 3"),
            BuildOptions { clean: false, with_tests: true },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::TestsFailed));
    }

    #[tokio::test]
    async fn test_tests_skipped_without_flag() {
        let dir = TempDir::new().unwrap();
        let stage = touch_stage(dir.path(), "site", "out.txt");
        // The failing test command is never run when with_tests is off.
        let reports = run_pipeline(&[stage], &sh("exit 3"), BuildOptions::default())
            .await
            .unwrap();
        assert!(reports[0].satisfied);
    }

    #[tokio::test]
    async fn test_optional_stage_does_not_halt() {
        let dir = TempDir::new().unwrap();
        let optional =
            BuildStage::new("extras", sh("exit 1"), dir.path().join("never")).optional();
        let later = touch_stage(dir.path(), "later", "later.txt");
        let reports = run_pipeline(&[optional, later], &no_tests(), BuildOptions::default())
            .await
            .unwrap();
        assert!(!reports[0].satisfied);
        assert!(reports[1].satisfied);
    }
}
