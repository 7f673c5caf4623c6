//! Build stage types.

use siteops_common::CommandSpec;
use std::path::PathBuf;

/// Degrade path for a stage whose primary command failed.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Run an alternate command, then verify the artifact as usual.
    Command(CommandSpec),
    /// Accept a preexisting artifact from an earlier run. The runner logs
    /// this as a stale artifact so it is never mistaken for a fresh build.
    ReuseExisting,
}

/// One step of the build pipeline.
#[derive(Debug, Clone)]
pub struct BuildStage {
    pub name: String,
    pub primary: CommandSpec,
    pub fallback: Option<Fallback>,
    /// On-disk output proving the stage completed.
    pub artifact: PathBuf,
    /// Whether an unsatisfied outcome halts the pipeline.
    pub required: bool,
}

impl BuildStage {
    pub fn new(name: impl Into<String>, primary: CommandSpec, artifact: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            primary,
            fallback: None,
            artifact: artifact.into(),
            required: true,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Outcome of one stage, reported whether or not the pipeline continued.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub satisfied: bool,
    pub used_fallback: bool,
    /// True when the stage was satisfied by reusing a preexisting artifact
    /// rather than producing a fresh one.
    pub stale_artifact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_builder() {
        let stage = BuildStage::new("site", CommandSpec::new("true"), "_site")
            .with_fallback(Fallback::ReuseExisting);
        assert!(stage.required);
        assert!(matches!(stage.fallback, Some(Fallback::ReuseExisting)));

        let optional = BuildStage::new("docs", CommandSpec::new("true"), "docs").optional();
        assert!(!optional.required);
    }
}
