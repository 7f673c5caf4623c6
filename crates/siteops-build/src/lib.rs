//! Build pipeline for the orchestrator.
//!
//! A pipeline is an ordered list of [`BuildStage`]s. Each stage runs a primary
//! command and, if that fails, an optional fallback; a stage only counts as
//! satisfied when its expected artifact exists afterwards. A successful exit
//! code is never sufficient proof of output on its own.

mod runner;
mod stage;

pub use runner::{run_pipeline, BuildOptions};
pub use stage::{BuildStage, Fallback, StageReport};
