//! Dependency checking for the orchestrator.
//!
//! Before any stage runs, every required external tool is probed for
//! presence and invocability. Probes are read-only; the result is a typed
//! capability report consumed once by the caller, not re-parsed ad hoc at
//! each call site. Missing tools are aggregated so the user sees the full
//! remediation list at once.

use serde::{Deserialize, Serialize};
use siteops_common::{OrchestratorError, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A tool the workflow needs, with an optional minimum version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequirement {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

impl ToolRequirement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
        }
    }

    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }
}

/// Outcome of probing one tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolStatus {
    /// Tool responded to `--version`; the reported version, when parseable.
    Available { version: Option<String> },
    /// Tool could not be invoked at all.
    Unavailable,
    /// Tool is present but older than the required minimum.
    VersionMismatch { found: String, required: String },
}

impl ToolStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, ToolStatus::Available { .. })
    }
}

/// Aggregated probe results for a set of requirements.
#[derive(Debug)]
pub struct DependencyReport {
    pub results: Vec<(ToolRequirement, ToolStatus)>,
}

impl DependencyReport {
    /// Names of every unsatisfied requirement, with a version hint where the
    /// tool exists but is too old.
    pub fn missing(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(req, status)| match status {
                ToolStatus::Available { .. } => None,
                ToolStatus::Unavailable => Some(req.name.clone()),
                ToolStatus::VersionMismatch { found, required } => Some(format!(
                    "{} (found {}, need >= {})",
                    req.name, found, required
                )),
            })
            .collect()
    }

    pub fn all_satisfied(&self) -> bool {
        self.results.iter().all(|(_, status)| status.is_usable())
    }

    /// Convert into the fatal error the caller must abort with, or `Ok(())`
    /// when every tool is usable.
    pub fn into_result(self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::dependency_missing(missing))
        }
    }
}

/// Probe every requirement and aggregate the results.
pub async fn check_tools(requirements: &[ToolRequirement]) -> DependencyReport {
    let mut results = Vec::with_capacity(requirements.len());
    for req in requirements {
        let status = probe_tool(req).await;
        debug!("Dependency probe: {} -> {:?}", req.name, status);
        results.push((req.clone(), status));
    }
    DependencyReport { results }
}

async fn probe_tool(req: &ToolRequirement) -> ToolStatus {
    let output = Command::new(&req.name)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match output {
        Ok(out) => out,
        Err(_) => return ToolStatus::Unavailable,
    };

    if !output.status.success() {
        return ToolStatus::Unavailable;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = extract_version(&stdout);

    match (&req.min_version, &version) {
        (Some(required), Some(found)) if version_lt(found, required) => {
            ToolStatus::VersionMismatch {
                found: found.clone(),
                required: required.clone(),
            }
        }
        // No minimum requested, or version not parseable: presence is enough.
        _ => ToolStatus::Available { version },
    }
}

/// Pull the first `x.y[.z]` token out of a `--version` banner.
fn extract_version(banner: &str) -> Option<String> {
    banner
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .find(|token| {
            let mut parts = token.split('.');
            matches!(
                (parts.next(), parts.next()),
                (Some(a), Some(b)) if !a.is_empty()
                    && a.chars().all(|c| c.is_ascii_digit())
                    && !b.is_empty()
                    && b.chars().all(|c| c.is_ascii_digit())
            )
        })
        .map(str::to_string)
}

/// Numeric component-wise comparison of dotted versions. Missing components
/// compare as zero; non-numeric components end the comparison.
fn version_lt(found: &str, required: &str) -> bool {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map_while(|part| part.parse::<u64>().ok())
            .collect()
    };
    let f = parse(found);
    let r = parse(required);
    for i in 0..f.len().max(r.len()) {
        let fv = f.get(i).copied().unwrap_or(0);
        let rv = r.get(i).copied().unwrap_or(0);
        if fv != rv {
            return fv < rv;
        }
    }
    false
}
