//! Configuration for the siteops orchestrator.
//!
//! An optional `siteops.yaml` tunes commands, intervals and policies; every
//! field has a default so the orchestrator runs against a conventional
//! Jekyll + Vapor repository layout with no configuration file at all.
//! Durations are written as strings: `"2s"`, `"500ms"`, `"5m"`.

use serde::{Deserialize, Serialize};
use siteops_deps::ToolRequirement;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

pub mod validation;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub server: ServerSection,
    pub supervisor: SupervisorSection,
    pub health: HealthSection,
    pub deploy: DeploySection,
    pub dependencies: DependencySection,
}

/// Static-site generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Command that produces the site output directory.
    pub build_command: String,
    /// Command for the watch/serve development process.
    pub serve_command: String,
    /// Expected build artifact.
    pub output_dir: PathBuf,
    /// Whether a preexisting output directory may satisfy the site stage when
    /// the build command fails. Accepted artifacts are logged as stale.
    pub allow_stale_artifact: bool,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            build_command: "bundle exec jekyll build".to_string(),
            serve_command: "bundle exec jekyll serve --watch --port 4000".to_string(),
            output_dir: PathBuf::from("_site"),
            allow_stale_artifact: true,
        }
    }
}

/// Server toolchain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Command that compiles the server binary.
    pub build_command: String,
    /// Expected build artifact.
    pub binary_path: PathBuf,
    /// Arguments passed to the binary when supervised in dev mode.
    pub run_args: Vec<String>,
    /// Command for the dedicated test stage (`build --test`).
    pub test_command: String,
    /// Listen port, passed through as PORT.
    pub port: u16,
    /// Passed through as LOG_LEVEL.
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            build_command: "swift build -c release".to_string(),
            binary_path: PathBuf::from(".build/release/Server"),
            run_args: vec!["serve".to_string(), "--hostname".to_string(), "0.0.0.0".to_string()],
            test_command: "swift test".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

/// Supervisor timing and restart policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// Liveness poll spacing for the monitoring loop.
    #[serde(with = "duration_serde")]
    pub monitor_interval: Duration,
    /// How long a freshly spawned process gets to prove it is alive.
    #[serde(with = "duration_serde")]
    pub startup_grace_period: Duration,
    /// SIGTERM-to-SIGKILL window during shutdown.
    #[serde(with = "duration_serde")]
    pub graceful_timeout: Duration,
    pub restart: RestartPolicyConfig,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(2),
            startup_grace_period: Duration::from_secs(1),
            graceful_timeout: Duration::from_secs(10),
            restart: RestartPolicyConfig::default(),
        }
    }
}

/// Restart policy for supervised processes.
///
/// The default preserves the historical behavior: always restart, no cap, no
/// backoff. Operators who want a bounded crash-restart storm opt in here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicyConfig {
    pub strategy: RestartStrategy,
    /// Maximum automatic restarts per process. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Delay before respawning a crashed process.
    #[serde(with = "duration_serde")]
    pub restart_delay: Duration,
    /// Multiplier applied to the delay after each consecutive restart.
    pub backoff_multiplier: f32,
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            strategy: RestartStrategy::Always,
            max_attempts: None,
            restart_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Restart strategy enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    Never,
    OnFailure,
    Always,
}

/// Readiness probe policy for the deployed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub url: String,
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/health".to_string(),
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

/// Deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    /// Image name; the deploy tag is appended as `image:tag`.
    pub image: String,
    /// Container CLI program (`docker compose ...` subcommands are appended).
    pub container_cli: String,
    /// Compose file override, when not the default lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<String>,
    /// Lines of recent log output shown by `deploy --status`.
    pub log_tail: u32,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            image: "site".to_string(),
            container_cli: "docker".to_string(),
            compose_file: None,
            log_tail: 50,
        }
    }
}

/// Required tools per workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySection {
    /// Needed by `build` and `dev`.
    pub build: Vec<ToolRequirement>,
    /// Needed by `deploy`.
    pub deploy: Vec<ToolRequirement>,
}

impl Default for DependencySection {
    fn default() -> Self {
        Self {
            build: vec![
                ToolRequirement::new("bundle"),
                ToolRequirement::new("swift"),
            ],
            deploy: vec![ToolRequirement::new("docker")],
        }
    }
}

impl SiteConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: SiteConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration before anything acts on it.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

// Custom serialization for Duration as "2s" / "500ms" / "5m" strings.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        // "ms" must be checked before "s" since it ends with 's'.
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}
