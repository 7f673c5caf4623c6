//! Readiness gating for deployed services.
//!
//! [`await_ready`] polls an HTTP endpoint with bounded retries: one GET per
//! attempt under a per-attempt timeout, `interval` spacing between attempts.
//! A single success-class response is sufficient; a timed-out or refused probe
//! counts as one failed attempt, never as a fatal error. The total wall-clock
//! time never exceeds [`HealthCheckPolicy::max_total_wait`].

mod probe;

pub use probe::{probe_once, ProbeResult};

use siteops_common::{OrchestratorError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Readiness contract for a service.
#[derive(Debug, Clone)]
pub struct HealthCheckPolicy {
    /// Probe target URL (GET).
    pub url: String,
    /// Spacing between attempts.
    pub interval: Duration,
    /// Upper bound for a single probe.
    pub attempt_timeout: Duration,
    /// Total attempts before giving up.
    pub max_attempts: u32,
}

impl HealthCheckPolicy {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(5),
            max_attempts: 30,
        }
    }

    /// Upper bound on how long [`await_ready`] may block:
    /// `interval * (max_attempts - 1) + attempt_timeout * max_attempts`.
    pub fn max_total_wait(&self) -> Duration {
        let gaps = self.interval * self.max_attempts.saturating_sub(1);
        gaps + self.attempt_timeout * self.max_attempts
    }
}

/// Successful readiness determination.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyReport {
    /// Attempts consumed, including the successful one.
    pub attempts_used: u32,
}

/// Poll the policy target until it reports ready or attempts are exhausted.
pub async fn await_ready(policy: &HealthCheckPolicy) -> Result<ReadyReport> {
    info!(
        "Health gate: {} (interval {:?}, timeout {:?}, max {} attempts)",
        policy.url, policy.interval, policy.attempt_timeout, policy.max_attempts
    );

    for attempt in 1..=policy.max_attempts {
        let result = probe_once(&policy.url, policy.attempt_timeout).await?;
        if result.healthy {
            info!(
                "Health gate passed on attempt {}/{} ({}ms)",
                attempt, policy.max_attempts, result.response_time_ms
            );
            return Ok(ReadyReport { attempts_used: attempt });
        }

        debug!(
            "Health probe {}/{} failed: {}",
            attempt,
            policy.max_attempts,
            result.error.as_deref().unwrap_or("unknown")
        );

        // No sleep after the final attempt.
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(
        "Health gate failed: {} never became ready within {} attempts",
        policy.url, policy.max_attempts
    );
    Err(OrchestratorError::health_timeout(policy.max_attempts))
}
