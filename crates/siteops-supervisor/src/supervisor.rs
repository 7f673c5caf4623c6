//! Managed-process registry and monitoring loop.

use crate::state::{ServiceState, StateMachine};
use chrono::{DateTime, Utc};
use siteops_common::{CommandSpec, OrchestratorError, Result};
use siteops_process::{force_kill, spawn_command, terminate_gracefully};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// When a crashed process is respawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStrategy {
    Never,
    OnFailure,
    Always,
}

/// Restart policy for crashed processes.
///
/// The default restarts unconditionally with no cap and no delay, matching
/// the historical orchestration behavior. A bounded-backoff policy is opt-in.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub strategy: RestartStrategy,
    /// Maximum automatic restarts per process; `None` is unbounded.
    pub max_attempts: Option<u32>,
    /// Base delay before respawning.
    pub delay: Duration,
    /// Multiplier applied per consecutive restart.
    pub backoff_multiplier: f32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            strategy: RestartStrategy::Always,
            max_attempts: None,
            delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

impl RestartPolicy {
    fn should_restart(&self, exited_cleanly: bool, restart_count: u32) -> bool {
        match self.strategy {
            RestartStrategy::Never => false,
            RestartStrategy::OnFailure if exited_cleanly => false,
            _ => match self.max_attempts {
                Some(max) => restart_count < max,
                None => true,
            },
        }
    }

    /// Delay before the given restart, with exponential backoff capped at
    /// five minutes.
    fn delay_for(&self, restart_count: u32) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let multiplier = f64::from(self.backoff_multiplier).powi(restart_count as i32);
        let secs = self.delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(secs.min(300.0))
    }
}

/// Supervisor timing knobs.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Liveness poll spacing.
    pub monitor_interval: Duration,
    /// How long a spawned process must survive to count as running.
    pub startup_grace_period: Duration,
    /// SIGTERM-to-SIGKILL window.
    pub graceful_timeout: Duration,
    pub restart: RestartPolicy,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(2),
            startup_grace_period: Duration::from_secs(1),
            graceful_timeout: Duration::from_secs(10),
            restart: RestartPolicy::default(),
        }
    }
}

/// A supervised long-running unit. At most one live OS process exists per
/// entry; the previous child is always reaped before a new one is spawned.
struct ManagedProcess {
    spec: CommandSpec,
    machine: StateMachine,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    restart_count: u32,
    /// Deadline for promoting a respawned process to Running.
    grace_deadline: Option<Instant>,
    /// Earliest time a pending restart may spawn.
    restart_due: Option<Instant>,
}

impl ManagedProcess {
    fn new(name: &str, spec: CommandSpec) -> Self {
        Self {
            spec,
            machine: StateMachine::new(name),
            child: None,
            pid: None,
            started_at: None,
            restart_count: 0,
            grace_deadline: None,
            restart_due: None,
        }
    }
}

/// Externally visible snapshot of one managed process.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub name: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub uptime: Option<Duration>,
}

/// Owns the registry of managed processes and drives their lifecycle.
///
/// All entries are mutated only from the supervisor's own methods; there is
/// no shared mutable state and no locking.
pub struct Supervisor {
    options: SupervisorOptions,
    registry: HashMap<String, ManagedProcess>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            registry: HashMap::new(),
        }
    }

    /// Spawn a named process and confirm it survives the startup grace
    /// period. Failure to survive is surfaced immediately, not retried.
    pub async fn start(&mut self, name: &str, spec: CommandSpec) -> Result<()> {
        if let Some(entry) = self.registry.get(name) {
            if entry.machine.current().is_live() {
                return Err(OrchestratorError::spawn_failed(name, "already running"));
            }
        }

        let entry = self
            .registry
            .entry(name.to_string())
            .or_insert_with(|| ManagedProcess::new(name, spec.clone()));
        entry.spec = spec;
        entry.machine.transition_to(ServiceState::Starting, None);

        info!("Starting '{}': {}", name, entry.spec);
        let child = match spawn_command(name, &entry.spec) {
            Ok(child) => child,
            Err(e) => {
                entry
                    .machine
                    .transition_to(ServiceState::Failed, Some(e.to_string()));
                return Err(e);
            }
        };
        entry.pid = child.id();
        entry.started_at = Some(Utc::now());
        entry.child = Some(child);

        tokio::time::sleep(self.options.startup_grace_period).await;

        let entry = self
            .registry
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::spawn_failed(name, "entry vanished"))?;
        if let Some(child) = entry.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                entry.child = None;
                entry.pid = None;
                let reason = format!("exited during startup grace period ({status})");
                entry
                    .machine
                    .transition_to(ServiceState::Failed, Some(reason.clone()));
                return Err(OrchestratorError::spawn_failed(name, reason));
            }
        }

        entry.machine.transition_to(ServiceState::Running, None);
        info!("Process '{}' running (pid {:?})", name, entry.pid);
        Ok(())
    }

    /// Monitoring loop: poll every tick until the token is cancelled, then
    /// perform ordered teardown of every tracked process.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval(self.options.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Supervisor loop started ({} processes, interval {:?})",
            self.registry.len(),
            self.options.monitor_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One monitoring tick: reap dead children, promote survivors, respawn
    /// due restarts. Work on one entry never blocks another.
    pub async fn poll_once(&mut self) {
        let names: Vec<String> = self.registry.keys().cloned().collect();
        let now = Instant::now();

        for name in &names {
            self.reap_or_promote(name, now);
        }
        for name in &names {
            self.respawn_if_due(name, now);
        }
    }

    fn reap_or_promote(&mut self, name: &str, now: Instant) {
        let Some(entry) = self.registry.get_mut(name) else {
            return;
        };
        let state = entry.machine.current();
        if !matches!(state, ServiceState::Running | ServiceState::Starting) {
            return;
        }

        let exited = match entry.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(status) => status,
                Err(e) => {
                    warn!("Liveness check failed for '{}': {}", name, e);
                    None
                }
            },
            None => return,
        };

        match exited {
            Some(status) => {
                entry.child = None;
                entry.pid = None;
                warn!("Process '{}' exited unexpectedly ({})", name, status);
                entry
                    .machine
                    .transition_to(ServiceState::Failed, Some(status.to_string()));

                let policy = &self.options.restart;
                if policy.should_restart(status.success(), entry.restart_count) {
                    entry.machine.transition_to(ServiceState::Restarting, None);
                    entry.restart_count += 1;
                    let delay = policy.delay_for(entry.restart_count.saturating_sub(1));
                    entry.restart_due = Some(now + delay);
                    info!(
                        "Scheduling restart #{} of '{}' in {:?}",
                        entry.restart_count, name, delay
                    );
                } else {
                    warn!(
                        "Not restarting '{}' (strategy {:?}, {} restarts so far)",
                        name, policy.strategy, entry.restart_count
                    );
                }
            }
            None => {
                // Alive. Promote a respawned process once its grace period
                // has elapsed.
                if state == ServiceState::Starting
                    && entry.grace_deadline.is_some_and(|deadline| now >= deadline)
                {
                    entry.grace_deadline = None;
                    entry.machine.transition_to(ServiceState::Running, None);
                    info!("Process '{}' running again (pid {:?})", name, entry.pid);
                }
            }
        }
    }

    fn respawn_if_due(&mut self, name: &str, now: Instant) {
        let Some(entry) = self.registry.get_mut(name) else {
            return;
        };
        if entry.machine.current() != ServiceState::Restarting {
            return;
        }
        if entry.restart_due.is_some_and(|due| now < due) {
            return;
        }

        match spawn_command(name, &entry.spec) {
            Ok(child) => {
                entry.pid = child.id();
                entry.started_at = Some(Utc::now());
                entry.child = Some(child);
                entry.restart_due = None;
                entry.grace_deadline = Some(now + self.options.startup_grace_period);
                entry.machine.transition_to(ServiceState::Starting, None);
            }
            Err(e) => {
                // Retried on a later tick for as long as the supervisor runs.
                error!("Respawn of '{}' failed: {}", name, e);
                entry.restart_due = Some(now + self.options.monitor_interval);
            }
        }
    }

    /// Stop one process: SIGTERM, bounded wait, SIGKILL fallback. Idempotent;
    /// stopping an unknown or already-stopped entry is a no-op.
    pub async fn stop(&mut self, name: &str) -> Result<()> {
        let Some(entry) = self.registry.get_mut(name) else {
            debug!("Stop requested for unknown process '{}'", name);
            return Ok(());
        };
        if entry.machine.current() == ServiceState::Stopped {
            return Ok(());
        }

        entry.machine.transition_to(ServiceState::Stopping, None);

        if let (Some(pid), Some(child)) = (entry.pid, entry.child.as_mut()) {
            info!("Stopping '{}' (pid {})", name, pid);
            if let Err(e) = terminate_gracefully(pid) {
                warn!("SIGTERM to '{}' failed: {}", name, e);
            }
            match timeout(self.options.graceful_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("Process '{}' exited ({})", name, status),
                Ok(Err(e)) => warn!("Wait for '{}' failed: {}", name, e),
                Err(_) => {
                    warn!(
                        "Process '{}' ignored SIGTERM for {:?}, force killing",
                        name, self.options.graceful_timeout
                    );
                    if let Err(e) = force_kill(pid) {
                        warn!("SIGKILL to '{}' failed: {}", name, e);
                    }
                    let _ = child.wait().await;
                }
            }
        }

        entry.child = None;
        entry.pid = None;
        entry.restart_due = None;
        entry.grace_deadline = None;
        entry.machine.transition_to(ServiceState::Stopped, None);
        info!("Process '{}' stopped", name);
        Ok(())
    }

    /// Stop every tracked process regardless of state. Safe to call more
    /// than once; a second call finds everything already stopped.
    pub async fn shutdown(&mut self) {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!("Shutdown of '{}' reported: {}", name, e);
            }
        }
        info!("Supervisor shutdown complete");
    }

    pub fn snapshot(&self, name: &str) -> Option<ProcessSnapshot> {
        self.registry.get(name).map(|entry| ProcessSnapshot {
            name: name.to_string(),
            state: entry.machine.current(),
            pid: entry.pid,
            started_at: entry.started_at,
            restart_count: entry.restart_count,
            uptime: entry
                .started_at
                .filter(|_| entry.machine.current() == ServiceState::Running)
                .and_then(|t| (Utc::now() - t).to_std().ok()),
        })
    }

    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        let mut names: Vec<&String> = self.registry.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.snapshot(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> SupervisorOptions {
        SupervisorOptions {
            monitor_interval: Duration::from_millis(50),
            startup_grace_period: Duration::from_millis(50),
            graceful_timeout: Duration::from_millis(300),
            restart: RestartPolicy::default(),
        }
    }

    fn sleep_spec(secs: &str) -> CommandSpec {
        CommandSpec::new("sleep").arg(secs)
    }

    async fn drive(sup: &mut Supervisor, ticks: u32) {
        for _ in 0..ticks {
            sup.poll_once().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut sup = Supervisor::new(fast_options());
        sup.start("svc", sleep_spec("30")).await.unwrap();

        let snap = sup.snapshot("svc").unwrap();
        assert_eq!(snap.state, ServiceState::Running);
        let pid = snap.pid.unwrap();
        assert!(siteops_process::process_exists(pid).unwrap());

        sup.stop("svc").await.unwrap();
        let snap = sup.snapshot("svc").unwrap();
        assert_eq!(snap.state, ServiceState::Stopped);
        assert!(snap.pid.is_none());
    }

    #[tokio::test]
    async fn test_failed_start_surfaces_immediately() {
        let mut sup = Supervisor::new(fast_options());
        let spec = CommandSpec::new("sh").arg("-c").arg("exit 7");
        let err = sup.start("flaky", spec).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ProcessSpawnFailed { .. }));
        assert_eq!(sup.snapshot("flaky").unwrap().state, ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_spawn_error_surfaces_immediately() {
        let mut sup = Supervisor::new(fast_options());
        let err = sup
            .start("ghost", CommandSpec::new("no-such-binary-here"))
            .await
            .unwrap_err();
        match err {
            OrchestratorError::ProcessSpawnFailed { name, .. } => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_external_kill_triggers_respawn_with_count() {
        let mut sup = Supervisor::new(fast_options());
        sup.start("svc", sleep_spec("30")).await.unwrap();
        let first_pid = sup.snapshot("svc").unwrap().pid.unwrap();

        force_kill(first_pid).unwrap();
        drive(&mut sup, 6).await;

        let snap = sup.snapshot("svc").unwrap();
        assert_eq!(snap.state, ServiceState::Running);
        assert_eq!(snap.restart_count, 1);
        let second_pid = snap.pid.unwrap();
        assert_ne!(first_pid, second_pid);
        assert!(siteops_process::process_exists(second_pid).unwrap());

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_of_one_does_not_disturb_others() {
        let mut sup = Supervisor::new(fast_options());
        sup.start("a", sleep_spec("30")).await.unwrap();
        sup.start("b", sleep_spec("30")).await.unwrap();
        let pid_a = sup.snapshot("a").unwrap().pid.unwrap();
        let pid_b = sup.snapshot("b").unwrap().pid.unwrap();

        force_kill(pid_a).unwrap();
        drive(&mut sup, 6).await;

        let snap_b = sup.snapshot("b").unwrap();
        assert_eq!(snap_b.state, ServiceState::Running);
        assert_eq!(snap_b.pid.unwrap(), pid_b);
        assert_eq!(snap_b.restart_count, 0);
        assert_eq!(sup.snapshot("a").unwrap().state, ServiceState::Running);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mut sup = Supervisor::new(fast_options());
        sup.start("svc", sleep_spec("30")).await.unwrap();
        let pid = sup.snapshot("svc").unwrap().pid.unwrap();

        sup.shutdown().await;
        assert_eq!(sup.snapshot("svc").unwrap().state, ServiceState::Stopped);
        assert!(!siteops_process::process_exists(pid).unwrap());

        // Second shutdown produces the same final state.
        sup.shutdown().await;
        assert_eq!(sup.snapshot("svc").unwrap().state, ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_sigterm_ignorer_is_force_killed() {
        let mut sup = Supervisor::new(fast_options());
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30");
        sup.start("stubborn", spec).await.unwrap();
        let pid = sup.snapshot("stubborn").unwrap().pid.unwrap();

        sup.stop("stubborn").await.unwrap();
        assert_eq!(sup.snapshot("stubborn").unwrap().state, ServiceState::Stopped);
        assert!(!siteops_process::process_exists(pid).unwrap());
    }

    #[tokio::test]
    async fn test_never_strategy_leaves_process_failed() {
        let mut options = fast_options();
        options.restart.strategy = RestartStrategy::Never;
        let mut sup = Supervisor::new(options);
        sup.start("svc", sleep_spec("30")).await.unwrap();
        let pid = sup.snapshot("svc").unwrap().pid.unwrap();

        force_kill(pid).unwrap();
        drive(&mut sup, 4).await;

        let snap = sup.snapshot("svc").unwrap();
        assert_eq!(snap.state, ServiceState::Failed);
        assert_eq!(snap.restart_count, 0);
    }

    #[tokio::test]
    async fn test_max_attempts_caps_restarts() {
        let mut options = fast_options();
        options.restart.max_attempts = Some(1);
        let mut sup = Supervisor::new(options);
        sup.start("svc", sleep_spec("30")).await.unwrap();

        // First crash: restarted once.
        force_kill(sup.snapshot("svc").unwrap().pid.unwrap()).unwrap();
        drive(&mut sup, 6).await;
        assert_eq!(sup.snapshot("svc").unwrap().state, ServiceState::Running);
        assert_eq!(sup.snapshot("svc").unwrap().restart_count, 1);

        // Second crash: cap reached, stays failed.
        force_kill(sup.snapshot("svc").unwrap().pid.unwrap()).unwrap();
        drive(&mut sup, 6).await;
        let snap = sup.snapshot("svc").unwrap();
        assert_eq!(snap.state, ServiceState::Failed);
        assert_eq!(snap.restart_count, 1);
    }

    #[tokio::test]
    async fn test_run_loop_tears_down_on_cancel() {
        let mut sup = Supervisor::new(fast_options());
        sup.start("svc", sleep_spec("30")).await.unwrap();
        let pid = sup.snapshot("svc").unwrap().pid.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        sup.run(cancel).await.unwrap();
        assert_eq!(sup.snapshot("svc").unwrap().state, ServiceState::Stopped);
        assert!(!siteops_process::process_exists(pid).unwrap());
    }

    #[test]
    fn test_backoff_delay_progression() {
        let policy = RestartPolicy {
            strategy: RestartStrategy::Always,
            max_attempts: None,
            delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        // Capped at five minutes.
        assert_eq!(policy.delay_for(30), Duration::from_secs(300));
    }

    #[test]
    fn test_on_failure_skips_clean_exit() {
        let policy = RestartPolicy {
            strategy: RestartStrategy::OnFailure,
            ..RestartPolicy::default()
        };
        assert!(!policy.should_restart(true, 0));
        assert!(policy.should_restart(false, 0));
    }
}
