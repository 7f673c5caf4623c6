//! Service lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lifecycle states of a supervised service.
///
/// `Stopped → Starting → Running → (Failed → Restarting → Starting) |
/// Stopping → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Not running; either never started or explicitly stopped.
    Stopped,
    /// Spawned, waiting out the startup grace period.
    Starting,
    /// Confirmed alive.
    Running,
    /// Graceful termination in progress.
    Stopping,
    /// Exited unexpectedly; restart not yet scheduled or given up.
    Failed,
    /// Crash detected, respawn pending.
    Restarting,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Failed => "failed",
            ServiceState::Restarting => "restarting",
        };
        write!(f, "{s}")
    }
}

impl ServiceState {
    /// States in which an OS process may be alive.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ServiceState::Starting | ServiceState::Running | ServiceState::Stopping
        )
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ServiceState,
    pub to: ServiceState,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

const HISTORY_LIMIT: usize = 64;

/// Per-service state machine with a bounded transition history.
#[derive(Debug, Clone)]
pub struct StateMachine {
    name: String,
    current: ServiceState,
    history: Vec<StateTransition>,
    last_transition: DateTime<Utc>,
}

impl StateMachine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            current: ServiceState::Stopped,
            history: Vec::new(),
            last_transition: Utc::now(),
        }
    }

    pub fn current(&self) -> ServiceState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition
    }

    /// Whether moving to `target` is a legal lifecycle step.
    pub fn is_valid_transition(&self, target: ServiceState) -> bool {
        use ServiceState::*;
        match (self.current, target) {
            (Stopped, Starting) => true,

            (Starting, Running) => true,
            (Starting, Failed) => true,
            (Starting, Stopping) => true,

            (Running, Failed) => true,
            (Running, Stopping) => true,

            // Shutdown may sweep a failed or restarting entry straight to
            // Stopped; there is no live process left to signal.
            (Failed, Restarting) => true,
            // Manual restart of a failed service.
            (Failed, Starting) => true,
            (Failed, Stopping) => true,
            (Failed, Stopped) => true,

            (Restarting, Starting) => true,
            (Restarting, Failed) => true,
            (Restarting, Stopping) => true,
            (Restarting, Stopped) => true,

            (Stopping, Stopped) => true,
            (Stopping, Failed) => true,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Move to `target`, recording the transition. Illegal transitions are a
    /// programming error in the supervisor loop and are reported, not
    /// panicked on.
    pub fn transition_to(&mut self, target: ServiceState, reason: Option<String>) -> bool {
        if !self.is_valid_transition(target) {
            debug!(
                "Ignoring invalid transition for '{}': {} -> {}",
                self.name, self.current, target
            );
            return false;
        }
        if self.current == target {
            return true;
        }

        let now = Utc::now();
        self.history.push(StateTransition {
            from: self.current,
            to: target,
            at: now,
            reason,
        });
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }

        debug!("Service '{}': {} -> {}", self.name, self.current, target);
        self.current = target;
        self.last_transition = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let mut sm = StateMachine::new("server");
        assert_eq!(sm.current(), ServiceState::Stopped);

        assert!(sm.transition_to(ServiceState::Starting, None));
        assert!(sm.transition_to(ServiceState::Running, None));
        assert!(sm.transition_to(ServiceState::Stopping, None));
        assert!(sm.transition_to(ServiceState::Stopped, None));
        assert_eq!(sm.history().len(), 4);
    }

    #[test]
    fn test_crash_restart_cycle() {
        let mut sm = StateMachine::new("server");
        sm.transition_to(ServiceState::Starting, None);
        sm.transition_to(ServiceState::Running, None);

        assert!(sm.transition_to(ServiceState::Failed, Some("exited".to_string())));
        assert!(sm.transition_to(ServiceState::Restarting, None));
        assert!(sm.transition_to(ServiceState::Starting, None));
        assert!(sm.transition_to(ServiceState::Running, None));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut sm = StateMachine::new("server");
        // Stopped -> Running skips Starting.
        assert!(!sm.is_valid_transition(ServiceState::Running));
        assert!(!sm.transition_to(ServiceState::Running, None));
        assert_eq!(sm.current(), ServiceState::Stopped);
        // Stopped -> Restarting makes no sense either.
        assert!(!sm.transition_to(ServiceState::Restarting, None));
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut sm = StateMachine::new("server");
        assert!(sm.transition_to(ServiceState::Stopped, None));
        assert!(sm.history().is_empty());
    }

    #[test]
    fn test_live_states() {
        assert!(ServiceState::Running.is_live());
        assert!(ServiceState::Starting.is_live());
        assert!(!ServiceState::Failed.is_live());
        assert!(!ServiceState::Restarting.is_live());
        assert!(!ServiceState::Stopped.is_live());
    }
}
