//! Process supervision for the orchestrator.
//!
//! A single [`Supervisor`] exclusively owns the registry of managed
//! processes. Its monitoring loop runs on a fixed interval; each tick reaps
//! dead children, schedules restarts according to policy, and promotes
//! restarted processes once they survive their startup grace period. A
//! [`CancellationToken`](tokio_util::sync::CancellationToken) is the single
//! shutdown trigger: the signal handler only cancels the token, and the loop
//! itself performs synchronous, ordered teardown.

mod state;
mod supervisor;

pub use state::{ServiceState, StateMachine, StateTransition};
pub use supervisor::{
    ProcessSnapshot, RestartPolicy, RestartStrategy, Supervisor, SupervisorOptions,
};
