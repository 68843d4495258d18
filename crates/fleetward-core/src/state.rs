//! Host state machine types

use std::fmt;

use kameo_macros::Reply;
use serde::{Deserialize, Serialize};

/// States of one host within a run
///
/// Deploy: `Pending -> WaitReachable -> Deploying -> HealthCheck -> Succeeded | Failed`.
/// Configure: `Pending -> WaitReachable -> Configuring -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Reply)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Pending,
    WaitReachable,
    Configuring,
    Deploying,
    HealthCheck,
    Succeeded,
    Failed,
}

impl HostState {
    /// Whether the host finished its run
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, HostState::Succeeded | HostState::Failed)
    }

    /// Check whether `next` is a legal successor of this state
    #[must_use]
    pub fn can_transition_to(self, next: HostState) -> bool {
        use HostState::{
            Configuring, Deploying, Failed, HealthCheck, Pending, Succeeded, WaitReachable,
        };

        match (self, next) {
            (Pending, WaitReachable)
            | (WaitReachable, Deploying | Configuring)
            | (Deploying, HealthCheck)
            | (HealthCheck | Configuring, Succeeded)
            | (Succeeded | Failed, Pending) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostState::Pending => "pending",
            HostState::WaitReachable => "wait_reachable",
            HostState::Configuring => "configuring",
            HostState::Deploying => "deploying",
            HostState::HealthCheck => "health_check",
            HostState::Succeeded => "succeeded",
            HostState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::HostState::*;

    #[test]
    fn test_deploy_path_is_legal() {
        let path = [Pending, WaitReachable, Deploying, HealthCheck, Succeeded];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_configure_path_is_legal() {
        assert!(WaitReachable.can_transition_to(Configuring));
        assert!(Configuring.can_transition_to(Succeeded));
    }

    #[test]
    fn test_failure_from_any_active_state() {
        for state in [Pending, WaitReachable, Configuring, Deploying, HealthCheck] {
            assert!(state.can_transition_to(Failed));
        }
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(!Pending.can_transition_to(Deploying));
        assert!(!WaitReachable.can_transition_to(HealthCheck));
        assert!(!Deploying.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Deploying));
    }

    #[test]
    fn test_terminal_states_can_restart() {
        assert!(Succeeded.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.is_terminal());
        assert!(!HealthCheck.is_terminal());
    }
}
