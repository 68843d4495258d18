//! Core error types for fleetward-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::HostState;

/// Errors that abort a whole run or signal a broken invariant
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// The plan failed validation; no host was touched
    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    /// Invalid state transition attempted
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: HostState,
        /// Attempted target state
        to: HostState,
    },

    /// No executor could be built for a resolved host
    #[error("executor unavailable: {0}")]
    Executor(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Why a host ended in `Failed`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Never resolved or never accepted connections on its SSH port in time
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The resolver rejected the host id
    #[error("unresolvable: {0}")]
    Unresolvable(String),

    /// A remote-shell session could not be opened or dropped mid-batch
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Deployed, but the service never reported healthy
    #[error("health check timed out: {0}")]
    HealthCheckTimeout(String),

    /// The host actor itself failed
    #[error("internal error: {0}")]
    Internal(String),
}

impl FailureReason {
    /// Short machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Unreachable(_) => "unreachable",
            FailureReason::Unresolvable(_) => "unresolvable",
            FailureReason::ConnectionFailure(_) => "connection_failure",
            FailureReason::HealthCheckTimeout(_) => "health_check_timeout",
            FailureReason::Internal(_) => "internal",
        }
    }
}
