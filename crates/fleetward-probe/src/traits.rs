//! Probe traits and verdicts

use std::time::Duration;

use async_trait::async_trait;

/// Verdict of a health probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy {
        attempts: u32,
    },
    Unhealthy {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl Health {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy { .. })
    }
}

/// Verdict of a reachability probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable {
        attempts: u32,
    },
    Unreachable {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl Reachability {
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }
}

/// Polls a service endpoint until it reports healthy or `timeout` elapses
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn wait_healthy(&self, host: &str, path: &str, timeout: Duration) -> Health;
}

/// Polls a TCP port until it accepts connections or `timeout` elapses
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn wait_reachable(&self, host: &str, port: u16, timeout: Duration) -> Reachability;
}
