//! Interfaces to the inventory collaborators

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connectable endpoint of a host's remote shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAddress {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether the address points at this machine
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The id is not known to the inventory
    #[error("unknown host id: {0}")]
    UnknownHost(String),
}

/// Maps opaque host ids to addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// `Ok(None)` means the host exists but is not connectable yet
    async fn resolve(&self, host_id: &str) -> Result<Option<HostAddress>, ResolveError>;
}

#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    #[error("unknown server type: {0}")]
    UnknownServerType(String),

    #[error("only {available} of {requested} hosts available for {server_type}")]
    Insufficient {
        server_type: String,
        requested: usize,
        available: usize,
    },

    #[error("unknown host id: {0}")]
    UnknownHost(String),
}

/// Hands out host ids for orchestration and takes them back
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, server_type: &str, count: usize)
    -> Result<Vec<String>, ProvisionError>;

    async fn release(&self, host_ids: &[String]) -> Result<(), ProvisionError>;
}
