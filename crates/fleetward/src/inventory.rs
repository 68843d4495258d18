//! Static inventory from the config file
//!
//! Stands in for a cloud provider: hosts are declared up front, `provision`
//! hands out declared hosts of a server type and `release` only logs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fleetward_core::{HostAddress, HostResolver, ProvisionError, Provisioner, ResolveError};
use tracing::info;

use crate::config::{Config, HostEntry};

pub struct StaticInventory {
    hosts: Vec<HostEntry>,
    server_types: BTreeMap<String, usize>,
}

impl StaticInventory {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hosts: config.host.clone(),
            server_types: config
                .server_types
                .iter()
                .map(|(name, server_type)| (name.clone(), server_type.count))
                .collect(),
        }
    }

    /// Configured count per server type, in name order
    pub fn server_types(&self) -> impl Iterator<Item = (&str, usize)> {
        self.server_types.iter().map(|(name, count)| (name.as_str(), *count))
    }

    fn entry(&self, host_id: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.id == host_id)
    }
}

#[async_trait]
impl HostResolver for StaticInventory {
    async fn resolve(&self, host_id: &str) -> Result<Option<HostAddress>, ResolveError> {
        let entry = self
            .entry(host_id)
            .ok_or_else(|| ResolveError::UnknownHost(host_id.to_string()))?;

        Ok(entry
            .address
            .as_ref()
            .map(|address| HostAddress::new(address, entry.port)))
    }
}

#[async_trait]
impl Provisioner for StaticInventory {
    async fn provision(
        &self,
        server_type: &str,
        count: usize,
    ) -> Result<Vec<String>, ProvisionError> {
        if !self.server_types.contains_key(server_type) {
            return Err(ProvisionError::UnknownServerType(server_type.to_string()));
        }

        let matching: Vec<String> = self
            .hosts
            .iter()
            .filter(|h| h.server_type.as_deref() == Some(server_type))
            .map(|h| h.id.clone())
            .collect();

        if matching.len() < count {
            return Err(ProvisionError::Insufficient {
                server_type: server_type.to_string(),
                requested: count,
                available: matching.len(),
            });
        }

        let selected: Vec<String> = matching.into_iter().take(count).collect();
        info!(server_type, hosts = ?selected, "provisioned hosts");
        Ok(selected)
    }

    async fn release(&self, host_ids: &[String]) -> Result<(), ProvisionError> {
        if let Some(unknown) = host_ids.iter().find(|id| self.entry(id).is_none()) {
            return Err(ProvisionError::UnknownHost(unknown.clone()));
        }

        for host_id in host_ids {
            info!(host = %host_id, "released host");
        }
        Ok(())
    }
}
