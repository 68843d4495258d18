//! Per-host outcomes and the fleet result map

use chrono::{DateTime, Utc};
use fleetward_exec::CommandResult;
use serde::{Deserialize, Serialize};

use crate::commands::Phase;
use crate::error::FailureReason;

/// Result of one host's run
///
/// For configure runs `phase` is the last phase attempted and
/// `command_results` holds the results of every batch in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOutcome {
    pub host_id: String,
    pub phase: Phase,
    pub succeeded: bool,
    pub failure: Option<FailureReason>,
    pub command_results: Vec<CommandResult>,
    pub timestamp: DateTime<Utc>,
}

impl HostOutcome {
    /// Outcome for a host that failed before any command ran
    #[must_use]
    pub fn failed_early(host_id: impl Into<String>, phase: Phase, reason: FailureReason) -> Self {
        Self {
            host_id: host_id.into(),
            phase,
            succeeded: false,
            failure: Some(reason),
            command_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed_commands(&self) -> usize {
        self.command_results.iter().filter(|r| !r.success).count()
    }
}

/// Compliance audit result for one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub host_id: String,
    pub passed: bool,
    pub checks: Vec<CommandResult>,
    pub timestamp: DateTime<Utc>,
}

/// One row of a fleet result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetEntry {
    pub host_id: String,
    pub succeeded: bool,
}

/// Per-host success map of one run, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetResult {
    entries: Vec<FleetEntry>,
}

impl FleetResult {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Record a host; recording the same host again replaces its value
    pub fn insert(&mut self, host_id: impl Into<String>, succeeded: bool) {
        let host_id = host_id.into();
        match self.entries.iter_mut().find(|e| e.host_id == host_id) {
            Some(entry) => entry.succeeded = succeeded,
            None => self.entries.push(FleetEntry { host_id, succeeded }),
        }
    }

    #[must_use]
    pub fn get(&self, host_id: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.host_id == host_id)
            .map(|e| e.succeeded)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FleetEntry> {
        self.entries.iter()
    }

    pub fn host_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.host_id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.succeeded).count()
    }

    /// Hosts recorded as failed, in plan order
    #[must_use]
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.succeeded)
            .map(|e| e.host_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_result_keeps_order_and_replaces() {
        let mut fleet = FleetResult::default();
        fleet.insert("web-2", true);
        fleet.insert("web-1", false);
        fleet.insert("web-2", false);

        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.host_ids().collect::<Vec<_>>(), vec!["web-2", "web-1"]);
        assert_eq!(fleet.get("web-2"), Some(false));
        assert_eq!(fleet.failed_hosts(), vec!["web-2", "web-1"]);
        assert!(!fleet.all_succeeded());
    }
}
