//! Status aggregation across runs
//!
//! Later records for a host replace earlier ones of the same kind. Hosts
//! keep the position of their first record for display.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::commands::Phase;
use crate::outcome::{ComplianceRecord, HostOutcome};

/// Accumulates host outcomes and compliance records
#[derive(Debug, Default)]
pub struct StatusAggregator {
    inner: RwLock<AggregatorState>,
}

#[derive(Debug, Default)]
struct AggregatorState {
    order: Vec<String>,
    outcomes: HashMap<String, HostOutcome>,
    compliance: HashMap<String, ComplianceRecord>,
}

impl AggregatorState {
    fn track(&mut self, host_id: &str) {
        if !self.outcomes.contains_key(host_id) && !self.compliance.contains_key(host_id) {
            self.order.push(host_id.to_string());
        }
    }
}

impl StatusAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a host outcome
    pub async fn record_outcome(&self, outcome: HostOutcome) {
        let mut state = self.inner.write().await;
        state.track(&outcome.host_id);
        debug!(host = %outcome.host_id, succeeded = outcome.succeeded, "recorded host outcome");
        state.outcomes.insert(outcome.host_id.clone(), outcome);
    }

    pub async fn record_compliance(&self, record: ComplianceRecord) {
        let mut state = self.inner.write().await;
        state.track(&record.host_id);
        debug!(host = %record.host_id, passed = record.passed, "recorded compliance result");
        state.compliance.insert(record.host_id.clone(), record);
    }

    /// Latest outcome for a host
    pub async fn outcome(&self, host_id: &str) -> Option<HostOutcome> {
        self.inner.read().await.outcomes.get(host_id).cloned()
    }

    /// Latest compliance record for a host
    pub async fn compliance(&self, host_id: &str) -> Option<ComplianceRecord> {
        self.inner.read().await.compliance.get(host_id).cloned()
    }

    /// Read-only copy for reporting
    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.inner.read().await;

        let hosts = state
            .order
            .iter()
            .map(|host_id| {
                let outcome = state.outcomes.get(host_id);
                HostStatusEntry {
                    host_id: host_id.clone(),
                    phase: outcome.map(|o| o.phase),
                    succeeded: outcome.map(|o| o.succeeded),
                    failure: outcome
                        .and_then(|o| o.failure.as_ref())
                        .map(ToString::to_string),
                    failure_code: outcome
                        .and_then(|o| o.failure.as_ref())
                        .map(|f| f.code().to_string()),
                    commands_run: outcome.map_or(0, |o| o.command_results.len()),
                    commands_failed: outcome.map_or(0, HostOutcome::failed_commands),
                    timestamp: outcome.map(|o| o.timestamp),
                    compliance: state.compliance.get(host_id).map(|c| c.passed),
                }
            })
            .collect();

        StatusSnapshot {
            total_hosts: state.order.len(),
            hosts,
        }
    }
}

/// Per-host row of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatusEntry {
    pub host_id: String,
    pub phase: Option<Phase>,
    /// `None` when only a compliance record exists
    pub succeeded: Option<bool>,
    pub failure: Option<String>,
    /// Machine-readable form of `failure`
    pub failure_code: Option<String>,
    pub commands_run: usize,
    pub commands_failed: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub compliance: Option<bool>,
}

/// Point-in-time view of all recorded hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub total_hosts: usize,
    pub hosts: Vec<HostStatusEntry>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn host(&self, host_id: &str) -> Option<&HostStatusEntry> {
        self.hosts.iter().find(|h| h.host_id == host_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fleetward_exec::CommandResult;

    use super::*;
    use crate::error::FailureReason;

    fn outcome(host_id: &str, succeeded: bool) -> HostOutcome {
        HostOutcome {
            host_id: host_id.to_string(),
            phase: Phase::Deploy,
            succeeded,
            failure: (!succeeded).then(|| FailureReason::HealthCheckTimeout("503".to_string())),
            command_results: vec![
                CommandResult::completed("git pull", 0, "", "", Duration::ZERO),
                CommandResult::completed("docker-compose up -d", 1, "", "boom", Duration::ZERO),
            ],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let aggregator = StatusAggregator::new();
        aggregator.record_outcome(outcome("web-1", false)).await;
        aggregator.record_outcome(outcome("web-1", true)).await;

        let snapshot = aggregator.snapshot().await;

        assert_eq!(snapshot.total_hosts, 1);
        let entry = snapshot.host("web-1").unwrap();
        assert_eq!(entry.succeeded, Some(true));
        assert_eq!(entry.failure, None);
        assert_eq!(entry.commands_run, 2);
        assert_eq!(entry.commands_failed, 1);
    }

    #[tokio::test]
    async fn test_insertion_order_and_compliance_join() {
        let aggregator = StatusAggregator::new();
        aggregator.record_outcome(outcome("web-2", true)).await;
        aggregator
            .record_compliance(ComplianceRecord {
                host_id: "db-1".to_string(),
                passed: false,
                checks: Vec::new(),
                timestamp: Utc::now(),
            })
            .await;
        aggregator.record_outcome(outcome("web-1", false)).await;
        aggregator
            .record_compliance(ComplianceRecord {
                host_id: "web-2".to_string(),
                passed: true,
                checks: Vec::new(),
                timestamp: Utc::now(),
            })
            .await;

        let snapshot = aggregator.snapshot().await;
        let order: Vec<_> = snapshot.hosts.iter().map(|h| h.host_id.as_str()).collect();

        assert_eq!(order, vec!["web-2", "db-1", "web-1"]);
        assert_eq!(snapshot.host("web-2").unwrap().compliance, Some(true));
        assert_eq!(snapshot.host("db-1").unwrap().succeeded, None);
        assert_eq!(
            snapshot.host("web-1").unwrap().failure.as_deref(),
            Some("health check timed out: 503")
        );
        assert_eq!(
            snapshot.host("web-1").unwrap().failure_code.as_deref(),
            Some("health_check_timeout")
        );
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let aggregator = StatusAggregator::new();
        aggregator.record_outcome(outcome("web-1", true)).await;

        let json = serde_json::to_value(aggregator.snapshot().await).unwrap();

        assert_eq!(json["total_hosts"], 1);
        assert_eq!(json["hosts"][0]["phase"], "deploy");
    }
}
