//! Report sinks for the final run status

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fleetward_core::{FleetResult, HostStatusEntry, ReportSink, StatusSnapshot};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{error, info};

/// Table row for one host
#[derive(Debug, Tabled)]
struct StatusRow {
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "STATUS")]
    status: &'static str,
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "COMPLIANCE")]
    compliance: &'static str,
    #[tabled(rename = "TIMESTAMP")]
    timestamp: String,
    #[tabled(rename = "FAILURE")]
    failure: String,
}

impl From<&HostStatusEntry> for StatusRow {
    fn from(entry: &HostStatusEntry) -> Self {
        Self {
            host: entry.host_id.clone(),
            status: match entry.succeeded {
                Some(true) => "SUCCESS",
                Some(false) => "FAILED",
                None => "N/A",
            },
            phase: entry
                .phase
                .map_or_else(|| "-".to_string(), |p| p.to_string()),
            compliance: match entry.compliance {
                Some(true) => "PASS",
                Some(false) => "FAIL",
                None => "N/A",
            },
            timestamp: entry
                .timestamp
                .map_or_else(|| "N/A".to_string(), |t| t.to_rfc3339()),
            failure: entry.failure.clone().unwrap_or_default(),
        }
    }
}

/// Status table on stdout
#[derive(Debug, Default)]
pub struct ConsoleReport;

impl ConsoleReport {
    fn render(fleet: &FleetResult, snapshot: &StatusSnapshot) -> String {
        let rule = "=".repeat(60);
        let header = format!("{rule}\nDEPLOYMENT STATUS REPORT\n{rule}\n");

        if snapshot.hosts.is_empty() {
            return format!("{header}No deployment data available\n");
        }

        let rows: Vec<StatusRow> = snapshot.hosts.iter().map(StatusRow::from).collect();
        format!(
            "{header}{}\n\n{}/{} hosts succeeded\n",
            Table::new(rows),
            fleet.succeeded_count(),
            fleet.len()
        )
    }
}

impl ReportSink for ConsoleReport {
    fn publish(&self, fleet: &FleetResult, snapshot: &StatusSnapshot) {
        print!("{}", Self::render(fleet, snapshot));
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    generated_at: DateTime<Utc>,
    fleet: &'a FleetResult,
    status: &'a StatusSnapshot,
}

/// Timestamped JSON file in a directory
#[derive(Debug)]
pub struct JsonReport {
    dir: PathBuf,
}

impl JsonReport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, fleet: &FleetResult, snapshot: &StatusSnapshot) -> eyre::Result<PathBuf> {
        let generated_at = Utc::now();
        let path = report_path(&self.dir, generated_at);
        let document = JsonDocument {
            generated_at,
            fleet,
            status: snapshot,
        };

        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        Ok(path)
    }
}

fn report_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "deployment_report_{}.json",
        at.format("%Y%m%d_%H%M%S")
    ))
}

impl ReportSink for JsonReport {
    fn publish(&self, fleet: &FleetResult, snapshot: &StatusSnapshot) {
        match self.write(fleet, snapshot) {
            Ok(path) => info!(path = %path.display(), "JSON report saved"),
            Err(e) => error!(dir = %self.dir.display(), error = %e, "failed to write JSON report"),
        }
    }
}
