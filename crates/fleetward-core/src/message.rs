//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use std::time::Duration;

use kameo_macros::Reply;

use crate::commands::Phase;
use crate::error::FailureReason;
use crate::outcome::{ComplianceRecord, HostOutcome};
use crate::plan::DeploymentPlan;

// ============================================================================
// HostActor Messages
// ============================================================================

/// Deploy `app_version` and wait for the service to report healthy
#[derive(Debug, Clone)]
pub struct Deploy {
    pub app_version: String,
    /// Path probed after the stack is up
    pub health_check_path: String,
    pub health_check_timeout: Duration,
}

/// Run the hardening, app install and compliance phases
#[derive(Debug, Clone, Copy)]
pub struct Configure;

/// Get current host state
#[derive(Debug)]
pub struct GetState;

/// Result of one host run
#[derive(Debug, Clone, Reply)]
pub struct HostRunReport {
    pub outcome: HostOutcome,
    /// Set by configure runs that reached the compliance phase
    pub compliance: Option<ComplianceRecord>,
}

impl HostRunReport {
    /// Report for a host whose actor could not produce one
    #[must_use]
    pub fn internal_failure(host_id: impl Into<String>, phase: Phase, error: String) -> Self {
        Self {
            outcome: HostOutcome::failed_early(host_id, phase, FailureReason::Internal(error)),
            compliance: None,
        }
    }
}

// ============================================================================
// OrchestratorActor Messages
// ============================================================================

/// Run a deploy across the plan's hosts using the plan's strategy
#[derive(Debug)]
pub struct RunDeployment {
    pub plan: DeploymentPlan,
}

/// Configure the given hosts in bounded parallel batches
#[derive(Debug)]
pub struct RunConfiguration {
    pub host_ids: Vec<String>,
}
