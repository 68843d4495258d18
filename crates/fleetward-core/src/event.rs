//! Progress events broadcast during a run

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetEvent {
    RunStarted {
        action: String,
        strategy: String,
        total_hosts: usize,
    },
    HostStateChanged {
        host: String,
        from: String,
        to: String,
    },
    HostFinished {
        host: String,
        succeeded: bool,
        reason: Option<String>,
    },
    InterHostPause {
        after_host: String,
        delay_secs: u64,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
    },
}
