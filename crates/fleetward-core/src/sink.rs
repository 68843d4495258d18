//! Report sink interface

use crate::aggregator::StatusSnapshot;
use crate::outcome::FleetResult;

/// Receives the final result of a run
///
/// Push-only: a sink that fails to render logs it and returns.
pub trait ReportSink: Send + Sync {
    fn publish(&self, fleet: &FleetResult, snapshot: &StatusSnapshot);
}
