//! fleetward-core: Deployment orchestration engine
//!
//! Implements the `OrchestratorActor` and `HostActor` using kameo framework.
//! Holds the per-host state machine, fleet strategies, command specs and the
//! status aggregator.

pub mod actor;
pub mod aggregator;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod outcome;
pub mod pacer;
pub mod plan;
pub mod resolver;
pub mod sink;
pub mod state;

pub use actor::host::{HostActor, HostActorArgs, HostServices};
pub use actor::orchestrator::{HostActorFactory, OrchestratorActor, OrchestratorActorArgs};
pub use aggregator::{HostStatusEntry, StatusAggregator, StatusSnapshot};
pub use commands::{CommandSpec, Phase};
pub use config::{DeploySettings, Strategy};
pub use error::{CoreError, FailureReason};
pub use event::FleetEvent;
pub use message::{Configure, Deploy, GetState, HostRunReport, RunConfiguration, RunDeployment};
pub use outcome::{ComplianceRecord, FleetResult, HostOutcome};
pub use pacer::{Pacer, TokioPacer};
pub use plan::DeploymentPlan;
pub use resolver::{HostAddress, HostResolver, ProvisionError, Provisioner, ResolveError};
pub use sink::ReportSink;
pub use state::HostState;
