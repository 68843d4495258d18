//! Actor implementations

pub mod host;
pub mod orchestrator;

pub use host::{HostActor, HostActorArgs, HostServices};
pub use orchestrator::{HostActorFactory, OrchestratorActor, OrchestratorActorArgs};
