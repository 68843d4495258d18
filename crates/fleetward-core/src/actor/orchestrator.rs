//! `OrchestratorActor`: Fleet-wide orchestration
//!
//! Runs one `HostActor` per host according to the run's strategy and records
//! every host outcome in the status aggregator.

use std::sync::Arc;
use std::time::Duration;

use fleetward_exec::RemoteExecutor;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::actor::host::{HostActor, HostActorArgs, HostServices};
use crate::aggregator::StatusAggregator;
use crate::commands::Phase;
use crate::config::{DeploySettings, Strategy};
use crate::error::CoreError;
use crate::event::FleetEvent;
use crate::message::{Configure, Deploy, HostRunReport, RunConfiguration, RunDeployment};
use crate::outcome::FleetResult;
use crate::pacer::Pacer;
use crate::plan::validate_host_ids;
use crate::resolver::HostAddress;

/// Factory trait for creating `HostActor` dependencies
///
/// Called once per phase with the resolved address, so every batch gets a
/// fresh executor.
#[async_trait::async_trait]
pub trait HostActorFactory: Send + Sync {
    /// Create a remote executor for the given host
    async fn create_executor(
        &self,
        host_id: &str,
        address: &HostAddress,
    ) -> Result<Arc<dyn RemoteExecutor>, CoreError>;
}

/// Arguments for spawning an `OrchestratorActor`
pub struct OrchestratorActorArgs {
    pub settings: Arc<DeploySettings>,
    pub services: HostServices,
    /// Receives every host outcome
    pub aggregator: Arc<StatusAggregator>,
    /// Waits between hosts of a rolling run
    pub pacer: Arc<dyn Pacer>,
    pub event_tx: broadcast::Sender<FleetEvent>,
}

#[derive(Debug, Clone)]
enum HostJob {
    Deploy(Deploy),
    Configure,
}

impl HostJob {
    fn action(&self) -> &'static str {
        match self {
            HostJob::Deploy(_) => "deploy",
            HostJob::Configure => "configure",
        }
    }

    fn first_phase(&self) -> Phase {
        match self {
            HostJob::Deploy(_) => Phase::Deploy,
            HostJob::Configure => Phase::Hardening,
        }
    }
}

/// Spawns a short-lived `HostActor` per host run
#[derive(Clone)]
struct HostSpawner {
    settings: Arc<DeploySettings>,
    services: HostServices,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl HostSpawner {
    async fn run(&self, host_id: String, job: HostJob) -> HostRunReport {
        let actor_ref = HostActor::spawn(HostActorArgs {
            host_id: host_id.clone(),
            settings: Arc::clone(&self.settings),
            services: self.services.clone(),
            event_tx: self.event_tx.clone(),
        });

        let reply = match &job {
            HostJob::Deploy(msg) => actor_ref.ask(msg.clone()).await.map_err(|e| e.to_string()),
            HostJob::Configure => actor_ref.ask(Configure).await.map_err(|e| e.to_string()),
        };

        if let Err(e) = actor_ref.stop_gracefully().await {
            warn!(host = %host_id, error = %e, "failed to stop HostActor");
        }

        reply.unwrap_or_else(|e| {
            error!(host = %host_id, error = %e, "host run did not complete");
            HostRunReport::internal_failure(host_id, job.first_phase(), e)
        })
    }
}

/// Fleet orchestrator running host actors per strategy
pub struct OrchestratorActor {
    spawner: HostSpawner,
    max_parallel: usize,
    aggregator: Arc<StatusAggregator>,
    pacer: Arc<dyn Pacer>,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl OrchestratorActor {
    async fn record(&self, fleet: &mut FleetResult, report: HostRunReport) {
        let HostRunReport {
            outcome,
            compliance,
        } = report;

        fleet.insert(outcome.host_id.clone(), outcome.succeeded);
        let _ = self.event_tx.send(FleetEvent::HostFinished {
            host: outcome.host_id.clone(),
            succeeded: outcome.succeeded,
            reason: outcome.failure.as_ref().map(ToString::to_string),
        });

        if let Some(record) = compliance {
            self.aggregator.record_compliance(record).await;
        }
        self.aggregator.record_outcome(outcome).await;
    }

    /// One host at a time, pausing after every host but the last
    async fn run_rolling(
        &self,
        host_ids: &[String],
        job: &HostJob,
        inter_host_delay: Duration,
    ) -> FleetResult {
        let mut fleet = FleetResult::with_capacity(host_ids.len());

        for (index, host_id) in host_ids.iter().enumerate() {
            info!(host = %host_id, position = index + 1, total = host_ids.len(), "starting host");
            let report = self.spawner.run(host_id.clone(), job.clone()).await;
            self.record(&mut fleet, report).await;

            if index + 1 < host_ids.len() {
                info!(after = %host_id, delay = ?inter_host_delay, "pausing before next host");
                let _ = self.event_tx.send(FleetEvent::InterHostPause {
                    after_host: host_id.clone(),
                    delay_secs: inter_host_delay.as_secs(),
                });
                self.pacer.pause(inter_host_delay).await;
            }
        }

        fleet
    }

    /// Bounded parallel batches, recorded in plan order
    async fn run_simple(&self, host_ids: &[String], job: &HostJob) -> FleetResult {
        let mut fleet = FleetResult::with_capacity(host_ids.len());

        for batch in host_ids.chunks(self.max_parallel.max(1)) {
            let handles: Vec<_> = batch
                .iter()
                .map(|host_id| {
                    let spawner = self.spawner.clone();
                    let job = job.clone();
                    let id = host_id.clone();
                    let handle = tokio::spawn(async move { spawner.run(id, job).await });
                    (host_id, handle)
                })
                .collect();

            for (host_id, handle) in handles {
                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(host = %host_id, error = %e, "host task panicked");
                        HostRunReport::internal_failure(
                            host_id.as_str(),
                            job.first_phase(),
                            e.to_string(),
                        )
                    }
                };
                self.record(&mut fleet, report).await;
            }
        }

        fleet
    }

    fn announce(&self, job: &HostJob, strategy: Strategy, total_hosts: usize) {
        info!(action = job.action(), %strategy, total_hosts, "run starting");
        let _ = self.event_tx.send(FleetEvent::RunStarted {
            action: job.action().to_string(),
            strategy: strategy.to_string(),
            total_hosts,
        });
    }

    fn conclude(&self, fleet: &FleetResult) {
        let succeeded = fleet.succeeded_count();
        let failed = fleet.len() - succeeded;
        info!(succeeded, failed, "run finished");
        let _ = self.event_tx.send(FleetEvent::RunFinished { succeeded, failed });
    }
}

impl Actor for OrchestratorActor {
    type Args = OrchestratorActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            id = %actor_ref.id(),
            strategy = %args.settings.strategy,
            max_parallel = args.settings.max_parallel,
            "OrchestratorActor starting"
        );

        Ok(Self {
            max_parallel: args.settings.max_parallel,
            spawner: HostSpawner {
                settings: args.settings,
                services: args.services,
                event_tx: args.event_tx.clone(),
            },
            aggregator: args.aggregator,
            pacer: args.pacer,
            event_tx: args.event_tx,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "OrchestratorActor stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RunDeployment> for OrchestratorActor {
    type Reply = Result<FleetResult, CoreError>;

    async fn handle(
        &mut self,
        msg: RunDeployment,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let plan = msg.plan;
        validate_host_ids(plan.host_ids())?;

        let job = HostJob::Deploy(Deploy {
            app_version: plan.app_version().to_string(),
            health_check_path: plan.health_check_path().to_string(),
            health_check_timeout: plan.health_check_timeout(),
        });
        self.announce(&job, plan.strategy(), plan.host_ids().len());

        let fleet = match plan.strategy() {
            Strategy::Rolling => {
                self.run_rolling(plan.host_ids(), &job, plan.inter_host_delay())
                    .await
            }
            Strategy::Simple => self.run_simple(plan.host_ids(), &job).await,
            Strategy::BlueGreen => {
                warn!("blue-green has no separate pools, running with simple strategy");
                self.run_simple(plan.host_ids(), &job).await
            }
        };

        self.conclude(&fleet);
        Ok(fleet)
    }
}

impl Message<RunConfiguration> for OrchestratorActor {
    type Reply = Result<FleetResult, CoreError>;

    async fn handle(
        &mut self,
        msg: RunConfiguration,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        validate_host_ids(&msg.host_ids)?;

        let job = HostJob::Configure;
        self.announce(&job, Strategy::Simple, msg.host_ids.len());

        let fleet = self.run_simple(&msg.host_ids, &job).await;

        self.conclude(&fleet);
        Ok(fleet)
    }
}
