//! `HostActor`: Per-host orchestration
//!
//! Drives one host through the state machine of a deploy or configure run.
//! Failures end the host's run with a `FailureReason`; they are never
//! returned to the orchestrator as errors.

use std::sync::Arc;

use chrono::Utc;
use fleetward_exec::{BatchResult, CommandResult, execute_batch};
use fleetward_probe::{Health, HealthProbe, Reachability, ReachabilityProbe};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, error, info, warn};

use crate::actor::orchestrator::HostActorFactory;
use crate::commands::{CommandSpec, Phase};
use crate::config::DeploySettings;
use crate::error::{CoreError, FailureReason};
use crate::event::FleetEvent;
use crate::message::{Configure, Deploy, GetState, HostRunReport};
use crate::outcome::{ComplianceRecord, HostOutcome};
use crate::resolver::{HostAddress, HostResolver};
use crate::state::HostState;

/// Collaborators shared by every host of a run
#[derive(Clone)]
pub struct HostServices {
    pub resolver: Arc<dyn HostResolver>,
    pub factory: Arc<dyn HostActorFactory>,
    pub reachability: Arc<dyn ReachabilityProbe>,
    pub health: Arc<dyn HealthProbe>,
}

/// Arguments for spawning a `HostActor`
pub struct HostActorArgs {
    pub host_id: String,
    pub settings: Arc<DeploySettings>,
    pub services: HostServices,
    /// Progress events
    pub event_tx: broadcast::Sender<FleetEvent>,
}

/// Per-host actor managing state machine and operations
pub struct HostActor {
    host_id: String,
    state: HostState,
    settings: Arc<DeploySettings>,
    services: HostServices,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl HostActor {
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    #[must_use]
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Transition to a new state with validation and event emission
    fn transition_to(&mut self, new_state: HostState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(new_state) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;

        info!(
            host = %self.host_id,
            from = %old_state,
            to = %new_state,
            "state transition"
        );

        // no subscribers is fine
        let _ = self.event_tx.send(FleetEvent::HostStateChanged {
            host: self.host_id.clone(),
            from: old_state.to_string(),
            to: new_state.to_string(),
        });

        Ok(())
    }

    fn advance(&mut self, new_state: HostState) -> Result<(), FailureReason> {
        self.transition_to(new_state)
            .map_err(|e| FailureReason::Internal(e.to_string()))
    }

    /// Leave a finished run behind and enter `WaitReachable`
    fn start_run(&mut self) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            self.transition_to(HostState::Pending)?;
        }
        self.transition_to(HostState::WaitReachable)
    }

    /// Close the run in a terminal state and build its outcome
    fn finish(
        &mut self,
        phase: Phase,
        verdict: Result<(), FailureReason>,
        command_results: Vec<CommandResult>,
    ) -> HostOutcome {
        let verdict = verdict.and_then(|()| self.advance(HostState::Succeeded));

        let failure = match verdict {
            Ok(()) => None,
            Err(reason) => {
                let previous = self.state;
                if let Err(e) = self.transition_to(HostState::Failed) {
                    warn!(host = %self.host_id, error = %e, "forcing failed state");
                    self.state = HostState::Failed;
                }
                error!(
                    host = %self.host_id,
                    previous_state = %previous,
                    reason = %reason,
                    "host failed"
                );
                Some(reason)
            }
        };

        HostOutcome {
            host_id: self.host_id.clone(),
            phase,
            succeeded: failure.is_none(),
            failure,
            command_results,
            timestamp: Utc::now(),
        }
    }

    /// Resolve the host, then wait for its SSH port, under one deadline
    async fn wait_reachable(&self) -> Result<HostAddress, FailureReason> {
        let budget = self.settings.reachability_timeout;
        let interval = self.settings.reachability_interval;
        let deadline = Instant::now() + budget;

        let address = loop {
            let resolved = timeout_at(deadline, self.services.resolver.resolve(&self.host_id))
                .await
                .map_err(|_| {
                    FailureReason::Unreachable(format!(
                        "not resolved within {}s",
                        budget.as_secs()
                    ))
                })?;

            match resolved {
                Ok(Some(address)) => break address,
                Ok(None) => {
                    let next = Instant::now() + interval;
                    if next >= deadline {
                        return Err(FailureReason::Unreachable(format!(
                            "not resolved within {}s",
                            budget.as_secs()
                        )));
                    }
                    debug!(host = %self.host_id, "no address yet, retrying");
                    sleep_until(next).await;
                }
                Err(e) => return Err(FailureReason::Unresolvable(e.to_string())),
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self
            .services
            .reachability
            .wait_reachable(&address.host, address.port, remaining)
            .await
        {
            Reachability::Reachable { attempts } => {
                info!(host = %self.host_id, address = %address, attempts, "host reachable");
                Ok(address)
            }
            Reachability::Unreachable {
                attempts,
                last_error,
            } => Err(FailureReason::Unreachable(last_error.unwrap_or_else(|| {
                format!("{address} not accepting connections after {attempts} attempts")
            }))),
        }
    }

    /// Run one command spec on a fresh session
    async fn run_spec(&self, address: &HostAddress, spec: &CommandSpec) -> BatchResult {
        info!(host = %self.host_id, phase = %spec.phase, commands = spec.len(), "running phase");

        match self
            .services
            .factory
            .create_executor(&self.host_id, address)
            .await
        {
            Ok(executor) => {
                execute_batch(
                    executor.as_ref(),
                    &spec.commands,
                    self.settings.command_timeout,
                )
                .await
            }
            Err(e) => {
                let reason = e.to_string();
                error!(host = %self.host_id, error = %reason, "no executor for host");
                BatchResult {
                    results: spec
                        .commands
                        .iter()
                        .map(|cmd| CommandResult::failed(cmd, &reason))
                        .collect(),
                    connection_error: Some(reason),
                }
            }
        }
    }

    async fn deploy(
        &mut self,
        msg: &Deploy,
        results: &mut Vec<CommandResult>,
    ) -> Result<(), FailureReason> {
        let address = self.wait_reachable().await?;
        self.advance(HostState::Deploying)?;

        let spec = CommandSpec::deploy(&self.settings, &msg.app_version);
        let batch = self.run_spec(&address, &spec).await;
        if let Some(e) = &batch.connection_error {
            warn!(host = %self.host_id, error = %e, "deploy batch lost its session");
        }
        results.extend(batch.results);

        // the health probe decides, whatever the commands returned
        self.advance(HostState::HealthCheck)?;
        match self
            .services
            .health
            .wait_healthy(&address.host, &msg.health_check_path, msg.health_check_timeout)
            .await
        {
            Health::Healthy { attempts } => {
                info!(host = %self.host_id, attempts, "service healthy");
                Ok(())
            }
            Health::Unhealthy {
                attempts,
                last_error,
            } => Err(FailureReason::HealthCheckTimeout(last_error.unwrap_or_else(
                || format!("no healthy response after {attempts} attempts"),
            ))),
        }
    }

    async fn configure(
        &mut self,
        phase: &mut Phase,
        results: &mut Vec<CommandResult>,
        compliance: &mut Option<ComplianceRecord>,
    ) -> Result<(), FailureReason> {
        let address = self.wait_reachable().await?;
        self.advance(HostState::Configuring)?;

        let specs = [
            CommandSpec::hardening(),
            CommandSpec::app_install(&self.settings),
            CommandSpec::compliance(),
        ];

        let mut connection_error = None;
        for spec in &specs {
            *phase = spec.phase;
            let batch = self.run_spec(&address, spec).await;

            if spec.phase == Phase::Compliance {
                *compliance = Some(ComplianceRecord {
                    host_id: self.host_id.clone(),
                    passed: !batch.lost_connection() && batch.all_succeeded(),
                    checks: batch.results.clone(),
                    timestamp: Utc::now(),
                });
            }

            if let Some(e) = batch.connection_error {
                warn!(host = %self.host_id, phase = %spec.phase, error = %e, "phase lost its session");
                if connection_error.is_none() {
                    connection_error = Some(e);
                }
            }
            results.extend(batch.results);
        }

        match connection_error {
            Some(e) => Err(FailureReason::ConnectionFailure(e)),
            None => Ok(()),
        }
    }
}

impl Actor for HostActor {
    type Args = HostActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        debug!(host = %args.host_id, id = %actor_ref.id(), "HostActor starting");

        Ok(Self {
            host_id: args.host_id,
            state: HostState::Pending,
            settings: args.settings,
            services: args.services,
            event_tx: args.event_tx,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        debug!(
            host = %self.host_id,
            state = %self.state,
            reason = ?reason,
            "HostActor stopping"
        );
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Deploy> for HostActor {
    type Reply = Result<HostRunReport, CoreError>;

    async fn handle(&mut self, msg: Deploy, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.start_run()?;

        let mut results = Vec::new();
        let verdict = self.deploy(&msg, &mut results).await;

        Ok(HostRunReport {
            outcome: self.finish(Phase::Deploy, verdict, results),
            compliance: None,
        })
    }
}

impl Message<Configure> for HostActor {
    type Reply = Result<HostRunReport, CoreError>;

    async fn handle(
        &mut self,
        _msg: Configure,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.start_run()?;

        let mut phase = Phase::Hardening;
        let mut results = Vec::new();
        let mut compliance = None;
        let verdict = self
            .configure(&mut phase, &mut results, &mut compliance)
            .await;

        Ok(HostRunReport {
            outcome: self.finish(phase, verdict, results),
            compliance,
        })
    }
}

impl Message<GetState> for HostActor {
    type Reply = HostState;

    async fn handle(
        &mut self,
        _msg: GetState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.state
    }
}
