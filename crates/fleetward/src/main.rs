//! fleetward
//!
//! Provisions hosts from a static inventory, hardens and configures them, and
//! rolls application releases across the fleet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use eyre::{WrapErr, bail, eyre};
use fleetward_core::{
    DeploymentPlan, FleetEvent, FleetResult, HostServices, OrchestratorActor,
    OrchestratorActorArgs, Provisioner, ReportSink, RunConfiguration, RunDeployment,
    StatusAggregator, Strategy, TokioPacer,
};
use fleetward_probe::{HttpHealthProber, TcpReachability};
use kameo::actor::{ActorRef, Spawn};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod factory;
mod inventory;
mod report;

use config::Config;
use factory::DefaultHostFactory;
use inventory::StaticInventory;
use report::{ConsoleReport, JsonReport};

/// Per-attempt connect timeout of the SSH port probe
const REACHABILITY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "fleetward")]
#[command(about = "Fleet provisioning, configuration and rolling deployments", long_about = None)]
#[command(version)]
struct Cli {
    /// Action to perform
    #[arg(short, long, value_enum)]
    action: Action,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hosts to act on
    #[arg(long, num_args = 1..)]
    host_ids: Vec<String>,

    /// Application version (git ref) to deploy
    #[arg(long)]
    app_version: Option<String>,

    /// Server type to provision; all configured types when omitted
    #[arg(long)]
    server_type: Option<String>,

    /// Number of hosts to provision for `--server-type`
    #[arg(long)]
    count: Option<usize>,

    /// Override the configured deployment strategy
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Also write a JSON report into this directory
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    Provision,
    Configure,
    Deploy,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level.into());

    // stdout is reserved for reports
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Running orchestrator and the aggregator it reports into
struct Engine {
    orchestrator: ActorRef<OrchestratorActor>,
    aggregator: Arc<StatusAggregator>,
}

impl Engine {
    fn start(config: &Config, inventory: Arc<StaticInventory>) -> Result<Self> {
        let settings = Arc::new(config.deploy_settings());

        let health = HttpHealthProber::new(
            config.health.port,
            Duration::from_secs(config.health.interval_secs),
        )
        .wrap_err("cannot build HTTP client for health checks")?
        .with_attempt_timeout(Duration::from_secs(config.health.attempt_timeout_secs));
        let reachability =
            TcpReachability::new(settings.reachability_interval, REACHABILITY_CONNECT_TIMEOUT);

        let services = HostServices {
            resolver: inventory,
            factory: Arc::new(DefaultHostFactory::new(&config.ssh)),
            reachability: Arc::new(reachability),
            health: Arc::new(health),
        };

        let (event_tx, mut event_rx) = broadcast::channel::<FleetEvent>(1024);
        tokio::spawn(async move {
            while let Ok(event) = event_rx.recv().await {
                if let Ok(json) = serde_json::to_string(&event) {
                    debug!(event = %json, "fleet event");
                }
            }
        });

        let aggregator = Arc::new(StatusAggregator::new());
        let orchestrator = OrchestratorActor::spawn(OrchestratorActorArgs {
            settings,
            services,
            aggregator: Arc::clone(&aggregator),
            pacer: Arc::new(TokioPacer),
            event_tx,
        });

        Ok(Self {
            orchestrator,
            aggregator,
        })
    }

    async fn publish(&self, fleet: &FleetResult, report_json: Option<&PathBuf>) {
        let snapshot = self.aggregator.snapshot().await;

        let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(ConsoleReport)];
        if let Some(dir) = report_json {
            sinks.push(Box::new(JsonReport::new(dir)));
        }
        for sink in &sinks {
            sink.publish(fleet, &snapshot);
        }
    }

    async fn shutdown(self) {
        self.orchestrator.stop_gracefully().await.ok();
    }
}

fn require_hosts(cli: &Cli) -> Result<Vec<String>> {
    if cli.host_ids.is_empty() {
        bail!("--host-ids is required for {:?}", cli.action);
    }
    Ok(cli.host_ids.clone())
}

async fn provision(cli: &Cli, inventory: &StaticInventory) -> Result<bool> {
    let requests: Vec<(String, usize)> = match &cli.server_type {
        Some(server_type) => {
            let configured = inventory
                .server_types()
                .find(|(name, _)| *name == server_type.as_str())
                .map_or(1, |(_, count)| count);
            vec![(server_type.clone(), cli.count.unwrap_or(configured))]
        }
        None => inventory
            .server_types()
            .map(|(name, count)| (name.to_string(), count))
            .collect(),
    };

    let mut provisioned = Vec::new();
    for (server_type, count) in requests {
        let host_ids = inventory
            .provision(&server_type, count)
            .await
            .wrap_err_with(|| format!("cannot provision {server_type}"))?;
        provisioned.extend(host_ids);
    }

    for host_id in &provisioned {
        println!("{host_id}");
    }
    info!(count = provisioned.len(), "provisioned hosts");
    Ok(true)
}

async fn configure(cli: &Cli, engine: &Engine) -> Result<bool> {
    let host_ids = require_hosts(cli)?;

    let fleet = engine
        .orchestrator
        .ask(RunConfiguration { host_ids })
        .await
        .map_err(|e| eyre!("configuration run failed: {e}"))?;

    engine.publish(&fleet, cli.report_json.as_ref()).await;
    println!(
        "Configuration completed for {}/{} hosts",
        fleet.succeeded_count(),
        fleet.len()
    );
    Ok(fleet.all_succeeded())
}

async fn deploy(cli: &Cli, config: &Config, engine: &Engine) -> Result<bool> {
    let app_version = cli
        .app_version
        .as_deref()
        .ok_or_else(|| eyre!("--app-version is required for deploy"))?;
    let host_ids = require_hosts(cli)?;

    let mut plan = DeploymentPlan::new(host_ids, app_version, &config.deploy_settings())?;
    if let Some(strategy) = cli.strategy {
        plan = plan.with_strategy(strategy);
    }

    let fleet = engine
        .orchestrator
        .ask(RunDeployment { plan })
        .await
        .map_err(|e| eyre!("deployment run failed: {e}"))?;

    engine.publish(&fleet, cli.report_json.as_ref()).await;
    println!(
        "Deployment completed for {}/{} hosts",
        fleet.succeeded_count(),
        fleet.len()
    );
    Ok(fleet.all_succeeded())
}

async fn cleanup(cli: &Cli, inventory: &StaticInventory) -> Result<bool> {
    let host_ids = require_hosts(cli)?;
    inventory.release(&host_ids).await?;
    println!("Cleanup completed for {} hosts", host_ids.len());
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = Config::load_default(cli.config.as_deref())?;
    init_tracing(&config.log_level, cli.log_format);
    match &config.source {
        Some(path) => info!(path = %path.display(), hosts = config.host.len(), "loaded config"),
        None => warn!("no config file found, using defaults"),
    }

    let inventory = Arc::new(StaticInventory::from_config(&config));

    let succeeded = match cli.action {
        Action::Provision => provision(&cli, &inventory).await?,
        Action::Cleanup => cleanup(&cli, &inventory).await?,
        Action::Configure | Action::Deploy => {
            let engine = Engine::start(&config, Arc::clone(&inventory))?;
            let outcome = match cli.action {
                Action::Deploy => deploy(&cli, &config, &engine).await,
                _ => configure(&cli, &engine).await,
            };
            engine.shutdown().await;
            outcome?
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
