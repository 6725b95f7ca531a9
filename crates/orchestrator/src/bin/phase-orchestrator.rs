//! phase-orchestrator: advances jobs through the matching pipeline as worker
//! completion events arrive on the bus.
//!
//! # Usage
//!
//! ```bash
//! # Default profile, broker on localhost
//! phase-orchestrator
//!
//! # Production profile with explicit broker endpoints
//! MATCHFLOW_PROFILE=PROD phase-orchestrator --bus-frontend tcp://broker:5555 --bus-backend tcp://broker:5556
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use matchflow_bus::{Transport, WorkerBuilder, WorkerRunner, ZmqPublisher, ZmqSubscriber};
use matchflow_core::config::{load_dotenv, Config};
use matchflow_orchestrator::db::init_pg_pool;
use matchflow_orchestrator::{Engine, EventConsumer, PgPhaseStore, SchemaRegistry};

/// Job phase orchestrator for the matching pipeline.
#[derive(Parser, Debug)]
#[command(name = "phase-orchestrator", version, about)]
struct Cli {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    /// Defaults to `MATCHFLOW_PROFILE`.
    #[arg(long)]
    profile: Option<String>,

    /// Broker frontend endpoint (publishers connect here). Overrides BUS_FRONTEND.
    #[arg(long)]
    bus_frontend: Option<String>,

    /// Broker backend endpoint (subscribers connect here). Overrides BUS_BACKEND.
    #[arg(long)]
    bus_backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    tracing::info!(?cli, "starting phase-orchestrator");

    let mut config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(frontend) = cli.bus_frontend {
        config.bus.frontend = frontend;
    }
    if let Some(backend) = cli.bus_backend {
        config.bus.backend = backend;
    }
    config.log_summary();

    let pool = init_pg_pool(&config.postgres).await?;
    let store = Arc::new(PgPhaseStore::new(pool));

    let publisher = Arc::new(ZmqPublisher::connect(&Transport::parse(&config.bus.frontend)?).await?);
    let subscriber = Arc::new(ZmqSubscriber::connect(&Transport::parse(&config.bus.backend)?).await?);

    let settings = &config.orchestrator;
    let engine = Arc::new(Engine::new(
        SchemaRegistry::builtin(),
        store,
        publisher.clone(),
        settings.dedup_cache_capacity,
    ));
    let consumer = Arc::new(EventConsumer::new(
        settings.worker_name.clone(),
        engine,
        subscriber,
        settings.max_in_flight,
    ));

    let runner_config = WorkerBuilder::new(settings.worker_name.clone())
        .health_interval(Duration::from_secs(settings.health_interval_secs))
        .shutdown_timeout(Duration::from_secs(settings.shutdown_timeout_secs))
        .build();
    WorkerRunner::run(consumer, publisher, runner_config, None).await?;

    tracing::info!("phase-orchestrator exited cleanly");
    Ok(())
}
