use std::path::PathBuf;
#[cfg(feature = "api")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "api")]
use chrono::Utc;
use clap::Parser;
use pulsewatch::alerts::AlertStore;
use pulsewatch::broadcaster::Broadcaster;
use pulsewatch::bus::EventBus;
use pulsewatch::config::load_all;
use pulsewatch::engine::ProbeEngine;
use pulsewatch::evaluator::PulseEvaluator;
use pulsewatch::logstore::LogStore;
use pulsewatch::probe::ProbeStrategyRegistry;
use pulsewatch::scheduler::SchedulerHandle;
use pulsewatch::state::ServiceStateMachine;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Directory containing services.json, thresholds.json, config.json.
    #[arg(long, default_value = "./config")]
    config_dir: PathBuf,

    /// Overrides config.json's monitoring.logPath when set.
    #[arg(long)]
    log_dir: Option<String>,

    /// Overrides config.json's server.port when set.
    #[arg(long)]
    port: Option<u16>,

    /// Passed to the tracing filter.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(error = ?err, "startup failed");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (descriptors, thresholds, server_settings) =
        load_all(&args.config_dir, args.port, args.log_dir)?;

    let log_store = LogStore::new(
        server_settings.log_path.as_str(),
        server_settings.history_retention_hours,
    )?;

    let bus = EventBus::new();
    let evaluator = PulseEvaluator::new(thresholds);
    let registry = ProbeStrategyRegistry::with_defaults();
    let client = reqwest::Client::new();
    let engine = ProbeEngine::new(bus.clone(), registry, evaluator.clone(), client);

    let state_machine = ServiceStateMachine::new(bus.clone(), evaluator.clone(), &descriptors);
    state_machine.wire();

    log_store.wire(&bus);
    let _rotation_task = log_store.clone().spawn_rotation();

    let alert_store = AlertStore::new(bus.clone());
    alert_store.wire();

    let broadcaster = Broadcaster::new(bus.clone());
    broadcaster.wire();

    let scheduler = SchedulerHandle::spawn(descriptors.clone(), engine.clone(), bus.clone());
    scheduler.start().await;
    info!(services = descriptors.len(), "scheduler started");

    #[cfg(feature = "api")]
    {
        use pulsewatch::api::{spawn_api_server, ApiState};

        let api_state = ApiState {
            bus: bus.clone(),
            scheduler: scheduler.clone(),
            state_machine: state_machine.clone(),
            evaluator: evaluator.clone(),
            log_store: log_store.clone(),
            alert_store: alert_store.clone(),
            broadcaster: broadcaster.clone(),
            descriptors: Arc::new(Mutex::new(descriptors.clone())),
            config_dir: args.config_dir.clone(),
            audio_enabled: server_settings.audio_enabled,
            started_at: Utc::now(),
        };

        let addr = spawn_api_server(server_settings.port, api_state).await?;
        info!(%addr, "read api listening");
    }

    info!("press Ctrl+C to shut down gracefully");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to listen for shutdown signal");
    }

    info!("shutting down scheduler");
    scheduler.stop().await;

    info!("pulsewatch-hub exiting");
    Ok(())
}
