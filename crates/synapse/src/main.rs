//! Process entry point. Loads layered configuration, initializes
//! structured logging, wires the core components together, and runs until
//! an interrupt signal, at which point it shuts down gracefully (spec §5
//! "Shutdown cancels all in-flight requests and flushes a shutdown
//! event").
//!
//! Deliberately thin: spec.md §1 calls CLI parsing "injected ... the core
//! treats them as opaque services", so this binary takes exactly the
//! bootstrap flags a process needs (a config file path) rather than
//! growing into the dashboards/report-rendering surface spec.md scopes
//! out.

use std::path::PathBuf;

use clap::Parser;
use synapse::AgencyCore;
use synapse_config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "synapse", about = "Multi-agent orchestration core: scheduler, LLM broker, bus, monitor")]
struct Args {
    /// Path to an optional TOML configuration file, layered over built-in
    /// defaults and `SYNAPSE__*` environment overrides.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;

    synapse_observability::init_logging(&synapse_observability::LoggingConfig::default())
        .unwrap_or_else(|err| eprintln!("logging already initialized: {err}"));

    tracing::info!("synapse core starting up");

    let core = AgencyCore::new(config);
    let tasks = core.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    core.shutdown(tasks).await;

    let stats = core.broker.stats();
    let snapshot = core.scheduler.snapshot();
    tracing::info!(
        broker_total = stats.total,
        broker_success_rate = stats.success_rate,
        scheduler_queued = snapshot.queued.len(),
        scheduler_running = snapshot.running.len(),
        "final state before exit"
    );

    Ok(())
}
