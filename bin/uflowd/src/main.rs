//! ---
//! uflow_section: "01-core-functionality"
//! uflow_subsection: "binary"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Binary entrypoint for the UserFlow daemon."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use uflow_common::config::{AppConfig, FetchStrategy};
use uflow_common::logging::init_tracing;
use uflow_directory::StubDirectory;
use uflow_orchestrator::{new_registry, FetchMetrics, FetchOrchestrator, OrchestratorSettings};
use uflow_state::FetchPhase;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "UserFlow daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the configured fetch strategy")]
    strategy: Option<CliStrategy>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    Sequential,
    Concurrent,
}

impl From<CliStrategy> for FetchStrategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Sequential => FetchStrategy::Sequential,
            CliStrategy::Concurrent => FetchStrategy::Concurrent,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run a single fetch and print the outcome")]
    Run,
    #[command(about = "Time both strategies against the same directory profile")]
    Compare,
    #[command(about = "Re-fetch on an interval until interrupted")]
    Watch {
        #[arg(long, default_value_t = 3000, help = "Interval between fetches in milliseconds")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(strategy) = cli.strategy {
        config.orchestrator.strategy = strategy.into();
    }
    init_tracing("uflowd", &config.logging)?;
    info!(config_path = %loaded.source.display(), strategy = %config.orchestrator.strategy, "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_once(&config).await,
        Commands::Compare => compare(&config).await,
        Commands::Watch { interval_ms } => watch(&config, Duration::from_millis(interval_ms)).await,
    }
}

async fn run_once(config: &AppConfig) -> Result<()> {
    let registry = new_registry();
    let metrics = FetchMetrics::new(registry)?;
    let directory = Arc::new(StubDirectory::from_config(&config.directory));
    let settings = OrchestratorSettings::from_config(config);
    let orchestrator = FetchOrchestrator::new(directory, settings).with_metrics(metrics);

    let started = Instant::now();
    let generation = orchestrator.start_fetch();
    let snapshot = orchestrator.settled(generation).await;
    let elapsed = started.elapsed();

    match &snapshot.phase {
        FetchPhase::Success(record) => {
            info!(user = %record.id, elapsed_ms = elapsed.as_millis() as u64, "fetch settled");
            println!(
                "user {} ({}), age {}, premium: {}",
                record.name, record.id, record.age, record.is_premium
            );
            println!(
                "fetched in {:.2?} using the {} strategy",
                elapsed,
                orchestrator.strategy()
            );
        }
        FetchPhase::Failed(error) => {
            warn!(stage = %error.stage, attempts = error.attempts, "fetch failed");
            println!(
                "fetch failed at the {} stage after {} attempt(s): {}",
                error.stage, error.attempts, error.source
            );
        }
        _ => {}
    }
    Ok(())
}

async fn watch(config: &AppConfig, interval: Duration) -> Result<()> {
    let registry = new_registry();
    let metrics = FetchMetrics::new(registry)?;
    let directory = Arc::new(StubDirectory::from_config(&config.directory));
    let settings = OrchestratorSettings::from_config(config);
    let orchestrator = FetchOrchestrator::new(directory, settings).with_metrics(metrics);
    let mut events = orchestrator.events();
    let mut ticker = tokio::time::interval(interval);

    info!(interval_ms = interval.as_millis() as u64, "watch mode running; ctrl-c to stop");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("ctrl-c received; shutting down");
                break;
            }
            _ = ticker.tick() => {
                // An interval shorter than the fetch latency supersedes the
                // in-flight run; the event feed makes that visible.
                orchestrator.start_fetch();
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    info!(generation = event.generation(), event = ?event, "lifecycle event");
                }
            }
        }
    }
    orchestrator.shutdown().await;
    Ok(())
}

async fn compare(config: &AppConfig) -> Result<()> {
    for strategy in [FetchStrategy::Sequential, FetchStrategy::Concurrent] {
        let directory = Arc::new(StubDirectory::from_config(&config.directory));
        let settings = OrchestratorSettings::from_config(config).with_strategy(strategy);
        let orchestrator = FetchOrchestrator::new(directory, settings);

        let started = Instant::now();
        let generation = orchestrator.start_fetch();
        let snapshot = orchestrator.settled(generation).await;
        let elapsed = started.elapsed();

        match &snapshot.phase {
            FetchPhase::Success(_) => {
                info!(strategy = %strategy, elapsed_ms = elapsed.as_millis() as u64, "strategy timed");
                println!("{:>10}: {:.2?}", strategy.as_str(), elapsed);
            }
            FetchPhase::Failed(error) => {
                println!("{:>10}: failed at the {} stage", strategy.as_str(), error.stage);
            }
            _ => {}
        }
    }
    Ok(())
}
