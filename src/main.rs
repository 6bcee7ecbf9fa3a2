//! # swarm-hive
//!
//! Runs one objective through a swarm with the simulated executor and an
//! in-memory knowledge store, then prints the run summary as JSON.
//!
//! Settings are resolved as defaults, then the config file, then
//! `SWARM_HIVE_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swarm_hive::config::{ConsensusMechanism, Strategy, Topology};
use swarm_hive::{HiveConfig, InMemoryKnowledgeStore, SimulatedExecutor, SwarmController};
use tracing::info;

/// Coordinate a swarm of agents toward an objective
#[derive(Parser)]
#[command(name = "swarm-hive")]
#[command(version, about, long_about = None)]
struct Cli {
    /// What the swarm should accomplish
    objective: String,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "SWARM_HIVE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// mesh, hierarchical, ring or star
    #[arg(long)]
    topology: Option<Topology>,

    /// quorum, unanimous, weighted or leader
    #[arg(long)]
    consensus: Option<ConsensusMechanism>,

    #[arg(long)]
    max_agents: Option<usize>,

    /// Execution deadline in minutes
    #[arg(long)]
    timeout: Option<u64>,

    /// Minimum passing quality, 0.0 to 1.0
    #[arg(long)]
    quality_threshold: Option<f64>,

    /// research, development, analysis or auto
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Run tasks one at a time
    #[arg(long)]
    sequential: bool,

    /// Success probability of the simulated executor
    #[arg(long, default_value_t = 0.9)]
    success_rate: f64,

    /// Simulated latency per task in milliseconds
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Seed for reproducible simulated outcomes
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, config: &mut HiveConfig) {
        if let Some(topology) = self.topology {
            config.topology = topology;
        }
        if let Some(consensus) = self.consensus {
            config.consensus = consensus;
        }
        if let Some(max_agents) = self.max_agents {
            config.max_agents = max_agents;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_minutes = timeout;
        }
        if let Some(threshold) = self.quality_threshold {
            config.quality_threshold = threshold;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.sequential {
            config.sequential = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = HiveConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let mut executor =
        SimulatedExecutor::new(cli.success_rate, Duration::from_millis(cli.latency_ms));
    if let Some(seed) = cli.seed {
        executor = executor.with_seed(seed);
    }

    info!("Starting swarm for objective: {}", cli.objective);
    let mut controller = SwarmController::new(
        config,
        Arc::new(executor),
        Arc::new(InMemoryKnowledgeStore::new()),
    );

    let summary = controller
        .run(&cli.objective)
        .await
        .context("Swarm run aborted")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
    );

    if !summary.passed {
        std::process::exit(2);
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
