//! Tracebank: trajectory memory for LLM agents
//!
//! Provides subcommands over a file-backed trajectory store:
//!
//! - `train`    -- Run episodes and keep the successful ones
//! - `run`      -- Run episodes without touching the memory
//! - `inspect`  -- List stored trajectories with their utility
//! - `curate`   -- Preview or apply a curation pass
//! - `remove`   -- Delete one trajectory

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tracebank::agent::Agent;
use tracebank::config::TracebankConfig;
use tracebank::env::{AnyEnv, ArithmeticEnv, HttpEnv};
use tracebank::model::{EmbeddingClient, LlmClient};
use tracebank::storage::FileStorage;
use tracebank::trajectory::{CurationManager, TrajectoryStore};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Tracebank: trajectory memory for LLM agents
#[derive(Parser)]
#[command(name = "tracebank", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the trajectory memory (overrides `storage.root`).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Which environment to use.
    #[arg(long, global = true, default_value = "arithmetic")]
    env: EnvChoice,

    /// Base URL of the environment server when `--env http`.
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    env_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum EnvChoice {
    Arithmetic,
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one episode per goal and store the successful ones.
    Train {
        #[arg(required = true)]
        goals: Vec<String>,
    },

    /// Run one episode per goal without storing anything.
    Run {
        #[arg(required = true)]
        goals: Vec<String>,
    },

    /// List stored trajectories with their curation metadata.
    Inspect,

    /// Remove low-utility trajectories.
    Curate {
        /// Only list what would be removed.
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove one trajectory and everything derived from it.
    Remove { id: String },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TracebankConfig::load_from_file(path)?,
        None => TracebankConfig::default(),
    };
    config.apply_env_keys();
    if let Some(dir) = &cli.data_dir {
        config.storage.root = dir.clone();
    }
    config.validate()?;

    match cli.command {
        Commands::Train { goals } => cmd_train(&config, &cli.env, &cli.env_url, &goals).await,
        Commands::Run { goals } => cmd_run(&config, &cli.env, &cli.env_url, &goals).await,
        Commands::Inspect => cmd_inspect(&config).await,
        Commands::Curate { dry_run } => cmd_curate(&config, dry_run).await,
        Commands::Remove { id } => cmd_remove(&config, &id).await,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_train(
    config: &TracebankConfig,
    env_choice: &EnvChoice,
    env_url: &str,
    goals: &[String],
) -> Result<()> {
    tracing::info!(goals = goals.len(), "Training on goals");

    let mut agent = build_agent(config)?;
    let outcomes = agent
        .train_batch(goals, || create_env(env_choice, env_url))
        .await?;

    for outcome in &outcomes {
        let status = match (outcome.trajectory.success, outcome.stored) {
            (true, true) => "stored",
            (true, false) => "rejected",
            (false, _) => "failed",
        };
        println!(
            "[{status}] {goal} ({steps} steps, id {id})",
            goal = outcome.trajectory.goal,
            steps = outcome.trajectory.steps.len(),
            id = outcome.trajectory.id,
        );
        for removed in &outcome.removed {
            println!("  curated away: {removed}");
        }
    }
    Ok(())
}

async fn cmd_run(
    config: &TracebankConfig,
    env_choice: &EnvChoice,
    env_url: &str,
    goals: &[String],
) -> Result<()> {
    tracing::info!(goals = goals.len(), "Running goals");

    let mut agent = build_agent(config)?;
    let trajectories = agent
        .run_batch(goals, || create_env(env_choice, env_url))
        .await?;

    for trajectory in &trajectories {
        let status = if trajectory.success { "success" } else { "failure" };
        println!(
            "[{status}] {goal} ({steps} steps)",
            goal = trajectory.goal,
            steps = trajectory.steps.len(),
        );
        if let Some(last) = trajectory.steps.last() {
            println!("  final action: {}", last.action);
        }
    }
    Ok(())
}

async fn cmd_inspect(config: &TracebankConfig) -> Result<()> {
    let store = open_store(config).await?;

    println!("Trajectory memory: {}", config.storage.root.display());
    println!("  Trajectories: {}", store.len());
    println!("  Step examples: {}", store.step_examples().len());
    println!();

    for trajectory in store.get_all() {
        println!("[{id}] {goal}", id = trajectory.id, goal = trajectory.goal);
        println!("    Steps: {}", trajectory.steps.len());
        if let Some(meta) = store.curation(&trajectory.id) {
            println!(
                "    Retrieved: {} (led to success {})",
                meta.times_retrieved, meta.times_led_to_success
            );
            println!("    Utility: {:.3}", meta.utility_score);
            println!(
                "    Created: {}",
                meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        println!();
    }
    Ok(())
}

async fn cmd_curate(config: &TracebankConfig, dry_run: bool) -> Result<()> {
    let mut store = open_store(config).await?;
    let manager = CurationManager::new(config.curation.clone());

    let candidates = manager.get_low_utility_trajectories(&store);
    if candidates.is_empty() {
        println!("Nothing to curate.");
        return Ok(());
    }
    for meta in &candidates {
        println!(
            "{id}: utility {utility:.3} after {times} retrievals",
            id = meta.trajectory_id,
            utility = meta.utility_score,
            times = meta.times_retrieved,
        );
    }

    if dry_run {
        println!("{} trajectories would be removed (dry run).", candidates.len());
        return Ok(());
    }
    let removed = manager.curate(&mut store).await?;
    println!("Removed {} trajectories.", removed.len());
    Ok(())
}

async fn cmd_remove(config: &TracebankConfig, id: &str) -> Result<()> {
    let mut store = open_store(config).await?;
    if store.remove(id).await? {
        println!("Removed {id}.");
    } else {
        println!("No trajectory with id {id}.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

async fn open_store(
    config: &TracebankConfig,
) -> Result<TrajectoryStore<FileStorage, EmbeddingClient>> {
    let mut store = TrajectoryStore::new(
        FileStorage::new(&config.storage.root),
        EmbeddingClient::from_config(&config.model)?,
        config.store.clone(),
    );
    store.load().await?;
    Ok(store)
}

fn build_agent(config: &TracebankConfig) -> Result<Agent<FileStorage, EmbeddingClient, LlmClient>> {
    let store = TrajectoryStore::new(
        FileStorage::new(&config.storage.root),
        EmbeddingClient::from_config(&config.model)?,
        config.store.clone(),
    );
    let backend = LlmClient::from_config(&config.model)?;
    Ok(Agent::new(store, backend, config).with_step_callback(|index, step| {
        tracing::debug!(step = index, action = %step.action, "step recorded");
    }))
}

fn create_env(choice: &EnvChoice, env_url: &str) -> AnyEnv {
    match choice {
        EnvChoice::Arithmetic => AnyEnv::Arithmetic(ArithmeticEnv::new()),
        EnvChoice::Http => AnyEnv::Http(HttpEnv::new(env_url)),
    }
}
