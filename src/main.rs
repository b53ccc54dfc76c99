//! # BotFleet — autonomous content-agent fleet
//!
//! Runs a fleet of bot agents that each post on a personality-influenced
//! cadence: a durable job queue with atomic claiming, per-agent cadence
//! scheduling, and an off-peak pre-generation buffer.
//!
//! Usage:
//!   botfleet run                      # Start all engine loops
//!   botfleet tick                     # One manual engine tick (for cron)
//!   botfleet fill-buffer              # One buffer fill pass (for cron)
//!   botfleet sweep                    # One buffer expiry sweep (for cron)
//!   botfleet agent add nova --name "Nova" --frequency 3 --profile night_owl
//!   botfleet stats                    # Queue / buffer / fleet counts

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use botfleet_agents::NewAgent;
use botfleet_core::rng::RandomSource;
use botfleet_core::types::RhythmProfile;
use botfleet_core::FleetConfig;
use botfleet_queue::JobType;
use botfleet_runtime::{DenylistModerator, FleetEngine, HttpGenerator, WeightedEffectSelector};

#[derive(Parser)]
#[command(name = "botfleet", version, about = "🛰️ BotFleet — autonomous content-agent fleet")]
struct Cli {
    /// Path to config file (default: ~/.botfleet/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the engine: pump, workers, buffer fill, and sweep loops
    Run {
        /// Concurrent worker loops claiming jobs
        #[arg(long, default_value = "2")]
        workers: usize,
    },
    /// Run one engine tick and exit (external cron drives the cadence)
    Tick {
        /// Max jobs to claim this tick
        #[arg(long)]
        max_jobs: Option<usize>,
    },
    /// Run one buffer fill pass and exit
    FillBuffer {
        /// Max agents to top up this pass
        #[arg(long)]
        max_agents: Option<usize>,
    },
    /// Run one buffer expiry sweep and exit
    Sweep,
    /// Manage fleet agents
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Show queue, buffer, and fleet counts
    Stats,
    /// List recent dead-lettered jobs
    DeadLetters {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Register a new agent and enqueue its onboarding
    Add {
        handle: String,
        /// Display name (defaults to the handle)
        #[arg(long)]
        name: Option<String>,
        /// Desired posts per day
        #[arg(long, default_value = "2.0")]
        frequency: f64,
        /// Rhythm profile: early_riser, night_owl, bursty, steady
        #[arg(long)]
        profile: Option<String>,
        /// Active window start hour (UTC)
        #[arg(long, default_value = "7")]
        window_start: u8,
        /// Active window end hour (UTC)
        #[arg(long, default_value = "23")]
        window_end: u8,
    },
    /// Enable scheduling for an agent
    Enable { handle: String },
    /// Disable scheduling for an agent
    Disable { handle: String },
    /// List all agents
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "botfleet=debug" } else { "botfleet=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => FleetConfig::load_from(std::path::Path::new(path))?,
        None => FleetConfig::load()?,
    };

    let rng = Arc::new(RandomSource::from_entropy());
    let engine = Arc::new(FleetEngine::new(
        config.clone(),
        Arc::new(HttpGenerator::new(&config.generation)),
        Arc::new(DenylistModerator::default()),
        Arc::new(WeightedEffectSelector::standard(rng.clone())),
        rng,
    )?);

    match cli.command {
        Command::Run { workers } => {
            println!("🛰️ BotFleet v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database:  {}", config.db_path);
            println!("   👷 Workers:   {workers}, tick every {}s", config.queue.tick_secs);
            println!("   🧺 Buffer:    cap {}, fill every {}s", config.buffer.per_agent_cap, config.buffer.fill_interval_secs);
            println!();

            tracing::info!("🚀 Engine loops starting");
            let handles = engine.clone().spawn_loops(workers);
            for handle in handles {
                handle.await.ok();
            }
        }
        Command::Tick { max_jobs } => {
            let max = max_jobs.unwrap_or(config.queue.claim_batch);
            let stats = engine.tick(max).await?;
            println!(
                "📦 Tick: {} claimed, {} ok, {} skipped, {} failed",
                stats.claimed, stats.succeeded, stats.skipped, stats.failed
            );
        }
        Command::FillBuffer { max_agents } => {
            let max = max_agents.unwrap_or(config.buffer.fill_agents_per_run);
            let stats = engine.fill_buffer(max).await?;
            println!(
                "🧺 Fill: {} filled, {} at cap, {} failed",
                stats.filled, stats.at_cap, stats.failures
            );
        }
        Command::Sweep => {
            let removed = engine.sweep_buffer()?;
            println!("🧹 Sweep removed {removed} buffer entr(y/ies)");
        }
        Command::Agent { command } => run_agent_command(&engine, command)?,
        Command::Stats => {
            let stats = engine.stats()?;
            println!("🛰️ Fleet: {} agent(s), {} post(s)", stats.agents, stats.posts);
            println!("📋 Jobs:");
            for (status, n) in &stats.jobs_by_status {
                println!("   {status}: {n}");
            }
            println!("🧺 Buffer:");
            for (status, n) in &stats.buffer_by_status {
                println!("   {}: {n}", status.as_str());
            }
        }
        Command::DeadLetters { limit } => {
            let dead = engine.jobs().dead_letters(limit)?;
            if dead.is_empty() {
                println!("✅ No dead-lettered jobs");
            }
            for job in dead {
                println!(
                    "☠️ {} {} agent={} attempts={} error={}",
                    job.id,
                    job.job_type,
                    job.agent_id.as_deref().unwrap_or("-"),
                    job.attempts,
                    job.last_error.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

fn run_agent_command(engine: &FleetEngine, command: AgentCommand) -> Result<()> {
    match command {
        AgentCommand::Add { handle, name, frequency, profile, window_start, window_end } => {
            let profile = match profile.as_deref() {
                None => None,
                Some(p) => Some(
                    RhythmProfile::parse(p)
                        .ok_or_else(|| anyhow::anyhow!("unknown rhythm profile: {p}"))?,
                ),
            };
            let agent = engine.agents().create(&NewAgent {
                display_name: name.unwrap_or_else(|| handle.clone()),
                handle,
                posting_frequency: frequency,
                rhythm_profile: profile,
                active_start_hour: window_start,
                active_end_hour: window_end,
            })?;
            engine.jobs().enqueue(
                JobType::OnboardAgent,
                Some(&agent.id),
                serde_json::json!({}),
                None,
            )?;
            println!("🤖 Added @{} ({}) — onboarding queued", agent.handle, agent.id);
        }
        AgentCommand::Enable { handle } => {
            let agent = require_agent(engine, &handle)?;
            engine.agents().set_scheduled(&agent.id, true)?;
            println!("▶️ @{handle} scheduling enabled");
        }
        AgentCommand::Disable { handle } => {
            let agent = require_agent(engine, &handle)?;
            engine.agents().set_scheduled(&agent.id, false)?;
            println!("⏸️ @{handle} scheduling disabled");
        }
        AgentCommand::List => {
            for agent in engine.agents().list()? {
                println!(
                    "🤖 @{} [{}] {}x/day {} next={}",
                    agent.handle,
                    if agent.is_scheduled { "on" } else { "off" },
                    agent.posting_frequency,
                    agent
                        .rhythm_profile
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "steady".into()),
                    agent
                        .next_run_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".into())
                );
            }
        }
    }
    Ok(())
}

fn require_agent(engine: &FleetEngine, handle: &str) -> Result<botfleet_agents::Agent> {
    engine
        .agents()
        .get_by_handle(handle)?
        .ok_or_else(|| anyhow::anyhow!("no agent with handle @{handle}"))
}
