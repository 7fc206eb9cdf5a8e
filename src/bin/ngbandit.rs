//! `ngbandit`: run agents and the supervisor against one shared belief store.
//!
//! Usage:
//!   ngbandit [OPTIONS] [COMMAND]
//!
//! Commands:
//!   run              Run the supervisor and agents (default)
//!   generate-config  Write the default configuration as TOML
//!   validate-config  Parse and validate the configuration, then print it
//!
//! Example:
//!   ngbandit --agents 4 --duration-secs 600 --seed 7 run

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ngbandit::config::Config;
use ngbandit::logging::{self, LogFormat};
use ngbandit::{
    discover_arms, Agent, BeliefSnapshot, BeliefStore, MemoryKv, RewardSource, Selector,
    SimulatedRewards, Supervisor,
};

#[derive(Parser)]
#[command(name = "ngbandit")]
#[command(version, about = "Thompson-sampling bandit with a convergence/drift supervisor")]
struct Cli {
    /// Path to config file (missing file means defaults)
    #[arg(short, long, default_value = "ngbandit.toml")]
    config: String,

    /// Override number of concurrent agents
    #[arg(long)]
    agents: Option<usize>,

    /// Override reward service URL (omit to simulate in-process)
    #[arg(long)]
    rewards_url: Option<String>,

    /// Override base RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds and print a final snapshot (default: run until Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Seconds between status snapshots in the log (0 disables)
    #[arg(long, default_value = "30")]
    status_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor and agents (default)
    Run,
    /// Write the default configuration as TOML
    GenerateConfig {
        #[arg(short, long, default_value = "ngbandit.toml")]
        output: String,
    },
    /// Parse and validate the configuration, then print it
    ValidateConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match real_main(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ngbandit: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn real_main(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Some(Commands::GenerateConfig { output }) => {
            let content = Config::default().to_toml()?;
            std::fs::write(output, format!("# ngbandit configuration\n\n{content}"))?;
            println!("wrote {output}");
            return Ok(());
        }
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli)?;
            println!("configuration is valid:\n{}", config.to_toml()?);
            return Ok(());
        }
        Some(Commands::Run) | None => {}
    }

    let config = load_config(&cli)?;
    logging::init(&config.logging)?;
    run(config, cli.duration_secs, cli.status_interval_secs).await
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::load(&cli.config)?;
    if let Some(n) = cli.agents {
        config.agent.count = n;
    }
    if let Some(url) = &cli.rewards_url {
        config.rewards.url = Some(url.clone());
    }
    if let Some(seed) = cli.seed {
        config.selection.seed = Some(seed);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    config.validate()?;
    Ok(config)
}

fn reward_source(
    config: &Config,
) -> Result<(Arc<dyn RewardSource>, Option<Arc<SimulatedRewards>>), Box<dyn std::error::Error>> {
    if let Some(url) = &config.rewards.url {
        #[cfg(feature = "http")]
        {
            let timeout = Duration::from_millis(config.rewards.timeout_ms);
            let src = ngbandit::HttpRewardSource::new(url.clone(), timeout)?;
            info!(url = %url, "using remote reward service");
            return Ok((Arc::new(src), None));
        }
        #[cfg(not(feature = "http"))]
        return Err(format!("rewards.url={url} needs the `http` feature").into());
    }
    let seed = config.selection.seed.unwrap_or_else(rand::random::<u64>);
    let sim = Arc::new(SimulatedRewards::new(config.rewards.arms.clone(), seed));
    info!(arms = config.rewards.arms.len(), "using simulated rewards");
    Ok((sim.clone(), Some(sim)))
}

async fn run(
    config: Config,
    duration_secs: Option<u64>,
    status_interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let (rewards, simulation) = reward_source(&config)?;

    let arms = discover_arms(
        rewards.as_ref(),
        config.rewards.discovery_attempts,
        Duration::from_millis(config.rewards.discovery_delay_ms),
    )
    .await?;

    let store = BeliefStore::new(Arc::new(MemoryKv::new()));
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    for id in 0..config.agent.count {
        let selector = match config.selection.seed {
            Some(seed) => Selector::with_seed(config.selection_config(), seed.wrapping_add(id as u64)),
            None => Selector::from_entropy(config.selection_config()),
        };
        let agent = Agent::new(
            id,
            arms.clone(),
            store.clone(),
            rewards.clone(),
            selector,
            config.agent_config(),
        );
        agent.initialize().await?;
        tasks.push(tokio::spawn(agent.run()));
    }

    let supervisor = Supervisor::new(arms.clone(), store.clone(), config.supervisor_config());
    tasks.push(tokio::spawn(supervisor.run()));

    if let (Some(sim), Some(drift)) = (simulation, config.rewards.drift.clone()) {
        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(drift.after_secs)).await;
            match sim.shift_mean(&drift.arm, drift.delta) {
                Ok(mean) => warn!(arm = %drift.arm, delta = drift.delta, mean, "injected drift"),
                Err(e) => error!(error = %e, "drift injection failed"),
            }
        }));
    }

    if status_interval_secs > 0 {
        let store = store.clone();
        let arms = arms.clone();
        tasks.push(tokio::spawn(async move {
            let period = Duration::from_secs(status_interval_secs);
            loop {
                tokio::time::sleep(period).await;
                match BeliefSnapshot::capture(&store, &arms).await {
                    Ok(snap) => info!(
                        mode = %snap.mode,
                        leader = ?snap.leader,
                        snapshot = %serde_json::to_string(&snap).unwrap_or_default(),
                        "status"
                    ),
                    Err(e) => warn!(error = %e, "status snapshot failed"),
                }
            }
        }));
    }

    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c().await?;
            info!("interrupted");
        }
    }

    for t in &tasks {
        t.abort();
    }

    let snap = BeliefSnapshot::capture(&store, &arms).await?;
    println!("{}", serde_json::to_string_pretty(&snap)?);
    Ok(())
}
