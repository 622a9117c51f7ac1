//! Botbrain - persistent memory for chat robots
//!
//! Operator entry point: validate a brain configuration against its
//! storage provider and print effective settings.

use anyhow::Result;
use botbrain::{
    config::{BotConfig, LogConfig},
    crypto::KeyState,
    Brain, ProviderRegistry,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROBE_KEY: &str = "botbrain:probe";

#[derive(Parser)]
#[command(name = "botbrain")]
#[command(author = "Botbrain Team")]
#[command(version)]
#[command(about = "Persistent memory for chat robots")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BOTBRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the brain, bootstrap encryption and run a write/read probe
    Check,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config.or_else(BotConfig::default_path) {
        Some(path) => BotConfig::load_or_default(&path)?,
        None => BotConfig::default(),
    };
    config.apply_env_overrides();

    init_logging(&config.log, cli.verbose);

    match cli.command {
        Commands::Check => run_check(&config).await?,
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

fn init_logging(log: &LogConfig, verbose: bool) {
    let level = if verbose { "debug" } else { log.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("botbrain={}", level).into());

    if log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run_check(config: &BotConfig) -> Result<()> {
    println!("Botbrain check");
    println!();

    let registry = ProviderRegistry::default();
    println!("Providers: {}", registry.names().join(", "));
    println!("Using provider: {}", config.brain.provider);

    let brain = Brain::from_config(&config.brain, &registry).await?;

    if brain.encryption_enabled() {
        match brain.encryption_state().await {
            KeyState::Initialized => println!("  ✓ Brain encryption initialized"),
            state => {
                println!("  ✗ Brain encryption not available ({:?})", state);
                brain.shutdown().await;
                anyhow::bail!("brain is locked; supply the key via BOTBRAIN_ENCRYPTION_KEY");
            }
        }
    } else {
        println!("  ℹ Brain encryption disabled");
    }

    let probe = brain.checkout(PROBE_KEY, true).await?;
    let previous = probe.blob.clone();
    brain
        .update(PROBE_KEY, &probe.token, b"ok".to_vec())
        .await?;
    let read = brain.checkout(PROBE_KEY, false).await?;
    let ok = read.blob.as_deref() == Some(b"ok".as_slice());

    // Put back whatever was there before the probe
    if let Some(previous) = previous {
        let restore = brain.checkout(PROBE_KEY, true).await?;
        brain.update(PROBE_KEY, &restore.token, previous).await?;
    }
    brain.shutdown().await;

    if ok {
        println!("  ✓ Write/read probe succeeded");
    } else {
        println!("  ✗ Write/read probe returned unexpected data");
        anyhow::bail!("storage probe failed");
    }

    println!();
    println!("Check complete!");
    Ok(())
}

fn show_config(config: Option<&BotConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
