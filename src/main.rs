//! Token Sniper - validation pipeline and position risk engine
//!
//! # WARNING
//! - Most freshly launched tokens go to zero (rug pulls, abandonment).
//! - Replay results do NOT equal live results.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use monad_sniper::cli::commands;
use monad_sniper::config::Config;

/// Token Sniper - validation pipeline and position risk engine
#[derive(Parser)]
#[command(name = "snipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a JSON-lines event recording (paper trading)
    Replay {
        /// Recording to replay
        #[arg(long)]
        events: PathBuf,
    },

    /// Validate a single candidate snapshot (JSON)
    Check {
        /// Candidate snapshot file
        #[arg(long)]
        candidate: PathBuf,

        /// Evaluate as of this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// List open positions persisted under `positions.path`
    Positions,

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monad_sniper=info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Replay { events } => commands::replay(&config, &events).await,
        Commands::Check { candidate, at } => commands::check(&config, &candidate, at).await,
        Commands::Positions => commands::positions(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
