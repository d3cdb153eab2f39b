//! DEX Sentinel - forecast-driven market monitor
//!
//! # WARNING
//! - In live mode this places real orders. Start with `--paper`.
//! - The rug-pull heuristic and stop-loss are best-effort: a market can gap
//!   through them between two polls.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::filter::{Directive, EnvFilter};

use dex_sentinel::cli::commands;
use dex_sentinel::config::Config;

/// DEX Sentinel - per-market forecast-driven trader
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sentinel.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one worker per market
    Start {
        /// Use the simulated exchange (no real orders)
        #[arg(long)]
        paper: bool,

        /// Only run these markets (repeatable; default: all enabled)
        #[arg(long = "market", value_name = "ID")]
        markets: Vec<String>,

        /// Skip the live-trading confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Build a training dataset from historical ticks
    Backfill {
        /// Market id
        #[arg(long)]
        market: String,

        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: String,

        /// Output dataset file
        #[arg(long, default_value = "dataset.json")]
        output: String,
    },

    /// Fit the model on a dataset and save its weights
    Train {
        /// Dataset written by `backfill`
        #[arg(long)]
        dataset: String,

        #[arg(long, default_value = "1")]
        epochs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.log_json)?;

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
        Commands::Start {
            paper,
            markets,
            yes,
        } => commands::start(&config, paper, &markets, yes).await,
        Commands::Config => commands::show_config(&config),
        Commands::Backfill {
            market,
            start,
            end,
            output,
        } => commands::backfill(&config, &market, &start, &end, &output).await,
        Commands::Train { dataset, epochs } => commands::train(&config, &dataset, epochs).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("dex_sentinel=info".parse::<Directive>()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
