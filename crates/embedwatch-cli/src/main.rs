//! Embedwatch CLI - Embed address builder and session simulator
//!
//! Features:
//! - Embed address construction from item/collection identifiers
//! - Full controller sessions against an in-memory host page, driven by
//!   scripted player state codes, to observe the retry policy

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Embedwatch CLI - Embedded player lifecycle toolkit
#[derive(Parser)]
#[command(name = "embedwatch")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Build embed addresses and simulate embed sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// JSON file with embed configuration overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Identifier arguments shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct IdArgs {
    /// Primary item id
    #[arg(short, long)]
    item: Option<String>,

    /// Collection id
    #[arg(short = 'l', long)]
    collection: Option<String>,

    /// Start offset in seconds
    #[arg(short, long)]
    offset: Option<u32>,

    /// Request the scripting capability in the address
    #[arg(long)]
    api: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the embed address for an identifier set
    Address {
        #[command(flatten)]
        ids: IdArgs,
    },

    /// Run a controller session against scripted player events
    Simulate {
        #[command(flatten)]
        ids: IdArgs,

        /// Events emitted by the Nth created player, e.g. "ready:-1" or
        /// "ready:5,state:5,state:1". Repeat once per attempt.
        #[arg(short, long = "attempt")]
        attempts: Vec<String>,

        /// Start with the player API unloaded and signal readiness after the load
        #[arg(long)]
        late_api: bool,

        /// Give up waiting for an outcome after this many milliseconds
        #[arg(short, long, default_value = "2000")]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    embedwatch_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Address { ids } => {
            commands::address(&ids, &config, &cli.format)?;
        }
        Commands::Simulate { ids, attempts, late_api, timeout_ms } => {
            commands::simulate(&ids, &attempts, late_api, timeout_ms, config, &cli.format).await?;
        }
    }

    Ok(())
}
