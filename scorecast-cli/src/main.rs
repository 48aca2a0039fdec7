//! Scorecast CLI
//!
//! Record games with a burned-in scoreboard, and re-render the scoreboard
//! onto existing recordings.
//!
//! # Usage
//!
//! ```bash
//! # Record a 30 second synthetic game (test pattern + scripted score)
//! scorecast record --duration 30 --home Lions --away Bears
//!
//! # Burn a saved score timeline into a raw recording
//! scorecast composite game-20240309-140507.mp4 --timeline game-20240309-140507.json
//!
//! # Show backend and configuration status
//! scorecast info
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Scorecast - game recording with a live scoreboard overlay
#[derive(Parser)]
#[command(name = "scorecast")]
#[command(version)]
#[command(about = "Game recording with a burned-in live scoreboard", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a synthetic game through the full recording pipeline
    #[command(alias = "rec")]
    Record(commands::RecordArgs),

    /// Burn a score timeline into an existing recording
    Composite(commands::CompositeArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// Show backend availability and configuration
    Info(commands::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["scorecast", "scorecast_core"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Record(args) => commands::record(args).await?,
        Commands::Composite(args) => commands::composite(args).await?,
        Commands::Config(args) => commands::config(args).await?,
        Commands::Info(args) => commands::info(args).await?,
    }

    Ok(())
}
