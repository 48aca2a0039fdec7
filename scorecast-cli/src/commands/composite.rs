//! Composite command - burn a score timeline into a recording

use anyhow::{Context, Result};
use clap::Args;
use scorecast_core::compositor::{CompositeJob, CompositeOutcome, Compositor};
use scorecast_core::timeline::Timeline;
use std::path::PathBuf;

/// Arguments for the composite command
#[derive(Args)]
pub struct CompositeArgs {
    /// Raw recording
    input: PathBuf,

    /// Score timeline JSON (defaults to the recording path with a .json extension)
    #[arg(short, long)]
    timeline: Option<PathBuf>,

    /// Output file (defaults to `<name>-overlay.<ext>` next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Re-render the scoreboard onto an existing recording
pub async fn composite(args: CompositeArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Recording not found: {}", args.input.display());
    }

    let timeline_path = args
        .timeline
        .clone()
        .unwrap_or_else(|| args.input.with_extension("json"));
    let timeline = Timeline::load(&timeline_path)
        .with_context(|| format!("Failed to load timeline {}", timeline_path.display()))?;

    println!("Scorecast - Composite\n");
    println!("  Recording: {}", args.input.display());
    println!("  Timeline:  {} ({} entries)", timeline_path.display(), timeline.len());
    println!(
        "  Game:      {} vs {}",
        timeline.home_name, timeline.away_name
    );
    println!();

    let config = super::load_config(args.config)?;
    let compositor = Compositor::new(config, super::backend()?);

    let mut job = CompositeJob::new(&args.input, timeline);
    if let Some(output) = args.output {
        job = job.with_output(output);
    }

    match compositor.composite(job).await {
        CompositeOutcome::Composited { output, .. } => {
            println!("Scoreboard added: {}", output.display());
        }
        CompositeOutcome::Skipped { raw } => {
            println!("Timeline is empty, nothing to add. Keeping {}", raw.display());
        }
        outcome @ CompositeOutcome::Fallback { .. } => {
            if let Some(warning) = outcome.warning() {
                eprintln!("Warning: {}", warning);
            }
            anyhow::bail!("Compositing failed");
        }
    }

    Ok(())
}
