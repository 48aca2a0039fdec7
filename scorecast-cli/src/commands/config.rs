//! Config command - inspect and create the recorder configuration

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use scorecast_core::config::{sample_config, ConfigFile, RecorderConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show which file is used and where recordings go
    Path,

    /// Show the effective configuration
    Show {
        /// Print the commented defaults instead of the effective settings
        #[arg(long)]
        defaults: bool,
    },

    /// Check the configuration for errors and warnings
    Check,

    /// Write a config file from the defaults
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,

        /// Directory recordings are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Minimum milliseconds between frames handed to inference
        #[arg(long)]
        inference_interval: Option<u64>,

        /// Do not feed frames to inference at all
        #[arg(long)]
        no_inference: bool,
    },
}

/// Settings a new config file starts with
fn initial_config(
    output_dir: Option<PathBuf>,
    inference_interval: Option<u64>,
    no_inference: bool,
) -> Result<RecorderConfig> {
    let mut config = RecorderConfig::default();
    if let Some(dir) = output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(ms) = inference_interval {
        config = config.with_inference_interval(Duration::from_millis(ms));
    }
    if no_inference {
        config = config.without_inference();
    }
    config
        .validate_strict()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;
    Ok(config)
}

fn print_summary(config: &RecorderConfig) {
    println!("  Recordings:  {}", config.output_dir.display());
    println!(
        "  Video:       {} kbps {:?} in .{}",
        config.video.bitrate_kbps,
        config.video.profile,
        config.video.container.extension()
    );
    if config.inference.enabled {
        println!(
            "  Inference:   {}x{} every {} ms",
            config.inference.width, config.inference.height, config.inference.interval_ms
        );
    } else {
        println!("  Inference:   off");
    }
}

fn report_check(path: &Path, config: &RecorderConfig) -> Result<()> {
    if let Err(e) = config.validate_strict() {
        anyhow::bail!("Invalid configuration in {}: {}", path.display(), e);
    }
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration OK");
    } else {
        println!("Configuration OK with {} warning(s):", warnings.len());
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let path = args.config.clone().unwrap_or_else(ConfigFile::default_path);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            if path.exists() {
                let config = super::load_config(Some(path))?;
                print_summary(&config);
            } else {
                println!("(file does not exist, defaults apply)");
                print_summary(&RecorderConfig::default());
            }
        }
        ConfigCommand::Show { defaults: true } => {
            print!("{}", sample_config());
        }
        ConfigCommand::Show { defaults: false } => {
            if path.exists() {
                println!("# Loaded from {}\n", path.display());
            } else {
                println!("# No file at {}; showing defaults\n", path.display());
            }
            let config = super::load_config(Some(path))?;
            let rendered = toml::to_string_pretty(&ConfigFile { recorder: config })
                .context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        ConfigCommand::Check => {
            let config = super::load_config(Some(path.clone()))?;
            report_check(&path, &config)?;
        }
        ConfigCommand::Init {
            force,
            output_dir,
            inference_interval,
            no_inference,
        } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            let config = initial_config(output_dir, inference_interval, no_inference)?;
            ConfigFile {
                recorder: config.clone(),
            }
            .save_to(path.clone())
            .context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
            print_summary(&config);
        }
    }

    Ok(())
}
