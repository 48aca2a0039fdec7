//! Info command - show backend availability and configuration

use anyhow::Result;
use clap::Args;
use scorecast_core::config::ConfigFile;
use scorecast_core::media;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

struct Encoders {
    h264: bool,
    aac: bool,
}

#[cfg(feature = "ffmpeg")]
fn encoders() -> Encoders {
    Encoders {
        h264: media::ffmpeg::h264_available(),
        aac: media::ffmpeg::aac_available(),
    }
}

#[cfg(not(feature = "ffmpeg"))]
fn encoders() -> Encoders {
    Encoders {
        h264: false,
        aac: false,
    }
}

/// Show backend availability and configuration
pub async fn info(args: InfoArgs) -> Result<()> {
    let backend = media::backend_available();
    let encoders = encoders();
    let config_path = ConfigFile::default_path();
    let config = ConfigFile::load_or_default().recorder;

    if args.json {
        let info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": if backend { Some("ffmpeg") } else { None },
            "encoders": { "h264": encoders.h264, "aac": encoders.aac },
            "config_path": config_path,
            "config_exists": config_path.exists(),
            "output_dir": config.output_dir,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Scorecast {} - System Information\n", env!("CARGO_PKG_VERSION"));

    println!("Media Backend:");
    if backend {
        println!("  FFmpeg:  compiled in");
        let yes_no = |ok: bool| if ok { "[OK]" } else { "[!!]" };
        println!("  {} H.264 encoder", yes_no(encoders.h264));
        println!("  {} AAC encoder", yes_no(encoders.aac));
        if !encoders.h264 || !encoders.aac {
            println!();
            println!("  Recording needs FFmpeg built with libx264 (or another H.264 encoder) and AAC.");
        }
    } else {
        println!("  None. Rebuild with `--features ffmpeg` to record and composite.");
    }

    println!();
    println!("Configuration:");
    println!(
        "  File:        {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "not found, using defaults" }
    );
    println!("  Output dir:  {}", config.output_dir.display());
    println!(
        "  Video:       H.264 {} @ {} kbps, {}",
        config.video.profile.ffmpeg_name(),
        config.video.bitrate_kbps,
        config.video.container.extension()
    );
    println!(
        "  Audio:       AAC {} Hz, {} ch @ {} kbps",
        config.audio.sample_rate, config.audio.channels, config.audio.bitrate_kbps
    );
    if config.inference.enabled {
        println!(
            "  Inference:   {} every {} ms",
            config.inference.target(),
            config.inference.interval_ms
        );
    } else {
        println!("  Inference:   disabled");
    }

    Ok(())
}
