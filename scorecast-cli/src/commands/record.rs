//! Record command - run a synthetic game through the recording pipeline
//!
//! Generates a moving test pattern and silent audio in place of a camera,
//! scores a goal every few seconds, and records it exactly like a real game:
//! live overlay, score timeline, then the offline composite.

use anyhow::{Context, Result};
use clap::Args;
use scorecast_core::compositor::{CompositeJob, Compositor};
use scorecast_core::recorder::{Recorder, RecorderEvent};
use scorecast_core::timeline::TimelineTracker;
use scorecast_core::types::{AudioChunk, AudioFormat, Orientation, VideoFrame};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Arguments for the record command
#[derive(Args)]
pub struct RecordArgs {
    /// Game length in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Home team name
    #[arg(long, default_value = "Home")]
    home: String,

    /// Away team name
    #[arg(long, default_value = "Away")]
    away: String,

    /// Event name shown under the score
    #[arg(long)]
    event: Option<String>,

    /// Frame size, e.g. 1280x720
    #[arg(short, long, default_value = "1280x720")]
    size: String,

    /// Frames per second
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Seconds between scripted goals
    #[arg(long, default_value = "4")]
    goal_every: u64,

    /// Device orientation (landscape-right, landscape-left, portrait, portrait-upside-down)
    #[arg(short, long, default_value = "landscape-right")]
    orientation: String,

    /// Output directory (overrides the config file)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the offline composite after recording
    #[arg(long)]
    no_composite: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Invalid size '{}'. Expected WIDTHxHEIGHT", s))?;
    let width: u32 = w.trim().parse().context("Invalid width")?;
    let height: u32 = h.trim().parse().context("Invalid height")?;
    if width == 0 || height == 0 {
        anyhow::bail!("Frame size cannot be zero");
    }
    Ok((width, height))
}

/// Grey field with a bright bar sweeping left to right once per second
fn test_pattern(width: u32, height: u32, pts: Duration) -> VideoFrame {
    let mut frame = VideoFrame::solid(width, height, [60, 110, 50, 255], pts);
    let bar_width = (width / 16).max(1);
    let phase = pts.as_secs_f64().fract();
    let bar_x = ((width - bar_width) as f64 * phase) as u32;

    let stride = frame.stride as usize;
    for y in 0..height as usize {
        let row = y * stride;
        for x in bar_x..bar_x + bar_width {
            let idx = row + x as usize * 4;
            frame.data[idx..idx + 4].copy_from_slice(&[235, 235, 235, 255]);
        }
    }
    frame
}

/// Game clock text, reported only when the displayed second changes
#[derive(Default)]
struct GameClock {
    shown: Option<String>,
}

impl GameClock {
    fn tick(&mut self, elapsed: Duration) -> Option<String> {
        let secs = elapsed.as_secs();
        let text = format!("{}:{:02}", secs / 60, secs % 60);
        if self.shown.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.shown = Some(text.clone());
        Some(text)
    }
}

async fn log_events(mut events: broadcast::Receiver<RecorderEvent>) {
    loop {
        match events.recv().await {
            Ok(RecorderEvent::Started { path }) => info!("Session started: {}", path.display()),
            Ok(RecorderEvent::Configured { dimensions }) => info!("Tracks configured at {}", dimensions),
            Ok(RecorderEvent::Writing) => debug!("First frame written"),
            Ok(RecorderEvent::Failed { reason }) => warn!("Recording failed: {}", reason),
            Ok(RecorderEvent::Finished { path, video_frames }) => {
                info!("Session finished: {:?} ({} frames)", path, video_frames)
            }
            Ok(RecorderEvent::Reset) => debug!("Session reset"),
            Err(broadcast::error::RecvError::Lagged(n)) => debug!("Missed {} recorder events", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Record a synthetic game
pub async fn record(args: RecordArgs) -> Result<()> {
    println!("Scorecast - Recording\n");

    let (width, height) = parse_size(&args.size)?;
    let orientation = Orientation::from_str(&args.orientation).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid orientation '{}'. Valid options: landscape-right, landscape-left, portrait, portrait-upside-down",
            args.orientation
        )
    })?;
    if args.fps == 0 {
        anyhow::bail!("Frame rate cannot be zero");
    }

    let mut config = super::load_config(args.config.clone())?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    config.video.fps = args.fps;
    let backend = super::backend()?;

    println!("Configuration:");
    println!("  Game:        {} vs {}", args.home, args.away);
    println!("  Duration:    {} s", args.duration);
    println!("  Frame size:  {}x{} @ {} fps", width, height, args.fps);
    println!("  Orientation: {:?}", orientation);
    println!("  Bitrate:     {} kbps", config.video.bitrate_kbps);
    println!("  Output dir:  {}", config.output_dir.display());
    println!();

    let audio_format = AudioFormat {
        sample_rate: config.audio.sample_rate,
        channels: config.audio.channels,
    };
    let compositor = Compositor::new(config.clone(), backend.clone());
    let mut recorder = Recorder::new(config, backend).context("Failed to create recorder")?;
    tokio::spawn(log_events(recorder.subscribe()));

    let mut tracker = TimelineTracker::new();
    tracker.start(
        args.home.as_str(),
        args.away.as_str(),
        Duration::from_secs(args.duration),
    );
    if let Some(event) = &args.event {
        tracker.set_event_name(event.as_str());
    }
    let mut clock = GameClock::default();
    if let Some(text) = clock.tick(Duration::ZERO) {
        tracker.update_clock(text, "1ST");
    }
    tracker.set_running(true);

    let path = recorder
        .start(orientation)
        .await
        .context("Failed to start recording")?;
    println!("Recording to {}", path.display());
    println!("Press Ctrl+C to stop early...\n");

    let input = recorder.frame_input();
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let audio_frames = (audio_format.sample_rate / args.fps).max(1) as usize;
    let goal_every = Duration::from_secs(args.goal_every.max(1));
    let game_length = Duration::from_secs(args.duration);

    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut next_goal = goal_every;
    let mut goals = 0u32;
    let mut dropped = 0u64;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\nReceived interrupt signal...");
                break;
            }
            _ = ticker.tick() => {
                let pts = started.elapsed();
                if pts >= game_length {
                    break;
                }

                if pts >= next_goal {
                    goals += 1;
                    let (home, away) = match tracker.current() {
                        Some(s) if goals % 2 == 1 => (s.home_score + 1, s.away_score),
                        Some(s) => (s.home_score, s.away_score + 1),
                        None => (0, 0),
                    };
                    tracker.update_score(home, away);
                    println!("  {:>5.1}s  GOAL  {} {} - {} {}", pts.as_secs_f64(), args.home, home, away, args.away);
                    next_goal += goal_every;
                }

                if let Some(text) = clock.tick(pts) {
                    tracker.update_clock(text, "1ST");
                }
                if let Some(state) = tracker.current() {
                    recorder.overlay_feed().set(state);
                }

                if !input.push(test_pattern(width, height, pts)) {
                    dropped += 1;
                }
                input.push(AudioChunk::silence(audio_format, audio_frames, pts));
            }
        }
    }

    println!("Stopping recording...");
    tracker.set_running(false);
    let output = recorder.stop_and_wait().await;
    let stats = recorder.stats();
    let timeline = tracker.stop();

    println!();
    println!("Recording stats:");
    println!("  Frames received: {}", stats.video_received);
    println!("  Frames written:  {}", stats.video_written);
    println!("  Frames dropped:  {}", dropped + stats.video_failed + stats.video_not_ready);
    println!("  Audio chunks:    {}", stats.audio_written);
    println!("  Score changes:   {}", timeline.len());

    let Some(raw) = output else {
        recorder.shutdown().await;
        anyhow::bail!("Recording produced no file");
    };
    println!("  File:            {}", raw.display());

    let timeline_path = raw.with_extension("json");
    timeline
        .save(&timeline_path)
        .context("Failed to save score timeline")?;
    println!("  Timeline:        {}", timeline_path.display());

    if !args.no_composite {
        println!();
        println!("Compositing scoreboard...");
        let outcome = compositor.composite(CompositeJob::new(&raw, timeline)).await;
        if let Some(warning) = outcome.warning() {
            println!("  Warning: {}", warning);
        }
        println!("  Final file:      {}", outcome.final_path().display());
    }

    recorder.shutdown().await;
    Ok(())
}
