//! Offline compositing
//!
//! Burns the scoreboard into a finished raw recording using the score
//! timeline captured during the game. Every decoded frame at time `t` gets the
//! scoreboard as it was at `t`; audio is copied through unchanged.
//!
//! Compositing is best effort: if anything fails, the raw recording stays the
//! deliverable and the caller gets a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::{Result, ResultExt, ScorecastError};
use crate::media::{remove_if_exists, MediaBackend, MuxerSummary, TrackParams};
use crate::overlay::OverlayRenderer;
use crate::timeline::Timeline;
use crate::types::FrameSample;

/// What a compositing run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeOutcome {
    /// Overlaid file written next to the raw one
    Composited { output: PathBuf, raw: PathBuf },
    /// Empty timeline, nothing to burn in
    Skipped { raw: PathBuf },
    /// Compositing failed; the raw file is the result
    Fallback { raw: PathBuf, error: String },
}

impl CompositeOutcome {
    /// The file the user should get
    pub fn final_path(&self) -> &Path {
        match self {
            Self::Composited { output, .. } => output,
            Self::Skipped { raw } | Self::Fallback { raw, .. } => raw,
        }
    }

    pub fn is_composited(&self) -> bool {
        matches!(self, Self::Composited { .. })
    }

    /// Warning to show when compositing did not happen as asked
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Fallback { error, .. } => Some(format!(
                "Scoreboard could not be added, keeping the original recording: {}",
                error
            )),
            _ => None,
        }
    }
}

/// `<dir>/<stem>-overlay.<ext>` next to the raw recording
pub fn overlay_output_path(raw: &Path) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    let name = match raw.extension() {
        Some(ext) => format!("{}-overlay.{}", stem, ext.to_string_lossy()),
        None => format!("{}-overlay", stem),
    };
    raw.with_file_name(name)
}

/// One compositing request
#[derive(Debug, Clone)]
pub struct CompositeJob {
    pub raw: PathBuf,
    pub timeline: Timeline,
    pub output: PathBuf,
}

impl CompositeJob {
    pub fn new(raw: impl Into<PathBuf>, timeline: Timeline) -> Self {
        let raw = raw.into();
        let output = overlay_output_path(&raw);
        Self {
            raw,
            timeline,
            output,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }
}

/// Offline scoreboard compositor
#[derive(Clone)]
pub struct Compositor {
    config: RecorderConfig,
    backend: Arc<dyn MediaBackend>,
    renderer: OverlayRenderer,
}

impl Compositor {
    pub fn new(config: RecorderConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let renderer = OverlayRenderer::new(config.overlay.clone());
        Self {
            config,
            backend,
            renderer,
        }
    }

    /// Composite in the background and hand the outcome to `completion`
    ///
    /// Must be called from within a Tokio runtime. `completion` runs exactly
    /// once, on the blocking thread that did the work.
    pub fn run<F>(&self, raw: impl Into<PathBuf>, timeline: Timeline, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(CompositeOutcome) + Send + 'static,
    {
        let this = self.clone();
        let job = CompositeJob::new(raw, timeline);
        tokio::task::spawn_blocking(move || completion(this.composite_blocking(&job)))
    }

    /// Composite on a blocking thread and wait for the outcome
    pub async fn composite(&self, job: CompositeJob) -> CompositeOutcome {
        let this = self.clone();
        let raw = job.raw.clone();
        match tokio::task::spawn_blocking(move || this.composite_blocking(&job)).await {
            Ok(outcome) => outcome,
            Err(e) => CompositeOutcome::Fallback {
                raw,
                error: format!("compositing task failed: {}", e),
            },
        }
    }

    /// Composite on the current thread
    pub fn composite_blocking(&self, job: &CompositeJob) -> CompositeOutcome {
        if job.timeline.is_empty() {
            info!("No score timeline for {:?}, keeping raw recording", job.raw);
            return CompositeOutcome::Skipped {
                raw: job.raw.clone(),
            };
        }

        match self.render_pass(job) {
            Ok(summary) => {
                info!(
                    "Composited {:?} -> {:?} ({} frames)",
                    job.raw, summary.path, summary.video_frames
                );
                CompositeOutcome::Composited {
                    output: summary.path,
                    raw: job.raw.clone(),
                }
            }
            Err(e) => {
                warn!("Compositing {:?} failed: {}", job.raw, e);
                if let Err(cleanup) = remove_if_exists(&job.output) {
                    debug!("{}", cleanup);
                }
                CompositeOutcome::Fallback {
                    raw: job.raw.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn render_pass(&self, job: &CompositeJob) -> Result<MuxerSummary> {
        if job.output == job.raw {
            return Err(ScorecastError::compositor(
                "Output path must differ from the raw recording",
            ));
        }

        let mut reader = self
            .backend
            .open_reader(&job.raw)
            .context(format!("Failed to open {}", job.raw.display()))?;
        let params = TrackParams::offline(&self.config, reader.as_ref());
        debug!(
            "Compositing {} video, audio {:?}",
            params.video.dimensions,
            params.audio.as_ref().map(|a| a.format)
        );

        remove_if_exists(&job.output)?;
        let mut muxer = self
            .backend
            .create_muxer(&job.output, &params)
            .context(format!("Failed to create {}", job.output.display()))?;

        let mut frames = 0u64;
        while let Some(sample) = reader.next_sample()? {
            match sample {
                FrameSample::Video(mut frame) => {
                    if let Some(state) = job.timeline.snapshot_at(frame.pts) {
                        self.renderer.render_snapshot(&mut frame, &state);
                    }
                    let pts = frame.pts;
                    muxer.append_video(&frame, pts)?;
                    frames += 1;
                }
                FrameSample::Audio(chunk) => {
                    if params.audio.is_some() {
                        muxer.append_audio(&chunk, chunk.pts)?;
                    }
                }
            }
        }

        if frames == 0 {
            return Err(ScorecastError::compositor("Raw recording has no video frames"));
        }

        muxer.finish()
    }
}
