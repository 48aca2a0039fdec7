//! Recording session writer
//!
//! A [`WriterSession`] owns one output file. Its tracks are configured lazily
//! from the first video frame, and the session zero time is fixed by the
//! first frame the muxer accepts.
//!
//! ```text
//! Unconfigured ──first frame──▶ Configured ──first append──▶ Writing
//!      │                            │                           │
//!      │ config error               │ stop                      │ stop
//!      ▼                            ▼                           ▼
//!    Failed                  Finished (no file)     Finishing ─▶ Finished / Failed
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::RecorderConfig;
use crate::error::{Result, ResultExt};
use crate::media::{remove_if_exists, MediaBackend, MediaMuxer, MuxerSummary, TrackParams};
use crate::scaler::FrameScaler;
use crate::types::{AudioChunk, Dimensions, Handle, Orientation, VideoFrame};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unconfigured,
    Configured,
    Writing,
    Finishing,
    Finished,
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Writing => "writing",
            Self::Finishing => "finishing",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a sample was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Track input not ready for more data
    NotReady,
    /// Session is not accepting samples
    Closed,
    /// Audio arrived before the first video frame was written
    NotWriting,
    /// Sample timestamp precedes the session zero time
    BeforeZero,
    /// Frame buffer does not match its geometry
    Malformed,
    /// Muxer rejected the sample
    AppendFailed,
}

/// Result of offering a sample to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Dropped(DropReason),
}

enum WriterState {
    Unconfigured,
    Configured {
        muxer: Box<dyn MediaMuxer>,
        dimensions: Dimensions,
    },
    Writing {
        muxer: Box<dyn MediaMuxer>,
        dimensions: Dimensions,
        zero: Duration,
    },
    Finishing,
    Finished {
        output: Option<PathBuf>,
    },
    Failed {
        reason: String,
    },
}

impl WriterState {
    fn phase(&self) -> SessionPhase {
        match self {
            Self::Unconfigured => SessionPhase::Unconfigured,
            Self::Configured { .. } => SessionPhase::Configured,
            Self::Writing { .. } => SessionPhase::Writing,
            Self::Finishing => SessionPhase::Finishing,
            Self::Finished { .. } => SessionPhase::Finished,
            Self::Failed { .. } => SessionPhase::Failed,
        }
    }
}

/// One recording, from first frame to finished file
pub struct WriterSession {
    handle: Handle,
    path: PathBuf,
    orientation: Orientation,
    config: RecorderConfig,
    backend: Arc<dyn MediaBackend>,
    state: WriterState,
    conformer: Option<FrameScaler>,
    video_frames: u64,
    audio_chunks: u64,
}

impl WriterSession {
    /// Create an unconfigured session writing to `path`
    pub fn new(
        path: impl Into<PathBuf>,
        orientation: Orientation,
        config: RecorderConfig,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            handle: Handle::new(),
            path: path.into(),
            orientation,
            config,
            backend,
            state: WriterState::Unconfigured,
            conformer: None,
            video_frames: 0,
            audio_chunks: 0,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Encoder size, once configured
    pub fn dimensions(&self) -> Option<Dimensions> {
        match &self.state {
            WriterState::Configured { dimensions, .. } | WriterState::Writing { dimensions, .. } => {
                Some(*dimensions)
            }
            _ => None,
        }
    }

    /// Source timestamp of the first written frame
    pub fn zero_time(&self) -> Option<Duration> {
        match &self.state {
            WriterState::Writing { zero, .. } => Some(*zero),
            _ => None,
        }
    }

    /// Why the session failed, if it did
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            WriterState::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn video_frames(&self) -> u64 {
        self.video_frames
    }

    pub fn audio_chunks(&self) -> u64 {
        self.audio_chunks
    }

    /// Whether the session still takes samples
    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            WriterState::Unconfigured | WriterState::Configured { .. } | WriterState::Writing { .. }
        )
    }

    fn configure(&mut self, dimensions: Dimensions) -> Result<()> {
        let params = TrackParams::live(&self.config, dimensions, self.orientation);
        let result = remove_if_exists(&self.path)
            .and_then(|removed| {
                if removed {
                    debug!("Removed stale file at {:?}", self.path);
                }
                self.backend.create_muxer(&self.path, &params)
            })
            .context(format!("Failed to open {}", self.path.display()));

        match result {
            Ok(muxer) => {
                info!(
                    "{} configured: {} @ {} kbps, rotation {}°",
                    self.handle,
                    dimensions,
                    params.video.bitrate_kbps,
                    params.video.rotation_degrees
                );
                self.state = WriterState::Configured { muxer, dimensions };
                Ok(())
            }
            Err(e) => {
                error!("{} configuration failed: {}", self.handle, e);
                self.remove_partial();
                self.state = WriterState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Offer a video frame
    ///
    /// The first frame configures the session from its size. Later frames of a
    /// different size are scaled to the configured size. `overlay` runs on the
    /// frame right before it is handed to the muxer, and only if the muxer is
    /// ready for it.
    ///
    /// Returns `Err` only for failures that end the session.
    pub fn append_video(
        &mut self,
        frame: &mut VideoFrame,
        overlay: impl FnOnce(&mut VideoFrame),
    ) -> Result<AppendOutcome> {
        if !self.is_open() {
            return Ok(AppendOutcome::Dropped(DropReason::Closed));
        }
        if !frame.is_well_formed() {
            return Ok(AppendOutcome::Dropped(DropReason::Malformed));
        }
        if let WriterState::Unconfigured = self.state {
            self.configure(frame.dimensions())?;
        }

        let (muxer, dimensions, zero) = match &mut self.state {
            WriterState::Configured { muxer, dimensions } => (muxer, *dimensions, None),
            WriterState::Writing {
                muxer,
                dimensions,
                zero,
            } => (muxer, *dimensions, Some(*zero)),
            _ => return Ok(AppendOutcome::Dropped(DropReason::Closed)),
        };

        if !muxer.is_video_ready() {
            trace!("Video input not ready, dropping frame at {:?}", frame.pts);
            return Ok(AppendOutcome::Dropped(DropReason::NotReady));
        }
        if let Some(zero) = zero {
            if frame.pts < zero {
                return Ok(AppendOutcome::Dropped(DropReason::BeforeZero));
            }
        }

        let mut conformed;
        let target: &mut VideoFrame = if frame.dimensions() == dimensions {
            frame
        } else {
            let scaler = self
                .conformer
                .get_or_insert_with(|| FrameScaler::new(dimensions));
            match scaler.scale(frame) {
                Ok(scaled) => {
                    conformed = scaled;
                    &mut conformed
                }
                Err(e) => {
                    warn!("Dropping {} frame for {} session: {}", frame.dimensions(), dimensions, e);
                    return Ok(AppendOutcome::Dropped(DropReason::Malformed));
                }
            }
        };

        overlay(target);

        let zero_time = zero.unwrap_or(target.pts);
        let relative = target.pts - zero_time;
        if let Err(e) = muxer.append_video(target, relative) {
            warn!("Video append failed at {:?}: {}", relative, e);
            return Ok(AppendOutcome::Dropped(DropReason::AppendFailed));
        }

        self.video_frames += 1;
        if zero.is_none() {
            self.begin_writing(zero_time);
        }
        Ok(AppendOutcome::Appended)
    }

    fn begin_writing(&mut self, zero: Duration) {
        if let WriterState::Configured { muxer, dimensions } =
            std::mem::replace(&mut self.state, WriterState::Finishing)
        {
            debug!("{} writing, zero time {:?}", self.handle, zero);
            self.state = WriterState::Writing {
                muxer,
                dimensions,
                zero,
            };
        }
    }

    /// Offer an audio chunk; only written once video has started
    pub fn append_audio(&mut self, chunk: &AudioChunk) -> AppendOutcome {
        let WriterState::Writing { muxer, zero, .. } = &mut self.state else {
            let reason = if self.is_open() {
                DropReason::NotWriting
            } else {
                DropReason::Closed
            };
            return AppendOutcome::Dropped(reason);
        };

        if chunk.pts < *zero {
            return AppendOutcome::Dropped(DropReason::BeforeZero);
        }
        if !muxer.is_audio_ready() {
            trace!("Audio input not ready, dropping chunk at {:?}", chunk.pts);
            return AppendOutcome::Dropped(DropReason::NotReady);
        }

        let relative = chunk.pts - *zero;
        match muxer.append_audio(chunk, relative) {
            Ok(()) => {
                self.audio_chunks += 1;
                AppendOutcome::Appended
            }
            Err(e) => {
                warn!("Audio append failed at {:?}: {}", relative, e);
                AppendOutcome::Dropped(DropReason::AppendFailed)
            }
        }
    }

    /// Finish the session and return the playable file, if there is one
    ///
    /// A session that never configured has nothing to finish and stays
    /// unconfigured. A configured session without samples removes its empty
    /// file. Calling this again after the session ended returns `None`.
    pub fn finish(&mut self) -> Option<PathBuf> {
        match std::mem::replace(&mut self.state, WriterState::Finishing) {
            WriterState::Unconfigured => {
                self.state = WriterState::Unconfigured;
                None
            }
            WriterState::Configured { muxer, .. } => {
                drop(muxer);
                self.remove_partial();
                debug!("{} stopped before any frame was written", self.handle);
                self.state = WriterState::Finished { output: None };
                None
            }
            WriterState::Writing { muxer, .. } => self.complete(muxer),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn complete(&mut self, muxer: Box<dyn MediaMuxer>) -> Option<PathBuf> {
        match muxer.finish() {
            Ok(MuxerSummary {
                path,
                video_frames,
                audio_chunks,
            }) => {
                info!(
                    "{} finished: {:?} ({} video frames, {} audio chunks)",
                    self.handle, path, video_frames, audio_chunks
                );
                self.state = WriterState::Finished {
                    output: Some(path.clone()),
                };
                Some(path)
            }
            Err(e) => {
                error!("{} finalize failed: {}", self.handle, e);
                self.remove_partial();
                self.state = WriterState::Failed {
                    reason: e.to_string(),
                };
                None
            }
        }
    }

    /// The finished file, once the session completed
    pub fn output(&self) -> Option<&Path> {
        match &self.state {
            WriterState::Finished { output } => output.as_deref(),
            _ => None,
        }
    }

    /// Abandon the session without finalizing, removing any partial file
    pub fn discard(&mut self) {
        match std::mem::replace(&mut self.state, WriterState::Finished { output: None }) {
            WriterState::Configured { muxer, .. } | WriterState::Writing { muxer, .. } => {
                drop(muxer);
                self.remove_partial();
                debug!("{} discarded", self.handle);
            }
            other => self.state = other,
        }
    }

    fn remove_partial(&self) {
        if let Err(e) = remove_if_exists(&self.path) {
            warn!("{}", e);
        }
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for WriterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSession")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("phase", &self.phase())
            .field("video_frames", &self.video_frames)
            .field("audio_chunks", &self.audio_chunks)
            .finish()
    }
}
