//! Container and codec backend
//!
//! The recorder and compositor talk to encoders, muxers and demuxers only
//! through the traits here. The FFmpeg implementation lives behind the
//! `ffmpeg` feature; tests drive the same code with in-memory backends.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Container, H264Profile, RecorderConfig};
use crate::error::{Result, ScorecastError};
use crate::types::{AudioChunk, AudioFormat, Dimensions, FrameSample, Orientation, VideoFrame};

/// Video track parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackParams {
    pub dimensions: Dimensions,
    pub bitrate_kbps: u32,
    pub profile: H264Profile,
    /// Nominal frame rate for the track time base
    pub fps: u32,
    /// Display rotation stored as track metadata
    pub rotation_degrees: u32,
    /// Live source; the encoder must not buffer ahead
    pub realtime: bool,
}

/// Audio track parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrackParams {
    pub format: AudioFormat,
    pub bitrate_kbps: u32,
    pub realtime: bool,
}

/// Everything a muxer needs to open its file
#[derive(Debug, Clone, PartialEq)]
pub struct TrackParams {
    pub container: Container,
    pub video: VideoTrackParams,
    pub audio: Option<AudioTrackParams>,
}

impl TrackParams {
    /// Parameters for a live recording at the measured frame size
    pub fn live(config: &RecorderConfig, dimensions: Dimensions, orientation: Orientation) -> Self {
        Self {
            container: config.video.container,
            video: VideoTrackParams {
                dimensions,
                bitrate_kbps: config.video.bitrate_kbps,
                profile: config.video.profile,
                fps: config.video.fps,
                rotation_degrees: orientation.rotation_degrees(),
                realtime: true,
            },
            audio: Some(AudioTrackParams {
                format: AudioFormat {
                    sample_rate: config.audio.sample_rate,
                    channels: config.audio.channels,
                },
                bitrate_kbps: config.audio.bitrate_kbps,
                realtime: true,
            }),
        }
    }

    /// Parameters for re-encoding an existing recording
    pub fn offline(config: &RecorderConfig, source: &dyn MediaReader) -> Self {
        Self {
            container: config.video.container,
            video: VideoTrackParams {
                dimensions: source.video_dimensions(),
                bitrate_kbps: config.video.bitrate_kbps,
                profile: config.video.profile,
                fps: source.frame_rate().unwrap_or(config.video.fps),
                rotation_degrees: source.rotation_degrees(),
                realtime: false,
            },
            audio: source.audio_format().map(|format| AudioTrackParams {
                format,
                bitrate_kbps: config.audio.bitrate_kbps,
                realtime: false,
            }),
        }
    }
}

/// Result of a completed container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerSummary {
    pub path: PathBuf,
    pub video_frames: u64,
    pub audio_chunks: u64,
}

/// Writes encoded tracks into one container file
///
/// Timestamps passed in are relative to the start of the file.
pub trait MediaMuxer: Send {
    /// Whether the video input can take a frame right now
    fn is_video_ready(&self) -> bool;

    /// Whether the audio input can take a chunk right now
    fn is_audio_ready(&self) -> bool;

    fn append_video(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()>;

    fn append_audio(&mut self, chunk: &AudioChunk, pts: Duration) -> Result<()>;

    /// Flush the encoders and write the container trailer
    fn finish(self: Box<Self>) -> Result<MuxerSummary>;
}

/// Reads decoded samples back from a container, in presentation order
pub trait MediaReader: Send {
    fn video_dimensions(&self) -> Dimensions;

    fn audio_format(&self) -> Option<AudioFormat>;

    fn frame_rate(&self) -> Option<u32> {
        None
    }

    fn rotation_degrees(&self) -> u32 {
        0
    }

    /// Next decoded sample, timestamps relative to the start of the file
    fn next_sample(&mut self) -> Result<Option<FrameSample>>;
}

/// Factory for muxers and readers
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_muxer(&self, path: &Path, params: &TrackParams) -> Result<Box<dyn MediaMuxer>>;

    fn open_reader(&self, path: &Path) -> Result<Box<dyn MediaReader>>;
}

/// Whether a real backend was compiled in
pub fn backend_available() -> bool {
    cfg!(feature = "ffmpeg")
}

/// The backend compiled into this build
pub fn default_backend() -> Result<Arc<dyn MediaBackend>> {
    #[cfg(feature = "ffmpeg")]
    {
        ffmpeg::init()?;
        Ok(Arc::new(ffmpeg::FfmpegBackend::new()))
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(ScorecastError::Unsupported(
            "built without a media backend".to_string(),
        ))
    }
}

/// Remove a file if it exists
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ScorecastError::container(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
