//! FFmpeg media backend
//!
//! H.264 (libx264 when available) and AAC in MP4, MOV or Matroska, plus the
//! matching decoder used by the offline compositor.

mod muxer;
mod reader;

pub use muxer::FfmpegMuxer;
pub use reader::FfmpegReader;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::encoder;
use ffmpeg_next::software::scaling;
use std::path::Path;
use std::sync::Once;
use tracing::debug;

use super::{MediaBackend, MediaMuxer, MediaReader, TrackParams};
use crate::config::Container;
use crate::error::{Result, ScorecastError};

static INIT: Once = Once::new();

/// Initialize FFmpeg once per process
pub fn init() -> Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = ffmpeg::init()
            .map_err(|e| ScorecastError::encoder(format!("FFmpeg init failed: {}", e)));
        ffmpeg::log::set_level(ffmpeg::log::Level::Error);
    });
    result
}

/// Whether an H.264 encoder is available
pub fn h264_available() -> bool {
    init().ok();
    find_h264().is_some()
}

/// Whether the AAC encoder is available
pub fn aac_available() -> bool {
    init().ok();
    encoder::find_by_name("aac").is_some()
}

pub(crate) fn find_h264() -> Option<ffmpeg::Codec> {
    encoder::find_by_name("libx264").or_else(|| encoder::find(ffmpeg::codec::Id::H264))
}

pub(crate) fn format_name(container: Container) -> &'static str {
    match container {
        Container::Mp4 => "mp4",
        Container::Mov => "mov",
        Container::Mkv => "matroska",
    }
}

/// Software scaler that can move between threads
///
/// The context is only ever used by the thread that owns the muxer or reader.
pub(crate) struct SendScaler(pub scaling::Context);

// SAFETY: SwsContext has no thread affinity; it is used from one thread at a time.
unsafe impl Send for SendScaler {}

impl std::ops::Deref for SendScaler {
    type Target = scaling::Context;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SendScaler {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// [`MediaBackend`] backed by FFmpeg
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn create_muxer(&self, path: &Path, params: &TrackParams) -> Result<Box<dyn MediaMuxer>> {
        init()?;
        debug!("Opening FFmpeg muxer for {:?}", path);
        Ok(Box::new(FfmpegMuxer::create(path, params)?))
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn MediaReader>> {
        init()?;
        Ok(Box::new(FfmpegReader::open(path)?))
    }
}
