//! Core types for Scorecast
//!
//! These types represent the media samples and session identifiers that flow
//! through the recording pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Global handle counter for unique session IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Kind of media carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero-area dimensions cannot be encoded or scaled
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Device orientation, sampled once when a recording starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    LandscapeRight,
    LandscapeLeft,
    Portrait,
    PortraitUpsideDown,
}

impl Orientation {
    /// Clockwise rotation a player must apply when displaying the track
    pub fn rotation_degrees(&self) -> u32 {
        match self {
            Self::LandscapeRight => 0,
            Self::Portrait => 90,
            Self::LandscapeLeft => 180,
            Self::PortraitUpsideDown => 270,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "landscape-right" | "landscape" | "lr" => Some(Self::LandscapeRight),
            "landscape-left" | "ll" => Some(Self::LandscapeLeft),
            "portrait" | "p" => Some(Self::Portrait),
            "portrait-upside-down" | "upside-down" => Some(Self::PortraitUpsideDown),
            _ => None,
        }
    }
}

/// Video frame in packed BGRA
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row (at least `width * 4`)
    pub stride: u32,
    /// Pixel data, `stride * height` bytes
    pub data: Vec<u8>,
    /// Presentation timestamp
    pub pts: Duration,
}

impl VideoFrame {
    /// Wrap tightly packed BGRA data
    pub fn new(width: u32, height: u32, data: Vec<u8>, pts: Duration) -> Self {
        Self {
            width,
            height,
            stride: width * 4,
            data,
            pts,
        }
    }

    /// A frame filled with a single BGRA color
    pub fn solid(width: u32, height: u32, color: [u8; 4], pts: Duration) -> Self {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, data, pts)
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether the buffer is large enough for the advertised geometry
    pub fn is_well_formed(&self) -> bool {
        !self.dimensions().is_empty()
            && self.stride >= self.width * 4
            && self.data.len() >= self.stride as usize * self.height as usize
    }

    /// Read one BGRA pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride as usize + x as usize * 4;
        self.data
            .get(idx..idx + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Audio format information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
    /// Number of channels (1=mono, 2=stereo)
    pub channels: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Chunk of interleaved f32 audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Audio format
    pub format: AudioFormat,
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Presentation timestamp
    pub pts: Duration,
}

impl AudioChunk {
    pub fn new(format: AudioFormat, samples: Vec<f32>, pts: Duration) -> Self {
        Self {
            format,
            samples,
            pts,
        }
    }

    /// A chunk of silence lasting `frames` samples per channel
    pub fn silence(format: AudioFormat, frames: usize, pts: Duration) -> Self {
        Self::new(format, vec![0.0; frames * format.channels as usize], pts)
    }

    /// Number of samples per channel
    pub fn sample_count(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    /// Duration of this chunk
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.format.sample_rate as f64)
    }
}

/// One captured unit of video or audio
#[derive(Debug, Clone)]
pub enum FrameSample {
    Video(VideoFrame),
    Audio(AudioChunk),
}

impl FrameSample {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Video(_) => MediaKind::Video,
            Self::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn pts(&self) -> Duration {
        match self {
            Self::Video(frame) => frame.pts,
            Self::Audio(chunk) => chunk.pts,
        }
    }
}

impl From<VideoFrame> for FrameSample {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

impl From<AudioChunk> for FrameSample {
    fn from(chunk: AudioChunk) -> Self {
        Self::Audio(chunk)
    }
}
