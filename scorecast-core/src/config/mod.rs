//! Configuration types for Scorecast
//!
//! Provides encoder settings, inference sampling parameters, overlay layout
//! options and where recordings land on disk.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::overlay::OverlayPosition;
use crate::types::Dimensions;

/// H.264 profile used for the video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    /// Plays everywhere, no B-frames
    Baseline,
    Main,
    /// Best quality per bit, supported by every current device
    #[default]
    High,
}

impl H264Profile {
    /// Profile name as understood by FFmpeg's H.264 encoders
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Main => "main",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for H264Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" | "base" => Ok(Self::Baseline),
            "main" => Ok(Self::Main),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown H.264 profile: {}", s)),
        }
    }
}

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mov,
    Mkv,
}

impl Container {
    /// File extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }
}

impl std::str::FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim_start_matches('.') {
            "mp4" | "m4v" => Ok(Self::Mp4),
            "mov" | "qt" => Ok(Self::Mov),
            "mkv" | "matroska" => Ok(Self::Mkv),
            _ => Err(format!("Unknown container: {}", s)),
        }
    }
}

/// Video track settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// H.264 profile
    pub profile: H264Profile,
    /// Nominal frame rate, used for the track time base
    pub fps: u32,
    /// Container written to disk
    pub container: Container,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 6000,
            profile: H264Profile::High,
            fps: 30,
            container: Container::Mp4,
        }
    }
}

/// Audio track settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
    /// AAC bitrate in kbps
    pub bitrate_kbps: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bitrate_kbps: 128,
        }
    }
}

/// Down-sampled frame delivery for the inference consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Deliver frames at all
    pub enabled: bool,
    /// Minimum time between two deliveries in milliseconds
    pub interval_ms: u64,
    /// Target width
    pub width: u32,
    /// Target height
    pub height: u32,
    /// Frames waiting for the consumer before new ones are dropped
    pub queue_depth: usize,
    /// Reusable output buffers
    pub pool_size: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 200,
            width: 640,
            height: 360,
            queue_depth: 1,
            pool_size: 3,
        }
    }
}

impl InferenceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn target(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Scoreboard overlay layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Burn the scoreboard into live recordings
    pub enabled: bool,
    /// Corner the scoreboard sits in
    pub position: OverlayPosition,
    /// Font scale (1.0 = 7px glyphs)
    pub font_scale: f32,
    /// Background opacity (0.0 - 1.0)
    pub background_opacity: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            position: OverlayPosition::TopLeft,
            font_scale: 3.0,
            background_opacity: 0.6,
        }
    }
}

/// Complete recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory recordings are written to
    pub output_dir: PathBuf,
    /// Frames buffered between the capture source and the processing thread
    pub frame_queue_depth: usize,
    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub inference: InferenceSettings,
    pub overlay: OverlaySettings,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            frame_queue_depth: 4,
            video: VideoSettings::default(),
            audio: AudioSettings::default(),
            inference: InferenceSettings::default(),
            overlay: OverlaySettings::default(),
        }
    }
}

/// `~/Videos/Scorecast`, or the temp dir when there is no video dir
pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .map(|dir| dir.join("Scorecast"))
        .unwrap_or_else(|| std::env::temp_dir().join("scorecast"))
}

impl RecorderConfig {
    /// Set the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the inference sampling interval
    pub fn with_inference_interval(mut self, interval: Duration) -> Self {
        self.inference.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Disable down-sampled delivery
    pub fn without_inference(mut self) -> Self {
        self.inference.enabled = false;
        self
    }

    /// Validate configuration and return warnings
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.video.bitrate_kbps < 1000 {
            warnings.push(format!(
                "Video bitrate {} kbps is very low; fast motion will smear.",
                self.video.bitrate_kbps
            ));
        }
        if self.video.bitrate_kbps > 50_000 {
            warnings.push(format!(
                "Video bitrate {} kbps is excessive for a phone-sized recording.",
                self.video.bitrate_kbps
            ));
        }
        if self.video.profile == H264Profile::Baseline {
            warnings.push(
                "Baseline profile needs roughly 30% more bitrate for the same quality."
                    .to_string(),
            );
        }
        if self.inference.enabled && self.inference.interval_ms < 33 {
            warnings.push(format!(
                "Inference interval {} ms is shorter than one frame at 30fps; every frame will be sampled.",
                self.inference.interval_ms
            ));
        }
        if self.inference.enabled && self.inference.pool_size == 0 {
            warnings.push(
                "Inference pool size 0 means every sample falls back to full resolution."
                    .to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.overlay.background_opacity) {
            warnings.push(format!(
                "Overlay opacity {} is outside 0.0-1.0 and will be clamped.",
                self.overlay.background_opacity
            ));
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    pub fn validate_strict(&self) -> Result<(), String> {
        if self.video.bitrate_kbps == 0 {
            return Err("Video bitrate cannot be zero".to_string());
        }
        if self.video.fps == 0 || self.video.fps > 240 {
            return Err(format!("Frame rate {} is outside 1-240", self.video.fps));
        }
        if self.audio.sample_rate == 0 {
            return Err("Audio sample rate cannot be zero".to_string());
        }
        if !(1..=8).contains(&self.audio.channels) {
            return Err(format!(
                "Audio channel count {} is outside 1-8",
                self.audio.channels
            ));
        }
        if self.inference.enabled && self.inference.target().is_empty() {
            return Err("Inference target size cannot be zero".to_string());
        }
        if self.frame_queue_depth == 0 {
            return Err("Frame queue depth must be at least 1".to_string());
        }
        if self.overlay.font_scale <= 0.0 {
            return Err("Overlay font scale must be positive".to_string());
        }

        Ok(())
    }
}
