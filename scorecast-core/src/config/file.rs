//! Configuration file loading and saving
//!
//! Loads user configuration from `~/.config/scorecast/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::RecorderConfig;
use crate::error::{Result, ScorecastError};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Recorder settings, stored at the top level of the file
    #[serde(flatten)]
    pub recorder: RecorderConfig,
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("scorecast").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("scorecast")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/scorecast/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ScorecastError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| ScorecastError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScorecastError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ScorecastError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| ScorecastError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        std::fs::create_dir_all(path.parent().unwrap_or(&path))
            .map_err(|e| ScorecastError::Config(format!("Failed to create config directory: {}", e)))?;
        std::fs::write(&path, sample_config())
            .map_err(|e| ScorecastError::Config(format!("Failed to write config file: {}", e)))?;
        info!("Wrote sample configuration to {:?}", path);
        Ok(true)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Scorecast Configuration

# Where recordings are written (one file per game)
output_dir = "/tmp/scorecast"

# Frames buffered between the camera and the processing thread.
# When full, new frames are dropped rather than blocking the camera.
frame_queue_depth = 4

[video]
# Target bitrate in kbps
bitrate_kbps = 6000

# H.264 profile: baseline, main, high
profile = "high"

# Nominal frame rate (time base only; real timestamps come from the camera)
fps = 30

# Container: mp4, mov, mkv
container = "mp4"

[audio]
sample_rate = 44100
channels = 2
bitrate_kbps = 128

[inference]
# Feed a down-sampled copy of the video to the detector
enabled = true

# Minimum milliseconds between two detector frames
interval_ms = 200

# Detector input size
width = 640
height = 360

# Frames waiting for the detector before newer ones are dropped
queue_depth = 1

# Reusable output buffers
pool_size = 3

[overlay]
enabled = true

# Corner: top-left, top-right, bottom-left, bottom-right
position = "top-left"

# Glyph scale (1.0 = 7px tall)
font_scale = 3.0

# Scoreboard background opacity (0.0 - 1.0)
background_opacity = 0.6
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Container, H264Profile};
    use crate::overlay::OverlayPosition;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.recorder.video.profile, H264Profile::High);
        assert_eq!(config.recorder.inference.interval_ms, 200);
    }

    #[test]
    fn test_sample_config_parses() {
        let config: ConfigFile = toml::from_str(&sample_config()).unwrap();
        assert_eq!(config.recorder.video.container, Container::Mp4);
        assert_eq!(config.recorder.overlay.position, OverlayPosition::TopLeft);
        assert_eq!(config.recorder.output_dir, PathBuf::from("/tmp/scorecast"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ConfigFile = toml::from_str("[video]\nbitrate_kbps = 2500\n").unwrap();
        assert_eq!(config.recorder.video.bitrate_kbps, 2500);
        assert_eq!(config.recorder.video.fps, 30);
        assert_eq!(config.recorder.audio.sample_rate, 44100);
    }
}
