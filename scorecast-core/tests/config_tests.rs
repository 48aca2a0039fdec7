//! Integration tests for configuration system

use scorecast_core::config::{sample_config, ConfigFile, Container, H264Profile, RecorderConfig};
use scorecast_core::overlay::OverlayPosition;
use scorecast_core::types::Dimensions;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = RecorderConfig::default();
    assert_eq!(config.video.profile, H264Profile::High);
    assert_eq!(config.video.container, Container::Mp4);
    assert_eq!(config.audio.sample_rate, 44100);
    assert_eq!(config.audio.channels, 2);
    assert!(config.inference.enabled);
    assert_eq!(config.inference.interval(), Duration::from_millis(200));
    assert_eq!(config.inference.target(), Dimensions::new(640, 360));
    assert!(config.validate_strict().is_ok());
    assert!(config.validate().is_empty());
}

#[test]
fn test_builders() {
    let config = RecorderConfig::default()
        .with_output_dir("/srv/games")
        .with_inference_interval(Duration::from_millis(500));
    assert_eq!(config.output_dir, std::path::PathBuf::from("/srv/games"));
    assert_eq!(config.inference.interval_ms, 500);

    let config = config.without_inference();
    assert!(!config.inference.enabled);
}

#[test]
fn test_strict_validation() {
    let mut config = RecorderConfig::default();
    config.video.bitrate_kbps = 0;
    assert!(config.validate_strict().is_err());

    let mut config = RecorderConfig::default();
    config.video.fps = 0;
    assert!(config.validate_strict().is_err());

    let mut config = RecorderConfig::default();
    config.audio.channels = 9;
    assert!(config.validate_strict().is_err());

    let mut config = RecorderConfig::default();
    config.inference.width = 0;
    assert!(config.validate_strict().is_err());

    // Only checked while inference is on
    config.inference.enabled = false;
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_warnings() {
    let mut config = RecorderConfig::default();
    config.video.bitrate_kbps = 300;
    config.video.profile = H264Profile::Baseline;
    config.inference.pool_size = 0;
    config.overlay.background_opacity = 1.5;

    let warnings = config.validate();
    assert_eq!(warnings.len(), 4);
    assert!(warnings.iter().any(|w| w.contains("300 kbps")));
    assert!(warnings.iter().any(|w| w.contains("Baseline")));
    assert!(warnings.iter().any(|w| w.contains("full resolution")));
    assert!(warnings.iter().any(|w| w.contains("clamped")));
}

#[test]
fn test_profile_names() {
    assert_eq!(H264Profile::Baseline.ffmpeg_name(), "baseline");
    assert_eq!(H264Profile::Main.ffmpeg_name(), "main");
    assert_eq!(H264Profile::High.ffmpeg_name(), "high");
    assert_eq!("HIGH".parse::<H264Profile>().ok(), Some(H264Profile::High));
    assert!("extended".parse::<H264Profile>().is_err());
}

#[test]
fn test_container_extensions() {
    assert_eq!(Container::Mp4.extension(), "mp4");
    assert_eq!(Container::Mov.extension(), "mov");
    assert_eq!(Container::Mkv.extension(), "mkv");
    assert_eq!("mkv".parse::<Container>().ok(), Some(Container::Mkv));
}

#[test]
fn test_config_file_sample_parses() {
    let config: ConfigFile = toml::from_str(&sample_config()).expect("Sample config should parse");
    assert_eq!(config.recorder.inference.pool_size, 3);
    assert_eq!(config.recorder.overlay.position, OverlayPosition::TopLeft);
    assert!(config.recorder.validate_strict().is_ok());
}

#[test]
fn test_config_file_save_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = ConfigFile::default();
    config.recorder.video.bitrate_kbps = 4500;
    config.recorder.video.container = Container::Mov;
    config.recorder.overlay.position = OverlayPosition::BottomRight;
    config
        .save_to(config_path.clone())
        .expect("Failed to save config");

    let loaded = ConfigFile::load_from(config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
}

#[test]
fn test_config_file_load_nonexistent() {
    let result = ConfigFile::load_from("/nonexistent/path/config.toml".into());
    // Missing file means defaults, not an error
    assert_eq!(result.unwrap(), ConfigFile::default());
}

#[test]
fn test_config_file_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[video]\nbitrate_kbps = \"fast\"\n").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}
