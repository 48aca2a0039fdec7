//! Integration tests for the live recorder
//!
//! Every test drives a real processing thread against the in-memory backend
//! from `mocks`.

mod mocks;

use mocks::{audio_chunk, frames_30fps, video_frame, MockBackend};
use scorecast_core::config::RecorderConfig;
use scorecast_core::error::ScorecastError;
use scorecast_core::overlay::{OverlayRenderer, OverlayState};
use scorecast_core::recorder::{Recorder, RecorderEvent, RecorderState};
use scorecast_core::types::{Dimensions, Orientation};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn test_config(dir: &Path) -> RecorderConfig {
    let mut config = RecorderConfig::default()
        .with_output_dir(dir)
        .without_inference();
    config.frame_queue_depth = 256;
    config
}

fn recorder(dir: &TempDir) -> (Recorder, Arc<MockBackend>) {
    let backend = MockBackend::new();
    let recorder = Recorder::new(test_config(dir.path()), backend.clone()).unwrap();
    (recorder, backend)
}

async fn next_event(rx: &mut broadcast::Receiver<RecorderEvent>) -> RecorderEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for recorder event")
        .expect("event channel closed")
}

fn drain_events(rx: &mut broadcast::Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_start_record_stop_produces_file() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    assert!(path.starts_with(dir.path()));
    assert_eq!(recorder.state(), RecorderState::Recording);

    let input = recorder.frame_input();
    for frame in frames_30fps(320, 180, 10_000, 30) {
        assert!(input.push(frame));
    }

    let output = recorder.stop_and_wait().await;
    assert_eq!(output.as_deref(), Some(path.as_path()));
    assert_eq!(recorder.state(), RecorderState::Idle);
    assert!(path.exists());

    let file = backend.file(&path).unwrap();
    assert!(file.finished);
    assert_eq!(file.video.len(), 30);
    // Timestamps are relative to the first written frame
    assert_eq!(file.video_pts()[0], Duration::ZERO);
    assert_eq!(file.video_pts()[1], Duration::from_millis(33));

    let params = file.params.unwrap();
    assert_eq!(params.video.dimensions, Dimensions::new(320, 180));
    assert_eq!(params.video.rotation_degrees, 0);

    let events = drain_events(&mut events);
    assert_eq!(events[0], RecorderEvent::Started { path: path.clone() });
    assert_eq!(
        events[1],
        RecorderEvent::Configured {
            dimensions: Dimensions::new(320, 180)
        }
    );
    assert_eq!(events[2], RecorderEvent::Writing);
    assert_eq!(
        events.last(),
        Some(&RecorderEvent::Finished {
            path: Some(path),
            video_frames: 30
        })
    );

    let stats = recorder.stats();
    assert_eq!(stats.video_received, 30);
    assert_eq!(stats.video_written, 30);
}

#[tokio::test]
async fn test_orientation_is_stored_as_rotation() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::Portrait).await.unwrap();
    recorder.frame_input().push(video_frame(180, 320, 0));
    recorder.stop_and_wait().await.unwrap();

    let params = backend.file(&path).unwrap().params.unwrap();
    assert_eq!(
        params.video.rotation_degrees,
        Orientation::Portrait.rotation_degrees()
    );
}

#[tokio::test]
async fn test_stop_without_frames_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    assert_eq!(recorder.stop_and_wait().await, None);
    assert!(!path.exists());
    assert_eq!(backend.state.lock().muxers_created, 0);
}

#[tokio::test]
async fn test_second_stop_is_none() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, _backend) = recorder(&dir);

    recorder.start(Orientation::LandscapeRight).await.unwrap();
    recorder.frame_input().push(video_frame(320, 180, 0));
    assert!(recorder.stop_and_wait().await.is_some());

    let second = recorder.stop().await;
    assert!(second.is_none());
    assert_eq!(second.await, None);
}

#[tokio::test]
async fn test_stop_waits_for_queued_frames() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();
    for frame in frames_30fps(320, 180, 0, 100) {
        input.push(frame);
    }
    // Stop returns before the file is done; awaiting the result waits for it
    let pending = recorder.stop().await;
    assert_eq!(pending.await, Some(path.clone()));
    assert_eq!(backend.file(&path).unwrap().video.len(), 100);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, _backend) = recorder(&dir);

    recorder.start(Orientation::LandscapeRight).await.unwrap();
    let err = recorder
        .start_at(dir.path().join("other.mp4"), Orientation::LandscapeRight)
        .await
        .unwrap_err();
    assert!(matches!(err, ScorecastError::SessionAlreadyRunning));
}

#[tokio::test]
async fn test_full_queue_drops_frames() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.state.lock().open_delay = Some(Duration::from_millis(300));

    let mut config = test_config(dir.path());
    config.frame_queue_depth = 2;
    let mut recorder = Recorder::new(config, backend.clone()).unwrap();

    recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();

    // The first frame holds the processing thread in configuration
    let accepted = frames_30fps(320, 180, 0, 12)
        .into_iter()
        .filter(|frame| input.push(frame.clone()))
        .count();
    assert!(accepted < 12);

    recorder.stop_and_wait().await.unwrap();
    let stats = recorder.stats();
    assert_eq!(stats.queue_dropped, 12 - accepted as u64);
    assert_eq!(stats.video_written, accepted as u64);
}

#[tokio::test]
async fn test_configuration_failure_ends_session() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    backend.state.lock().fail_open = true;
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    assert!(matches!(next_event(&mut events).await, RecorderEvent::Started { .. }));

    recorder.frame_input().push(video_frame(320, 180, 0));
    match next_event(&mut events).await {
        RecorderEvent::Failed { reason } => assert!(reason.contains("mock open failure")),
        other => panic!("expected failure, got {:?}", other),
    }

    assert_eq!(recorder.state(), RecorderState::Failed);
    assert!(!recorder.is_recording());

    // Later frames are ignored and stopping yields nothing
    recorder.frame_input().push(video_frame(320, 180, 33));
    assert_eq!(recorder.stop_and_wait().await, None);
    assert!(!path.exists());
    assert_eq!(recorder.state(), RecorderState::Idle);
}

#[tokio::test]
async fn test_restart_after_configuration_failure() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    backend.state.lock().fail_open = true;
    let mut events = recorder.subscribe();

    let failed = recorder
        .start_at(dir.path().join("first.mp4"), Orientation::LandscapeRight)
        .await
        .unwrap();
    next_event(&mut events).await;
    recorder.frame_input().push(video_frame(320, 180, 0));
    assert!(matches!(next_event(&mut events).await, RecorderEvent::Failed { .. }));
    assert_eq!(recorder.state(), RecorderState::Failed);

    // A failed session does not block the next one
    backend.state.lock().fail_open = false;
    let path = recorder
        .start_at(dir.path().join("second.mp4"), Orientation::LandscapeRight)
        .await
        .unwrap();
    assert_eq!(recorder.state(), RecorderState::Recording);
    for frame in frames_30fps(320, 180, 0, 3) {
        recorder.frame_input().push(frame);
    }
    assert_eq!(recorder.stop_and_wait().await, Some(path.clone()));
    assert!(!failed.exists());
    assert_eq!(backend.file(&path).unwrap().video.len(), 3);
}

#[tokio::test]
async fn test_finalize_failure_removes_file() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    backend.state.lock().fail_finish = true;
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    recorder.frame_input().push(video_frame(320, 180, 0));
    assert_eq!(recorder.stop_and_wait().await, None);
    assert!(!path.exists());

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, RecorderEvent::Failed { reason } if reason.contains("trailer"))));
    assert!(events.contains(&RecorderEvent::Finished {
        path: None,
        video_frames: 1
    }));
}

#[tokio::test]
async fn test_zero_time_is_first_accepted_frame() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    backend.set_video_ready(false);
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    next_event(&mut events).await;

    // Configures the session, but the muxer refuses it
    recorder.frame_input().push(video_frame(320, 180, 1_000));
    assert!(matches!(next_event(&mut events).await, RecorderEvent::Configured { .. }));

    backend.set_video_ready(true);
    recorder.frame_input().push(video_frame(320, 180, 1_500));
    recorder.frame_input().push(video_frame(320, 180, 1_533));
    recorder.stop_and_wait().await.unwrap();

    let file = backend.file(&path).unwrap();
    assert_eq!(
        file.video_pts(),
        vec![Duration::ZERO, Duration::from_millis(33)]
    );
    assert_eq!(recorder.stats().video_not_ready, 1);
}

#[tokio::test]
async fn test_audio_before_video_is_dropped() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();
    input.push(audio_chunk(0));
    input.push(video_frame(320, 180, 10));
    input.push(audio_chunk(5));
    input.push(audio_chunk(20));
    recorder.stop_and_wait().await.unwrap();

    // Before the zero time is also dropped
    let file = backend.file(&path).unwrap();
    assert_eq!(file.audio, vec![Duration::from_millis(10)]);
    let stats = recorder.stats();
    assert_eq!(stats.audio_written, 1);
    assert_eq!(stats.audio_dropped, 2);
}

#[tokio::test]
async fn test_size_change_is_conformed() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();
    input.push(video_frame(320, 180, 0));
    input.push(video_frame(640, 360, 33));
    recorder.stop_and_wait().await.unwrap();

    let file = backend.file(&path).unwrap();
    assert_eq!(file.video.len(), 2);
    assert!(file
        .video
        .iter()
        .all(|(frame, _)| frame.dimensions() == Dimensions::new(320, 180)));
}

#[tokio::test]
async fn test_latest_overlay_state_wins() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    for home in 0..5 {
        recorder.update_overlay(|s| {
            s.home_name = "Lions".into();
            s.away_name = "Bears".into();
            s.home_score = home;
        });
    }
    recorder.frame_input().push(video_frame(320, 180, 0));
    recorder.stop_and_wait().await.unwrap();

    let mut expected_state = OverlayState::new("Lions", "Bears");
    expected_state.home_score = 4;
    let renderer = OverlayRenderer::new(recorder.config().overlay.clone());
    let mut expected = video_frame(320, 180, 0);
    renderer.render_snapshot(&mut expected, &expected_state);

    let file = backend.file(&path).unwrap();
    assert_eq!(file.video[0].0.data, expected.data);
    assert_ne!(file.video[0].0.data, video_frame(320, 180, 0).data);
}

#[tokio::test]
async fn test_reset_discards_session() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, _backend) = recorder(&dir);
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    recorder.frame_input().push(video_frame(320, 180, 0));
    recorder.reset().await.unwrap();
    assert_eq!(recorder.state(), RecorderState::Idle);

    loop {
        if next_event(&mut events).await == RecorderEvent::Reset {
            break;
        }
    }
    assert!(!path.exists());

    // A new session can start right away
    let next = recorder
        .start_at(dir.path().join("next.mp4"), Orientation::LandscapeRight)
        .await
        .unwrap();
    recorder.frame_input().push(video_frame(320, 180, 0));
    assert_eq!(recorder.stop_and_wait().await, Some(next));
}

#[tokio::test]
async fn test_inference_frames_are_downscaled() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let mut config = test_config(dir.path());
    config.inference.enabled = true;
    config.inference.width = 160;
    config.inference.height = 90;
    config.inference.queue_depth = 8;
    let mut recorder = Recorder::new(config, backend).unwrap();
    let mut inference = recorder.take_inference_frames().unwrap();
    assert!(recorder.take_inference_frames().is_none());

    // Sampling runs even when nothing is recording
    let input = recorder.frame_input();
    for frame in frames_30fps(640, 360, 0, 10) {
        input.push(frame);
    }

    let first = tokio::time::timeout(Duration::from_secs(5), inference.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(first.is_scaled());
    assert_eq!(first.dimensions(), Dimensions::new(160, 90));
    assert_eq!(first.pts(), Duration::ZERO);

    let second = tokio::time::timeout(Duration::from_secs(5), inference.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(second.pts() > Duration::from_millis(200));
}

#[tokio::test]
async fn test_shutdown_finalizes_active_session() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    recorder.frame_input().push(video_frame(320, 180, 0));
    let input = recorder.frame_input();

    assert_eq!(recorder.shutdown().await, Some(path.clone()));
    assert!(backend.file(&path).unwrap().finished);
    assert!(!input.push(video_frame(320, 180, 33)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.frame_queue_depth = 0;

    let err = Recorder::new(config, MockBackend::new()).unwrap_err();
    assert!(matches!(err, ScorecastError::Config(_)));
}

#[tokio::test]
async fn test_three_frames_then_stop() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();
    for ms in [0, 100, 200] {
        assert!(input.push(video_frame(320, 180, ms)));
    }

    assert_eq!(recorder.stop_and_wait().await, Some(path.clone()));
    let file = backend.file(&path).unwrap();
    assert_eq!(
        file.video_pts(),
        vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(200)
        ]
    );
    assert_eq!(recorder.stats().video_written, 3);
}

#[tokio::test]
async fn test_not_ready_frames_are_skipped_mid_session() {
    let dir = TempDir::new().unwrap();
    let (mut recorder, backend) = recorder(&dir);
    backend.script_video_ready(&[true, false, true, false, true]);
    let mut events = recorder.subscribe();

    let path = recorder.start(Orientation::LandscapeRight).await.unwrap();
    let input = recorder.frame_input();
    for frame in frames_30fps(320, 180, 0, 5) {
        assert!(input.push(frame));
    }

    assert_eq!(recorder.stop_and_wait().await, Some(path.clone()));
    let file = backend.file(&path).unwrap();
    assert_eq!(
        file.video_pts(),
        vec![
            Duration::ZERO,
            Duration::from_millis(66),
            Duration::from_millis(133)
        ]
    );

    let stats = recorder.stats();
    assert_eq!(stats.video_received, 5);
    assert_eq!(stats.video_written, 3);
    assert_eq!(stats.video_not_ready, 2);
    assert_eq!(stats.video_failed, 0);

    let events = drain_events(&mut events);
    assert!(!events.iter().any(|e| matches!(e, RecorderEvent::Failed { .. })));
    assert!(events.contains(&RecorderEvent::Finished {
        path: Some(path),
        video_frames: 3
    }));
}
