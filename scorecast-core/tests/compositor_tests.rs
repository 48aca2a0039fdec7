//! Integration tests for the offline compositor and score timeline

mod mocks;

use mocks::{audio_chunk, frames_30fps, MockBackend, MockSource};
use scorecast_core::compositor::{overlay_output_path, CompositeJob, CompositeOutcome, Compositor};
use scorecast_core::config::RecorderConfig;
use scorecast_core::overlay::OverlayRenderer;
use scorecast_core::timeline::{ScoreSnapshot, ScoreTimelineEntry, Timeline, TimelineTracker};
use scorecast_core::types::{AudioFormat, Dimensions, FrameSample};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn entry(ms: u64, home: u32, away: u32) -> ScoreTimelineEntry {
    ScoreTimelineEntry {
        elapsed_ms: ms,
        score: ScoreSnapshot::new(home, away),
        clock: String::new(),
        period: "1ST".into(),
        running: true,
    }
}

fn timeline() -> Timeline {
    let mut timeline = Timeline::new("Lions", "Bears", Duration::from_secs(20 * 60));
    timeline.push(entry(0, 0, 0));
    timeline.push(entry(500, 1, 0));
    timeline
}

/// One second of 320x180 video with audio, registered with the backend
fn raw_recording(dir: &TempDir, backend: &MockBackend) -> PathBuf {
    let path = dir.path().join("game.mp4");
    let mut samples: Vec<FrameSample> = frames_30fps(320, 180, 0, 30)
        .into_iter()
        .map(FrameSample::from)
        .collect();
    samples.insert(1, audio_chunk(0).into());
    samples.push(audio_chunk(23).into());

    backend.add_source(
        &path,
        MockSource {
            dimensions: Dimensions::new(320, 180),
            audio: Some(AudioFormat::default()),
            samples,
            fail_after: None,
        },
    );
    path
}

fn compositor(backend: &Arc<MockBackend>) -> Compositor {
    Compositor::new(RecorderConfig::default(), backend.clone())
}

#[tokio::test]
async fn test_composite_burns_in_score_at_each_time() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);

    let outcome = compositor(&backend)
        .composite(CompositeJob::new(&raw, timeline()))
        .await;

    let expected_output = overlay_output_path(&raw);
    assert_eq!(
        outcome,
        CompositeOutcome::Composited {
            output: expected_output.clone(),
            raw: raw.clone(),
        }
    );
    assert!(outcome.warning().is_none());

    let file = backend.file(&expected_output).unwrap();
    assert!(file.finished);
    assert_eq!(file.video.len(), 30);
    assert_eq!(file.audio.len(), 2);

    let params = file.params.unwrap();
    assert!(!params.video.realtime);
    assert_eq!(params.video.dimensions, Dimensions::new(320, 180));

    // Each frame shows the score in effect at its own timestamp
    let renderer = OverlayRenderer::new(RecorderConfig::default().overlay);
    let timeline = timeline();
    for (frame, pts) in &file.video {
        let mut expected = mocks::video_frame(320, 180, pts.as_millis() as u64);
        let state = timeline.snapshot_at(*pts).unwrap();
        renderer.render_snapshot(&mut expected, &state);
        assert_eq!(frame.data, expected.data, "frame at {:?}", pts);
    }

    let before = &file.video[14].0;
    let after = &file.video[15].0;
    assert_ne!(before.data, after.data);
}

#[tokio::test]
async fn test_empty_timeline_keeps_raw() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);

    let outcome = compositor(&backend)
        .composite(CompositeJob::new(&raw, Timeline::default()))
        .await;
    assert_eq!(outcome, CompositeOutcome::Skipped { raw: raw.clone() });
    assert_eq!(outcome.final_path(), raw);
    assert_eq!(backend.state.lock().muxers_created, 0);
}

#[tokio::test]
async fn test_game_without_updates_skips_compositing() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);

    let mut tracker = TimelineTracker::new();
    tracker.start("Lions", "Bears", Duration::from_secs(600));
    let timeline = tracker.stop();
    assert!(timeline.is_empty());

    let outcome = compositor(&backend)
        .composite(CompositeJob::new(&raw, timeline))
        .await;
    assert_eq!(outcome, CompositeOutcome::Skipped { raw: raw.clone() });
    assert!(!overlay_output_path(&raw).exists());
}

#[tokio::test]
async fn test_unreadable_raw_falls_back() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = dir.path().join("missing.mp4");

    let outcome = compositor(&backend)
        .composite(CompositeJob::new(&raw, timeline()))
        .await;
    assert!(matches!(outcome, CompositeOutcome::Fallback { .. }));
    assert_eq!(outcome.final_path(), raw);
    assert!(outcome.warning().unwrap().contains("missing.mp4"));
}

#[tokio::test]
async fn test_decode_failure_removes_partial_output() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);
    backend
        .state
        .lock()
        .sources
        .get_mut(&raw)
        .unwrap()
        .fail_after = Some(10);

    let outcome = compositor(&backend)
        .composite(CompositeJob::new(&raw, timeline()))
        .await;
    match &outcome {
        CompositeOutcome::Fallback { raw: kept, error } => {
            assert_eq!(kept, &raw);
            assert!(error.contains("mock decode failure"));
        }
        other => panic!("expected fallback, got {:?}", other),
    }
    assert!(!overlay_output_path(&raw).exists());
    assert!(raw.exists());
}

#[tokio::test]
async fn test_output_must_differ_from_raw() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);

    let job = CompositeJob::new(&raw, timeline()).with_output(&raw);
    let outcome = compositor(&backend).composite(job).await;
    assert!(matches!(outcome, CompositeOutcome::Fallback { .. }));
    assert!(raw.exists());
}

#[tokio::test]
async fn test_run_reports_through_completion() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let raw = raw_recording(&dir, &backend);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = compositor(&backend).run(&raw, timeline(), move |outcome| {
        let _ = tx.send(outcome);
    });
    handle.await.unwrap();

    let outcome = rx.await.unwrap();
    assert!(outcome.is_composited());
    assert_eq!(outcome.final_path(), overlay_output_path(&raw));
}

#[tokio::test(start_paused = true)]
async fn test_tracked_game_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let mut tracker = TimelineTracker::new();
    tracker.start("Lions", "Bears", Duration::from_secs(15 * 60));
    tracker.set_event_name("Spring Cup");

    tokio::time::advance(Duration::from_secs(90)).await;
    tracker.update_score(1, 0);
    tokio::time::advance(Duration::from_secs(30)).await;
    tracker.update_clock("13:30", "1ST");

    let timeline = tracker.stop();
    let path = dir.path().join("timelines").join("game.json");
    timeline.save(&path).unwrap();

    let loaded = Timeline::load(&path).unwrap();
    assert_eq!(loaded, timeline);
    assert_eq!(loaded.len(), 2);
    assert!(loaded.snapshot_at(Duration::from_secs(60)).is_none());

    let at_100s = loaded.snapshot_at(Duration::from_secs(100)).unwrap();
    assert_eq!((at_100s.home_score, at_100s.away_score), (1, 0));
    assert_eq!(at_100s.event_name, "Spring Cup");
    assert_eq!(at_100s.clock, "");

    let at_end = loaded.snapshot_at(Duration::from_secs(600)).unwrap();
    assert_eq!(at_end.clock, "13:30");
    assert_eq!(at_end.period, "1ST");
}
