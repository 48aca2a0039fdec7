//! Mock infrastructure for testing
//!
//! An in-memory [`MediaBackend`] that records everything handed to its muxers
//! and plays back scripted samples from its readers.

#![allow(dead_code)]

use parking_lot::Mutex;
use scorecast_core::error::{Result, ScorecastError};
use scorecast_core::media::{MediaBackend, MediaMuxer, MediaReader, MuxerSummary, TrackParams};
use scorecast_core::types::{AudioChunk, AudioFormat, Dimensions, FrameSample, VideoFrame};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Everything one muxer received
#[derive(Debug, Default, Clone)]
pub struct MockFile {
    pub params: Option<TrackParams>,
    pub video: Vec<(VideoFrame, Duration)>,
    pub audio: Vec<Duration>,
    pub finished: bool,
}

impl MockFile {
    pub fn video_pts(&self) -> Vec<Duration> {
        self.video.iter().map(|(_, pts)| *pts).collect()
    }
}

/// Scripted behaviour shared by the backend and everything it creates
#[derive(Debug)]
pub struct MockState {
    pub fail_open: bool,
    pub fail_finish: bool,
    pub fail_append: bool,
    pub video_ready: bool,
    /// Answers for upcoming video readiness checks, before `video_ready` applies
    pub video_ready_script: VecDeque<bool>,
    pub audio_ready: bool,
    /// Time `create_muxer` takes, to hold up the processing thread
    pub open_delay: Option<Duration>,
    pub files: HashMap<PathBuf, MockFile>,
    pub sources: HashMap<PathBuf, MockSource>,
    pub muxers_created: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            fail_open: false,
            fail_finish: false,
            fail_append: false,
            video_ready: true,
            video_ready_script: VecDeque::new(),
            audio_ready: true,
            open_delay: None,
            files: HashMap::new(),
            sources: HashMap::new(),
            muxers_created: 0,
        }
    }
}

/// Samples a mock reader plays back
#[derive(Debug, Clone)]
pub struct MockSource {
    pub dimensions: Dimensions,
    pub audio: Option<AudioFormat>,
    pub samples: Vec<FrameSample>,
    /// Fail after yielding this many samples
    pub fail_after: Option<usize>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn file(&self, path: &Path) -> Option<MockFile> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn add_source(&self, path: impl Into<PathBuf>, source: MockSource) {
        let path = path.into();
        std::fs::write(&path, b"raw").ok();
        self.state.lock().sources.insert(path, source);
    }

    pub fn set_video_ready(&self, ready: bool) {
        self.state.lock().video_ready = ready;
    }

    /// Script the next video readiness checks, one per frame
    pub fn script_video_ready(&self, answers: &[bool]) {
        self.state.lock().video_ready_script.extend(answers);
    }
}

struct MockMuxer {
    path: PathBuf,
    state: Arc<Mutex<MockState>>,
}

impl MediaMuxer for MockMuxer {
    fn is_video_ready(&self) -> bool {
        let mut state = self.state.lock();
        match state.video_ready_script.pop_front() {
            Some(ready) => ready,
            None => state.video_ready,
        }
    }

    fn is_audio_ready(&self) -> bool {
        self.state.lock().audio_ready
    }

    fn append_video(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_append {
            return Err(ScorecastError::encoder("mock append failure"));
        }
        if let Some(file) = state.files.get_mut(&self.path) {
            file.video.push((frame.clone(), pts));
        }
        Ok(())
    }

    fn append_audio(&mut self, _chunk: &AudioChunk, pts: Duration) -> Result<()> {
        if let Some(file) = self.state.lock().files.get_mut(&self.path) {
            file.audio.push(pts);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<MuxerSummary> {
        let mut state = self.state.lock();
        if state.fail_finish {
            return Err(ScorecastError::container("mock trailer failure"));
        }
        let file = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| ScorecastError::container("file vanished"))?;
        file.finished = true;
        std::fs::write(&self.path, b"finished")?;
        Ok(MuxerSummary {
            path: self.path.clone(),
            video_frames: file.video.len() as u64,
            audio_chunks: file.audio.len() as u64,
        })
    }
}

struct MockReader {
    source: MockSource,
    queue: VecDeque<FrameSample>,
    yielded: usize,
}

impl MediaReader for MockReader {
    fn video_dimensions(&self) -> Dimensions {
        self.source.dimensions
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        self.source.audio
    }

    fn next_sample(&mut self) -> Result<Option<FrameSample>> {
        if self.source.fail_after == Some(self.yielded) {
            return Err(ScorecastError::decoder("mock decode failure"));
        }
        self.yielded += 1;
        Ok(self.queue.pop_front())
    }
}

impl MediaBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_muxer(&self, path: &Path, params: &TrackParams) -> Result<Box<dyn MediaMuxer>> {
        let delay = self.state.lock().open_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.fail_open {
            return Err(ScorecastError::container("mock open failure"));
        }
        std::fs::write(path, b"header")?;
        state.muxers_created += 1;
        state.files.insert(
            path.to_path_buf(),
            MockFile {
                params: Some(params.clone()),
                ..Default::default()
            },
        );
        Ok(Box::new(MockMuxer {
            path: path.to_path_buf(),
            state: self.state.clone(),
        }))
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn MediaReader>> {
        let source = self
            .state
            .lock()
            .sources
            .get(path)
            .cloned()
            .ok_or_else(|| ScorecastError::decoder(format!("no such file: {}", path.display())))?;
        Ok(Box::new(MockReader {
            queue: source.samples.iter().cloned().collect(),
            source,
            yielded: 0,
        }))
    }
}

/// Solid BGRA frame at `ms` milliseconds
pub fn video_frame(width: u32, height: u32, ms: u64) -> VideoFrame {
    VideoFrame::solid(width, height, [40, 80, 120, 255], Duration::from_millis(ms))
}

/// 1024 frames of stereo silence at `ms` milliseconds
pub fn audio_chunk(ms: u64) -> AudioChunk {
    AudioChunk::silence(AudioFormat::default(), 1024, Duration::from_millis(ms))
}

/// Frames at 30 fps starting at `start_ms`
pub fn frames_30fps(width: u32, height: u32, start_ms: u64, count: u64) -> Vec<VideoFrame> {
    (0..count)
        .map(|i| video_frame(width, height, start_ms + i * 1000 / 30))
        .collect()
}
