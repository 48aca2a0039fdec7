//! Live recorder
//!
//! Owns the frame processing thread and is the control surface for the
//! interactive side: start and stop recordings, publish overlay fields, and
//! watch lifecycle events.
//!
//! ```text
//!  capture ──FrameInput::push──▶ ┌────────────────────────┐ ──▶ inference
//!                                │ scorecast-processing   │
//!  start / stop / reset ───────▶ │ FrameDispatcher        │ ──▶ WriterSession ──▶ file
//!                                └────────────────────────┘
//! ```
//!
//! Samples and control commands share one ordered queue, so a stop request
//! is handled after every frame pushed before it.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::{Container, RecorderConfig};
use crate::dispatcher::{DispatchCounters, DispatchStats, FrameDispatcher};
use crate::error::{Result, ResultExt, ScorecastError};
use crate::finalize::{FinalizeRequest, PendingOutput};
use crate::media::MediaBackend;
use crate::overlay::{OverlayFeed, OverlayState};
use crate::sampler::{DownscaleSampler, InferenceFrame};
use crate::types::{Dimensions, FrameSample, Handle, Orientation};
use crate::writer::WriterSession;

/// Lifecycle notifications from the processing thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Session created; the file appears once the first frame arrives
    Started { path: PathBuf },
    /// Tracks configured from the first frame
    Configured { dimensions: Dimensions },
    /// First frame written; session zero time fixed
    Writing,
    /// Session ended with an error
    Failed { reason: String },
    /// Session finalized, with the playable file if there is one
    Finished {
        path: Option<PathBuf>,
        video_frames: u64,
    },
    /// Session discarded without output
    Reset,
}

/// Caller-side view of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    /// The session could not be configured; `stop` or `start` clears it
    Failed,
    Closed,
}

enum Command {
    Sample(FrameSample),
    Start(Box<WriterSession>),
    Finalize(FinalizeRequest),
    Reset,
    Shutdown,
}

/// Capture-side handle for pushing samples
///
/// Never blocks: when the processing queue is full the sample is dropped.
#[derive(Clone)]
pub struct FrameInput {
    tx: mpsc::Sender<Command>,
    counters: Arc<DispatchCounters>,
}

impl FrameInput {
    /// Queue a sample; returns false if it was dropped
    pub fn push(&self, sample: impl Into<FrameSample>) -> bool {
        match self.tx.try_send(Command::Sample(sample.into())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.record_queue_drop();
                trace!("Processing queue full, dropping sample");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug)]
struct ActiveSession {
    path: PathBuf,
    started: Instant,
}

/// Live scoreboard recorder
pub struct Recorder {
    handle: Handle,
    config: RecorderConfig,
    backend: Arc<dyn MediaBackend>,
    overlay: OverlayFeed,
    tx: mpsc::Sender<Command>,
    thread: Option<std::thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    counters: Arc<DispatchCounters>,
    events: broadcast::Sender<RecorderEvent>,
    inference_rx: Option<mpsc::Receiver<InferenceFrame>>,
    active: Option<ActiveSession>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create a recorder and start its processing thread
    pub fn new(config: RecorderConfig, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate_strict().map_err(ScorecastError::Config)?;
        for warning in config.validate() {
            warn!("{}", warning);
        }

        let handle = Handle::new();
        let overlay = OverlayFeed::default();
        let counters = Arc::new(DispatchCounters::default());
        let (events, _) = broadcast::channel(64);
        let (tx, rx) = mpsc::channel(config.frame_queue_depth);
        let running = Arc::new(AtomicBool::new(true));

        let (sampler, inference_rx) = if config.inference.enabled {
            let (sampler, rx) = DownscaleSampler::new(&config.inference);
            (Some(sampler), Some(rx))
        } else {
            (None, None)
        };

        let dispatcher = FrameDispatcher::new(
            &config,
            overlay.subscribe(),
            sampler,
            counters.clone(),
            events.clone(),
        );

        let thread_running = running.clone();
        let thread = std::thread::Builder::new()
            .name("scorecast-processing".to_string())
            .spawn(move || run_processing_loop(rx, dispatcher, thread_running))
            .map_err(ScorecastError::from)
            .context("Failed to spawn processing thread")?;

        info!(
            "Recorder {} ready ({} backend, output {:?})",
            handle,
            backend.name(),
            config.output_dir
        );

        Ok(Self {
            handle,
            config,
            backend,
            overlay,
            tx,
            thread: Some(thread),
            running,
            counters,
            events,
            inference_rx,
            active: None,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        if self.thread.is_none() || self.tx.is_closed() {
            RecorderState::Closed
        } else if self.active.is_some() && self.counters.session_failed() {
            RecorderState::Failed
        } else if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some() && !self.counters.session_failed()
    }

    /// Path of the session being recorded
    pub fn session_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Handle for the capture source
    pub fn frame_input(&self) -> FrameInput {
        FrameInput {
            tx: self.tx.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Down-sampled frames for the inference consumer; can be taken once
    pub fn take_inference_frames(&mut self) -> Option<mpsc::Receiver<InferenceFrame>> {
        self.inference_rx.take()
    }

    /// Publisher for overlay fields
    pub fn overlay_feed(&self) -> OverlayFeed {
        self.overlay.clone()
    }

    /// Change the overlay fields; the next processed frame picks them up
    pub fn update_overlay(&self, modify: impl FnOnce(&mut OverlayState)) {
        self.overlay.update(modify);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Start a session with a timestamped file in the output directory
    pub async fn start(&mut self, orientation: Orientation) -> Result<PathBuf> {
        let path = session_path(
            &self.config.output_dir,
            self.config.video.container,
            Local::now(),
        );
        self.start_at(path, orientation).await
    }

    /// Start a session writing to `path`
    ///
    /// `orientation` is sampled here, once, and stored as the track rotation.
    /// The file is created when the first frame arrives; an existing file at
    /// `path` is replaced.
    pub async fn start_at(
        &mut self,
        path: impl Into<PathBuf>,
        orientation: Orientation,
    ) -> Result<PathBuf> {
        if self.is_recording() {
            return Err(ScorecastError::SessionAlreadyRunning);
        }
        if let Some(failed) = self.active.take() {
            debug!("Replacing failed session {:?}", failed.path);
        }
        self.counters.clear_session_failed();

        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScorecastError::container(format!(
                        "Failed to create output directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let session = WriterSession::new(
            path.clone(),
            orientation,
            self.config.clone(),
            self.backend.clone(),
        );
        info!("Starting {} -> {:?} ({:?})", session.handle(), path, orientation);

        self.tx
            .send(Command::Start(Box::new(session)))
            .await
            .map_err(|_| ScorecastError::ProcessingClosed)?;

        self.active = Some(ActiveSession {
            path: path.clone(),
            started: Instant::now(),
        });
        Ok(path)
    }

    /// Stop the active session
    ///
    /// Returns immediately; the [`PendingOutput`] resolves once every frame
    /// queued before this call was processed and the file was finalized.
    /// Without an active session it resolves to `None` right away.
    pub async fn stop(&mut self) -> PendingOutput {
        let Some(active) = self.active.take() else {
            debug!("Stop requested with no active session");
            return PendingOutput::none();
        };

        info!(
            "Stopping recording {:?} after {:.1}s",
            active.path,
            active.started.elapsed().as_secs_f64()
        );

        let (request, pending) = FinalizeRequest::channel();
        if self.tx.send(Command::Finalize(request)).await.is_err() {
            warn!("Processing thread gone, {:?} was not finalized", active.path);
            return PendingOutput::none();
        }
        pending
    }

    /// Stop and wait for the finished file
    pub async fn stop_and_wait(&mut self) -> Option<PathBuf> {
        self.stop().await.await
    }

    /// Discard the active session without finalizing
    pub async fn reset(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            info!("Discarding recording {:?}", active.path);
        }
        self.tx
            .send(Command::Reset)
            .await
            .map_err(|_| ScorecastError::ProcessingClosed)
    }

    /// Stop any active session, then end the processing thread
    ///
    /// Returns the last session's file, if one was recording.
    pub async fn shutdown(mut self) -> Option<PathBuf> {
        let output = self.stop_and_wait().await;

        let _ = self.tx.send(Command::Shutdown).await;
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Processing thread did not exit cleanly");
            }
        }
        info!("Recorder {} shut down", self.handle);
        output
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.thread.take().is_some() {
            self.running.store(false, Ordering::Release);
            let _ = self.tx.try_send(Command::Shutdown);
        }
    }
}

fn run_processing_loop(
    mut rx: mpsc::Receiver<Command>,
    mut dispatcher: FrameDispatcher,
    running: Arc<AtomicBool>,
) {
    debug!("Frame processing thread started");

    while let Some(command) = rx.blocking_recv() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        match command {
            Command::Sample(sample) => dispatcher.dispatch(sample),
            Command::Start(session) => dispatcher.begin(*session),
            Command::Finalize(request) => dispatcher.finalize(request),
            Command::Reset => dispatcher.reset(),
            Command::Shutdown => break,
        }
    }

    dispatcher.shutdown();
    debug!("Frame processing thread exiting: {}", dispatcher.stats());
}

/// `<dir>/game-YYYYMMDD-HHMMSS.<ext>`
pub fn session_path(dir: &Path, container: Container, at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "game-{}.{}",
        at.format("%Y%m%d-%H%M%S"),
        container.extension()
    ))
}
