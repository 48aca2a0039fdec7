//! Frame dispatcher
//!
//! Runs on the frame processing thread. Every captured sample passes through
//! [`FrameDispatcher::dispatch`]: video first goes to the down-sampler, then,
//! while a session is active, gets the scoreboard burned in and is handed to
//! the writer. Audio goes straight to the writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, trace};

use crate::config::RecorderConfig;
use crate::finalize::{FinalizationController, FinalizeRequest};
use crate::overlay::{OverlayRenderer, OverlayState};
use crate::recorder::RecorderEvent;
use crate::sampler::DownscaleSampler;
use crate::types::{AudioChunk, FrameSample, VideoFrame};
use crate::writer::{AppendOutcome, DropReason, SessionPhase, WriterSession};

/// Log stats every N written frames (~10 seconds at 30 fps)
const STATS_INTERVAL: u64 = 300;

/// Counters shared between the processing thread and its owner
#[derive(Debug, Default)]
pub struct DispatchCounters {
    video_received: AtomicU64,
    video_written: AtomicU64,
    video_not_ready: AtomicU64,
    video_failed: AtomicU64,
    audio_written: AtomicU64,
    audio_dropped: AtomicU64,
    queue_dropped: AtomicU64,
    /// Set when the current session failed to configure
    session_failed: AtomicBool,
}

impl DispatchCounters {
    /// Count a frame the capture side could not queue
    pub fn record_queue_drop(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the current session ended in a configuration failure
    pub fn session_failed(&self) -> bool {
        self.session_failed.load(Ordering::Acquire)
    }

    pub fn clear_session_failed(&self) {
        self.session_failed.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            video_received: self.video_received.load(Ordering::Relaxed),
            video_written: self.video_written.load(Ordering::Relaxed),
            video_not_ready: self.video_not_ready.load(Ordering::Relaxed),
            video_failed: self.video_failed.load(Ordering::Relaxed),
            audio_written: self.audio_written.load(Ordering::Relaxed),
            audio_dropped: self.audio_dropped.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time dispatch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Video frames that reached the processing thread
    pub video_received: u64,
    /// Video frames written to a session
    pub video_written: u64,
    /// Frames dropped because the writer input was busy
    pub video_not_ready: u64,
    /// Frames dropped for any other reason while recording
    pub video_failed: u64,
    pub audio_written: u64,
    pub audio_dropped: u64,
    /// Samples dropped before reaching the processing thread
    pub queue_dropped: u64,
}

impl std::fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} received, {} written, {} not ready, {} failed, {} queue drops, audio {}/{}",
            self.video_received,
            self.video_written,
            self.video_not_ready,
            self.video_failed,
            self.queue_dropped,
            self.audio_written,
            self.audio_written + self.audio_dropped
        )
    }
}

/// Routes samples to the sampler, renderer and writer
pub struct FrameDispatcher {
    renderer: OverlayRenderer,
    overlay_rx: watch::Receiver<OverlayState>,
    sampler: Option<DownscaleSampler>,
    session: Option<WriterSession>,
    finalizer: FinalizationController,
    counters: Arc<DispatchCounters>,
    events: broadcast::Sender<RecorderEvent>,
}

impl FrameDispatcher {
    pub fn new(
        config: &RecorderConfig,
        overlay_rx: watch::Receiver<OverlayState>,
        sampler: Option<DownscaleSampler>,
        counters: Arc<DispatchCounters>,
        events: broadcast::Sender<RecorderEvent>,
    ) -> Self {
        let mut renderer = OverlayRenderer::new(config.overlay.clone());
        renderer.set_state(overlay_rx.borrow().clone());
        Self {
            renderer,
            overlay_rx,
            sampler,
            session: None,
            finalizer: FinalizationController::new(),
            counters,
            events,
        }
    }

    /// Whether a session is taking samples
    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_open())
    }

    pub fn session(&self) -> Option<&WriterSession> {
        self.session.as_ref()
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Make `session` the active session, discarding any previous one
    pub fn begin(&mut self, session: WriterSession) {
        if let Some(mut old) = self.session.take() {
            debug!("Discarding {} for new session", old.handle());
            old.discard();
        }
        self.counters.clear_session_failed();
        info!("{} started: {:?}", session.handle(), session.path());
        self.emit(RecorderEvent::Started {
            path: session.path().to_path_buf(),
        });
        self.session = Some(session);
    }

    /// Route one captured sample
    pub fn dispatch(&mut self, sample: FrameSample) {
        match sample {
            FrameSample::Video(frame) => self.dispatch_video(frame),
            FrameSample::Audio(chunk) => self.dispatch_audio(&chunk),
        }
    }

    fn dispatch_video(&mut self, mut frame: VideoFrame) {
        self.counters.video_received.fetch_add(1, Ordering::Relaxed);

        // Inference sees every frame, recording or not
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.offer(&frame);
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        // Latest published overlay fields win
        if self.overlay_rx.has_changed().unwrap_or(false) {
            let state = self.overlay_rx.borrow_and_update().clone();
            self.renderer.set_state(state);
        }

        let before = session.phase();
        let renderer = &self.renderer;
        let result = session.append_video(&mut frame, |f| renderer.render(f));
        let after = session.phase();
        let dimensions = session.dimensions();

        match result {
            Ok(AppendOutcome::Appended) => {
                let written = self.counters.video_written.fetch_add(1, Ordering::Relaxed) + 1;
                if written % STATS_INTERVAL == 0 {
                    info!("Recording stats: {}", self.counters.snapshot());
                }
            }
            Ok(AppendOutcome::Dropped(DropReason::NotReady)) => {
                self.counters.video_not_ready.fetch_add(1, Ordering::Relaxed);
            }
            Ok(AppendOutcome::Dropped(reason)) => {
                trace!("Video frame dropped: {:?}", reason);
                self.counters.video_failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Recording failed: {}", e);
                self.counters.video_failed.fetch_add(1, Ordering::Relaxed);
                self.counters.session_failed.store(true, Ordering::Release);
                self.emit(RecorderEvent::Failed {
                    reason: e.to_string(),
                });
                return;
            }
        }

        if before == SessionPhase::Unconfigured {
            if let Some(dimensions) = dimensions {
                self.emit(RecorderEvent::Configured { dimensions });
            }
        }
        if before != SessionPhase::Writing && after == SessionPhase::Writing {
            self.emit(RecorderEvent::Writing);
        }
    }

    fn dispatch_audio(&mut self, chunk: &AudioChunk) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.append_audio(chunk) {
            AppendOutcome::Appended => {
                self.counters.audio_written.fetch_add(1, Ordering::Relaxed);
            }
            AppendOutcome::Dropped(reason) => {
                trace!("Audio chunk dropped: {:?}", reason);
                self.counters.audio_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Finalize the active session and answer `request`
    ///
    /// Runs after every sample queued before the request. The session is
    /// released afterwards, so a repeated request resolves to `None`.
    pub fn finalize(&mut self, request: FinalizeRequest) {
        let report = self.finalizer.finalize(self.session.as_mut(), request);
        if let Some(session) = self.session.take() {
            if report.phase == Some(SessionPhase::Failed) {
                self.emit(RecorderEvent::Failed {
                    reason: session
                        .failure()
                        .unwrap_or("finalize failed")
                        .to_string(),
                });
            }
            self.emit(RecorderEvent::Finished {
                path: report.output.clone(),
                video_frames: report.video_frames,
            });
            info!("Session stats: {}", self.counters.snapshot());
        }
    }

    /// Drop the active session without finalizing and restart sampling
    pub fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!("Resetting {}", session.handle());
            session.discard();
        }
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.reset();
        }
        self.emit(RecorderEvent::Reset);
    }

    /// Finalize whatever is still recording; used when the thread shuts down
    pub fn shutdown(&mut self) {
        if self.is_recording() {
            let (request, _) = FinalizeRequest::channel();
            self.finalize(request);
        } else if let Some(mut session) = self.session.take() {
            session.discard();
        }
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
