//! Session finalization
//!
//! Stopping a recording is requested from the interactive side but carried out
//! on the frame processing thread, after every frame queued before the request.
//! The result travels back through a one-shot reply which can only be resolved
//! once.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::writer::{SessionPhase, WriterSession};

/// Processing-side half of a stop request
#[derive(Debug)]
pub struct FinalizeRequest {
    reply: oneshot::Sender<Option<PathBuf>>,
}

impl FinalizeRequest {
    /// Create a request and the output the caller waits on
    pub fn channel() -> (Self, PendingOutput) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, PendingOutput { rx: Some(rx) })
    }

    /// Deliver the result; consumes the request so it cannot fire twice
    pub fn resolve(self, output: Option<PathBuf>) {
        if self.reply.send(output).is_err() {
            debug!("Stop requester went away before finalize completed");
        }
    }
}

/// Output of a stop request, resolved once finalization completes
///
/// Await it, or drop it to not care. Resolves to `None` when there was no
/// active session, nothing was recorded, or finalizing failed.
#[derive(Debug)]
pub struct PendingOutput {
    rx: Option<oneshot::Receiver<Option<PathBuf>>>,
}

impl PendingOutput {
    /// Already resolved to no output
    pub fn none() -> Self {
        Self { rx: None }
    }

    /// Whether this output is known to be empty without waiting
    pub fn is_none(&self) -> bool {
        self.rx.is_none()
    }

    /// Wait for the result
    pub async fn wait(self) -> Option<PathBuf> {
        self.await
    }
}

impl Future for PendingOutput {
    type Output = Option<PathBuf>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(result) => {
                self.rx = None;
                // Processing thread gone without answering
                Poll::Ready(result.unwrap_or(None))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Outcome of one finalize pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub output: Option<PathBuf>,
    pub phase: Option<SessionPhase>,
    pub video_frames: u64,
}

/// Runs finalization on the processing thread
#[derive(Debug, Default)]
pub struct FinalizationController {
    completed: u64,
}

impl FinalizationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions finalized so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Finish `session` (if any) and resolve `request` with the result
    ///
    /// The session's muxer flushes its encoders and writes the container
    /// trailer before the reply is sent. A missing session, a session that
    /// was never configured, or one that already finished resolves to `None`.
    pub fn finalize(
        &mut self,
        session: Option<&mut WriterSession>,
        request: FinalizeRequest,
    ) -> FinalizeReport {
        let report = match session {
            Some(session) => {
                let before = session.phase();
                let output = session.finish();
                if before == SessionPhase::Writing {
                    self.completed += 1;
                }
                info!(
                    "{} finalized from {} -> {} ({} frames)",
                    session.handle(),
                    before,
                    session.phase(),
                    session.video_frames()
                );
                FinalizeReport {
                    output,
                    phase: Some(session.phase()),
                    video_frames: session.video_frames(),
                }
            }
            None => {
                debug!("Finalize requested without an active session");
                FinalizeReport {
                    output: None,
                    phase: None,
                    video_frames: 0,
                }
            }
        };

        request.resolve(report.output.clone());
        report
    }
}
