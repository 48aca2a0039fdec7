//! Scorecast Core Library
//!
//! Records sports video with a live scoreboard burned into every frame.
//!
//! This library provides:
//! - A frame processing thread that never blocks the capture source
//! - Lazily configured H.264/AAC recording sessions with track rotation
//! - Throttled, down-sampled frames for an object detector
//! - A score timeline and an offline compositor that re-renders the overlay
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────────┐    ┌───────────────┐    ┌──────────┐
//! │ FrameInput  │───▶│ FrameDispatcher │───▶│ WriterSession │───▶│ MP4 file │
//! │ (capture)   │    │ (+ overlay)     │    │ (MediaMuxer)  │    └──────────┘
//! └─────────────┘    └────────┬────────┘    └───────────────┘
//!                             ▼
//!                    ┌─────────────────┐
//!                    │ DownscaleSampler│───▶ inference consumer
//!                    └─────────────────┘
//!
//! TimelineTracker ──▶ Timeline ──▶ Compositor (raw file ──▶ overlaid file)
//! ```

pub mod compositor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod finalize;
pub mod media;
pub mod overlay;
pub mod recorder;
pub mod sampler;
pub mod scaler;
pub mod timeline;
pub mod types;
pub mod writer;

pub use compositor::{CompositeJob, CompositeOutcome, Compositor};
pub use config::{Container, H264Profile, RecorderConfig};
pub use dispatcher::{DispatchStats, FrameDispatcher};
pub use error::{Result, ScorecastError};
pub use finalize::{FinalizationController, PendingOutput};
pub use media::{MediaBackend, MediaMuxer, MediaReader, TrackParams};
pub use overlay::{OverlayFeed, OverlayRenderer, OverlayState};
pub use recorder::{FrameInput, Recorder, RecorderEvent, RecorderState};
pub use sampler::{DownscaleSampler, InferenceFrame};
pub use timeline::{ScoreSnapshot, ScoreTimelineEntry, Timeline, TimelineTracker};
pub use types::{AudioChunk, AudioFormat, Dimensions, FrameSample, Handle, Orientation, VideoFrame};
pub use writer::{SessionPhase, WriterSession};
