//! Scoreboard overlay
//!
//! The overlay fields are published by the interactive side through an
//! [`OverlayFeed`] and picked up by the frame processing thread, latest value
//! wins. The [`OverlayRenderer`] burns a snapshot into BGRA frames and is
//! shared by the live and offline paths.

mod font;
mod render;

pub use render::OverlayRenderer;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Overlay position on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl OverlayPosition {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "top-right" | "topright" | "tr" => Self::TopRight,
            "bottom-left" | "bottomleft" | "bl" => Self::BottomLeft,
            "bottom-right" | "bottomright" | "br" => Self::BottomRight,
            _ => Self::TopLeft,
        }
    }
}

/// Scoreboard fields shown on the video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayState {
    pub home_name: String,
    pub away_name: String,
    pub home_score: u32,
    pub away_score: u32,
    /// Period label, e.g. "1ST" or "OT"
    pub period: String,
    /// Game clock text, e.g. "12:45"
    pub clock: String,
    /// Whether the game clock is running
    pub running: bool,
    /// Tournament or event name, may be empty
    pub event_name: String,
}

impl OverlayState {
    /// Fresh scoreboard for two teams
    pub fn new(home_name: impl Into<String>, away_name: impl Into<String>) -> Self {
        Self {
            home_name: home_name.into(),
            away_name: away_name.into(),
            ..Default::default()
        }
    }

    /// Score line, e.g. "2-3"
    pub fn score_text(&self) -> String {
        format!("{}-{}", self.home_score, self.away_score)
    }
}

/// Publishing side of the overlay state
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct OverlayFeed {
    tx: watch::Sender<OverlayState>,
}

impl OverlayFeed {
    pub fn new(initial: OverlayState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Modify the published state in place
    pub fn update(&self, modify: impl FnOnce(&mut OverlayState)) {
        self.tx.send_modify(modify);
    }

    /// Replace the published state
    pub fn set(&self, state: OverlayState) {
        self.tx.send_replace(state);
    }

    /// Snapshot of the current state
    pub fn current(&self) -> OverlayState {
        self.tx.borrow().clone()
    }

    /// Receiver for the processing side
    pub fn subscribe(&self) -> watch::Receiver<OverlayState> {
        self.tx.subscribe()
    }
}

impl Default for OverlayFeed {
    fn default() -> Self {
        Self::new(OverlayState::default())
    }
}
