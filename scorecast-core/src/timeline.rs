//! Score timeline
//!
//! While a game is played the [`TimelineTracker`] records every score and
//! clock change with the time elapsed since the game started. The resulting
//! [`Timeline`] is stored next to the raw recording and drives the offline
//! compositor, which asks "what did the scoreboard show at time t?".

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, ScorecastError};
use crate::overlay::OverlayState;

/// Home and away score at one moment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub home: u32,
    pub away: u32,
}

impl ScoreSnapshot {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }
}

impl std::fmt::Display for ScoreSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// One recorded scoreboard change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTimelineEntry {
    /// Milliseconds since the game started
    pub elapsed_ms: u64,
    pub score: ScoreSnapshot,
    pub clock: String,
    pub period: String,
    #[serde(default)]
    pub running: bool,
}

impl ScoreTimelineEntry {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Ordered scoreboard history of one game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub home_name: String,
    pub away_name: String,
    /// Regulation period length in seconds
    pub period_length_secs: u64,
    #[serde(default)]
    pub event_name: String,
    entries: Vec<ScoreTimelineEntry>,
}

impl Timeline {
    pub fn new(
        home_name: impl Into<String>,
        away_name: impl Into<String>,
        period_length: Duration,
    ) -> Self {
        Self {
            home_name: home_name.into(),
            away_name: away_name.into(),
            period_length_secs: period_length.as_secs(),
            event_name: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn period_length(&self) -> Duration {
        Duration::from_secs(self.period_length_secs)
    }

    pub fn entries(&self) -> &[ScoreTimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, keeping elapsed times non-decreasing
    pub fn push(&mut self, mut entry: ScoreTimelineEntry) {
        if let Some(last) = self.entries.last() {
            entry.elapsed_ms = entry.elapsed_ms.max(last.elapsed_ms);
        }
        self.entries.push(entry);
    }

    /// Entry in effect at `t`: the last one recorded at or before it
    ///
    /// Before the first entry there is nothing to show.
    pub fn entry_at(&self, t: Duration) -> Option<&ScoreTimelineEntry> {
        let t_ms = t.as_millis().min(u64::MAX as u128) as u64;
        let idx = self.entries.partition_point(|e| e.elapsed_ms <= t_ms);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }

    /// [`Timeline::entry_at`] for a time in seconds; negative or NaN yields `None`
    pub fn entry_at_secs(&self, t: f64) -> Option<&ScoreTimelineEntry> {
        if !t.is_finite() || t < 0.0 {
            return None;
        }
        self.entry_at(Duration::from_secs_f64(t))
    }

    /// Full scoreboard state at `t`
    pub fn snapshot_at(&self, t: Duration) -> Option<OverlayState> {
        self.entry_at(t).map(|entry| OverlayState {
            home_name: self.home_name.clone(),
            away_name: self.away_name.clone(),
            home_score: entry.score.home,
            away_score: entry.score.away,
            period: entry.period.clone(),
            clock: entry.clock.clone(),
            running: entry.running,
            event_name: self.event_name.clone(),
        })
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!("Saved timeline with {} entries to {:?}", self.len(), path);
        Ok(())
    }

    /// Read a timeline written by [`Timeline::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScorecastError::timeline(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut timeline: Timeline = serde_json::from_str(&content).map_err(|e| {
            ScorecastError::timeline(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        timeline.entries.sort_by_key(|e| e.elapsed_ms);
        Ok(timeline)
    }
}

#[derive(Debug)]
struct ActiveGame {
    timeline: Timeline,
    started: Instant,
    score: ScoreSnapshot,
    clock: String,
    period: String,
    running: bool,
}

impl ActiveGame {
    fn record(&mut self) {
        let entry = ScoreTimelineEntry {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            score: self.score,
            clock: self.clock.clone(),
            period: self.period.clone(),
            running: self.running,
        };
        self.timeline.push(entry);
    }
}

/// Records scoreboard changes during a game
///
/// Updates outside a started game are ignored.
#[derive(Debug, Default)]
pub struct TimelineTracker {
    active: Option<ActiveGame>,
}

impl TimelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start a game with an empty history; the game start is the reference
    /// for all elapsed times
    ///
    /// Nothing is recorded until the first update. Starting again discards
    /// the previous game's history.
    pub fn start(
        &mut self,
        home_name: impl Into<String>,
        away_name: impl Into<String>,
        period_length: Duration,
    ) {
        let game = ActiveGame {
            timeline: Timeline::new(home_name, away_name, period_length),
            started: Instant::now(),
            score: ScoreSnapshot::default(),
            clock: String::new(),
            period: String::new(),
            running: false,
        };
        info!(
            "Tracking {} vs {}",
            game.timeline.home_name, game.timeline.away_name
        );
        self.active = Some(game);
    }

    /// Set the event name shown with the scoreboard
    pub fn set_event_name(&mut self, name: impl Into<String>) {
        if let Some(game) = self.active.as_mut() {
            game.timeline.event_name = name.into();
        }
    }

    pub fn update_score(&mut self, home: u32, away: u32) {
        if let Some(game) = self.active.as_mut() {
            game.score = ScoreSnapshot::new(home, away);
            game.record();
        }
    }

    pub fn update_clock(&mut self, clock: impl Into<String>, period: impl Into<String>) {
        if let Some(game) = self.active.as_mut() {
            game.clock = clock.into();
            game.period = period.into();
            game.record();
        }
    }

    /// Mark the game clock running or stopped
    pub fn set_running(&mut self, running: bool) {
        if let Some(game) = self.active.as_mut() {
            if game.running != running {
                game.running = running;
                game.record();
            }
        }
    }

    /// Time since the game started
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|game| game.started.elapsed())
    }

    /// Current scoreboard as overlay fields
    pub fn current(&self) -> Option<OverlayState> {
        self.active.as_ref().map(|game| OverlayState {
            home_name: game.timeline.home_name.clone(),
            away_name: game.timeline.away_name.clone(),
            home_score: game.score.home,
            away_score: game.score.away,
            period: game.period.clone(),
            clock: game.clock.clone(),
            running: game.running,
            event_name: game.timeline.event_name.clone(),
        })
    }

    /// End the game and return its history; empty if no game was started
    pub fn stop(&mut self) -> Timeline {
        match self.active.take() {
            Some(game) => {
                info!("Game ended with {} timeline entries", game.timeline.len());
                game.timeline
            }
            None => Timeline::default(),
        }
    }
}
