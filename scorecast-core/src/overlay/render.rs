//! Scoreboard rendering onto BGRA frames
//!
//! Fixed layout: a translucent box in one corner holding up to three lines.
//!
//! ```text
//! HAWKS 2 - 3 OWLS
//! 2ND 08:41 [■]
//! SPRING CUP
//! ```

use super::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::{OverlayPosition, OverlayState};
use crate::config::OverlaySettings;
use crate::types::VideoFrame;

/// Longest team name drawn before truncation
const MAX_NAME_CHARS: usize = 12;
/// Longest event name drawn before truncation
const MAX_EVENT_CHARS: usize = 24;

const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];
const RUNNING_COLOR: [u8; 4] = [60, 200, 60, 255];
const STOPPED_COLOR: [u8; 4] = [40, 40, 220, 255];

/// Scoreboard renderer
///
/// Holds the live overlay state; offline callers pass their own snapshot to
/// [`OverlayRenderer::render_snapshot`].
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    settings: OverlaySettings,
    state: OverlayState,
}

impl OverlayRenderer {
    /// Create a new renderer with settings
    pub fn new(settings: OverlaySettings) -> Self {
        Self {
            settings,
            state: OverlayState::default(),
        }
    }

    /// Create with default settings
    pub fn with_defaults() -> Self {
        Self::new(OverlaySettings::default())
    }

    /// Check if live rendering is enabled
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Enable or disable live rendering
    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    /// Replace the live state
    pub fn set_state(&mut self, state: OverlayState) {
        self.state = state;
    }

    /// Current live state
    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    /// Draw the live state onto a frame, if enabled
    pub fn render(&self, frame: &mut VideoFrame) {
        if !self.settings.enabled {
            return;
        }
        self.render_snapshot(frame, &self.state);
    }

    /// Draw a caller-supplied snapshot onto a frame
    pub fn render_snapshot(&self, frame: &mut VideoFrame, state: &OverlayState) {
        if frame.width == 0 || frame.height == 0 {
            return;
        }

        let lines = layout_lines(state);
        let unit = self.unit();
        let padding = 2 * unit;
        let line_height = (GLYPH_HEIGHT + 3) * unit;

        // Room for the clock indicator after the second line
        let widest = lines
            .iter()
            .enumerate()
            .map(|(i, line)| line.chars().count() as u32 + if i == 1 { 2 } else { 0 })
            .max()
            .unwrap_or(0);
        let box_width = widest * ADVANCE * unit + padding * 2;
        let box_height = lines.len() as u32 * line_height + padding * 2 - 3 * unit;

        let (box_x, box_y) = self.origin(frame.width, frame.height, box_width, box_height);

        let alpha = (self.settings.background_opacity.clamp(0.0, 1.0) * 255.0) as u8;
        fill_rect(frame, box_x, box_y, box_width, box_height, [0, 0, 0, alpha]);

        for (i, line) in lines.iter().enumerate() {
            let y = box_y + padding + i as u32 * line_height;
            let end = draw_text(frame, box_x + padding, y, line, unit);

            if i == 1 {
                let color = if state.running {
                    RUNNING_COLOR
                } else {
                    STOPPED_COLOR
                };
                let side = GLYPH_WIDTH * unit;
                fill_rect(frame, end + ADVANCE * unit, y + unit, side, side, color);
            }
        }
    }

    /// Size of one font pixel in frame pixels
    fn unit(&self) -> u32 {
        (self.settings.font_scale.round() as u32).max(1)
    }

    fn origin(&self, width: u32, height: u32, box_width: u32, box_height: u32) -> (u32, u32) {
        let margin = 2 * self.unit();
        match self.settings.position {
            OverlayPosition::TopLeft => (margin, margin),
            OverlayPosition::TopRight => (width.saturating_sub(box_width + margin), margin),
            OverlayPosition::BottomLeft => (margin, height.saturating_sub(box_height + margin)),
            OverlayPosition::BottomRight => (
                width.saturating_sub(box_width + margin),
                height.saturating_sub(box_height + margin),
            ),
        }
    }
}

/// Text lines for a snapshot
pub(crate) fn layout_lines(state: &OverlayState) -> Vec<String> {
    let home = display_name(&state.home_name, "HOME");
    let away = display_name(&state.away_name, "AWAY");

    let mut lines = vec![
        format!("{} {} - {} {}", home, state.home_score, state.away_score, away),
        format!("{} {}", state.period.trim(), state.clock.trim())
            .trim()
            .to_string(),
    ];

    let event = state.event_name.trim();
    if !event.is_empty() {
        lines.push(truncate(event, MAX_EVENT_CHARS).to_uppercase());
    }

    lines
}

fn display_name(name: &str, fallback: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        truncate(name, MAX_NAME_CHARS).to_uppercase()
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Blend a filled rectangle into the frame, clipped to the frame bounds
fn fill_rect(frame: &mut VideoFrame, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
    let stride = frame.stride as usize;
    let alpha = color[3] as u32;

    for py in y..y.saturating_add(h).min(frame.height) {
        for px in x..x.saturating_add(w).min(frame.width) {
            let idx = py as usize * stride + px as usize * 4;
            let Some(pixel) = frame.data.get_mut(idx..idx + 4) else {
                return;
            };
            for c in 0..3 {
                let src = color[c] as u32;
                let dst = pixel[c] as u32;
                pixel[c] = ((src * alpha + dst * (255 - alpha)) / 255) as u8;
            }
        }
    }
}

/// Draw text starting at (x, y); returns the x just past the last glyph
fn draw_text(frame: &mut VideoFrame, x: u32, y: u32, text: &str, unit: u32) -> u32 {
    let mut cursor = x;
    for ch in text.chars() {
        if cursor >= frame.width {
            break;
        }
        draw_glyph(frame, cursor, y, ch, unit);
        cursor += ADVANCE * unit;
    }
    cursor
}

fn draw_glyph(frame: &mut VideoFrame, x: u32, y: u32, ch: char, unit: u32) {
    let stride = frame.stride as usize;

    for (row, &bits) in font::glyph(ch).iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                continue;
            }
            let px = x + col * unit;
            let py = y + row as u32 * unit;

            for dy in 0..unit {
                for dx in 0..unit {
                    let (fx, fy) = (px + dx, py + dy);
                    if fx >= frame.width || fy >= frame.height {
                        continue;
                    }
                    let idx = fy as usize * stride + fx as usize * 4;
                    if let Some(pixel) = frame.data.get_mut(idx..idx + 4) {
                        pixel.copy_from_slice(&TEXT_COLOR);
                    }
                }
            }
        }
    }
}
