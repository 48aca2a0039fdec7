//! Frame scaling
//!
//! CPU resampling of BGRA frames with the `image` crate's bilinear (triangle)
//! filter. Used for the down-sampled inference copy and for conforming frames
//! to a session's fixed encoder size.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use tracing::debug;

use crate::error::{Result, ScorecastError};
use crate::types::{Dimensions, VideoFrame};

/// Borrowed view of a BGRA frame as an RGBA image
///
/// The filter treats the four channels independently, so BGRA order survives
/// resampling unchanged. Padded rows are packed into `scratch` first.
fn packed_view<'a>(
    src: &'a VideoFrame,
    scratch: &'a mut Vec<u8>,
) -> Result<ImageBuffer<Rgba<u8>, &'a [u8]>> {
    if !src.is_well_formed() {
        return Err(ScorecastError::encoder(format!(
            "Source frame {} with stride {} has only {} bytes",
            src.dimensions(),
            src.stride,
            src.data.len()
        )));
    }

    let row_bytes = src.width as usize * 4;
    let pixels: &[u8] = if src.stride as usize == row_bytes {
        &src.data
    } else {
        scratch.clear();
        for row in src.data.chunks(src.stride as usize).take(src.height as usize) {
            scratch.extend_from_slice(&row[..row_bytes]);
        }
        scratch.as_slice()
    };

    ImageBuffer::from_raw(src.width, src.height, pixels)
        .ok_or_else(|| ScorecastError::encoder("Failed to create image buffer"))
}

/// Scaler for a fixed output size
#[derive(Debug, Clone)]
pub struct FrameScaler {
    target: Dimensions,
    filter: FilterType,
    last_source: Option<Dimensions>,
    scratch: Vec<u8>,
}

impl FrameScaler {
    pub fn new(target: Dimensions) -> Self {
        Self {
            target,
            filter: FilterType::Triangle,
            last_source: None,
            scratch: Vec::new(),
        }
    }

    /// Get output dimensions
    pub fn output_size(&self) -> Dimensions {
        self.target
    }

    /// Scale a frame into a caller-provided buffer, tightly packed BGRA
    pub fn scale_into(&mut self, src: &VideoFrame, dst: &mut Vec<u8>) -> Result<()> {
        if self.target.is_empty() {
            return Err(ScorecastError::encoder("Target size cannot be zero"));
        }
        if self.last_source != Some(src.dimensions()) {
            debug!("Creating scaler: {} -> {}", src.dimensions(), self.target);
            self.last_source = Some(src.dimensions());
        }

        let view = packed_view(src, &mut self.scratch)?;
        let resized = imageops::resize(&view, self.target.width, self.target.height, self.filter);

        dst.clear();
        dst.extend_from_slice(resized.as_raw());
        Ok(())
    }

    /// Scale a frame into a newly allocated one with the same timestamp
    pub fn scale(&mut self, src: &VideoFrame) -> Result<VideoFrame> {
        let mut data = Vec::new();
        self.scale_into(src, &mut data)?;
        Ok(VideoFrame::new(
            self.target.width,
            self.target.height,
            data,
            src.pts,
        ))
    }
}
