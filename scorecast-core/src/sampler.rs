//! Down-sampled frame delivery for the inference consumer
//!
//! Every video frame is offered to the [`DownscaleSampler`]. At most one frame
//! per interval is scaled to the detector size and handed over through a
//! bounded channel. A busy consumer means the frame is dropped; the capture
//! path never waits on inference.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::config::InferenceSettings;
use crate::scaler::FrameScaler;
use crate::types::{Dimensions, VideoFrame};

#[derive(Debug)]
struct PoolInner {
    free: Vec<Vec<u8>>,
    outstanding: usize,
    capacity: usize,
}

/// Fixed-size pool of scaled output buffers
///
/// Buffers travel with their [`InferenceFrame`] and come back when the frame
/// is dropped. When every buffer is out, [`BufferPool::acquire`] returns `None`.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: Vec::with_capacity(capacity),
                outstanding: 0,
                capacity,
            })),
        }
    }

    /// Take a buffer, allocating lazily up to the pool capacity
    pub fn acquire(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        if let Some(buf) = inner.free.pop() {
            inner.outstanding += 1;
            return Some(buf);
        }
        if inner.outstanding + inner.free.len() < inner.capacity {
            inner.outstanding += 1;
            return Some(Vec::new());
        }
        None
    }

    fn release(&self, buf: Vec<u8>) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        if inner.free.len() < inner.capacity {
            inner.free.push(buf);
        }
    }

    /// Buffers currently handed out
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Buffers ready for reuse
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }
}

/// Frame delivered to the inference consumer
///
/// Holds either a scaled copy backed by a pool buffer, or a full-resolution
/// copy when scaling was not possible.
#[derive(Debug)]
pub struct InferenceFrame {
    frame: VideoFrame,
    scaled: bool,
    pool: Option<BufferPool>,
}

impl InferenceFrame {
    pub fn frame(&self) -> &VideoFrame {
        &self.frame
    }

    /// Whether the frame is at the detector size
    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    pub fn dimensions(&self) -> Dimensions {
        self.frame.dimensions()
    }

    pub fn pts(&self) -> Duration {
        self.frame.pts
    }
}

impl Drop for InferenceFrame {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.frame.data));
        }
    }
}

/// What happened to a frame offered to the sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Interval has not elapsed since the last delivery
    NotDue,
    /// Delivered at the detector size
    Scaled,
    /// Delivered at full resolution after scaling failed
    FullResolution,
    /// Consumer busy or gone
    Dropped,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub delivered: u64,
    pub fallbacks: u64,
    pub dropped: u64,
}

/// Throttled down-sampler feeding the inference consumer
pub struct DownscaleSampler {
    interval: Duration,
    scaler: FrameScaler,
    pool: BufferPool,
    tx: mpsc::Sender<InferenceFrame>,
    last_delivery: Option<Duration>,
    stats: SamplerStats,
}

impl DownscaleSampler {
    /// Create a sampler and the receiving end for the consumer
    pub fn new(settings: &InferenceSettings) -> (Self, mpsc::Receiver<InferenceFrame>) {
        let (tx, rx) = mpsc::channel(settings.queue_depth.max(1));
        let sampler = Self {
            interval: settings.interval(),
            scaler: FrameScaler::new(settings.target()),
            pool: BufferPool::new(settings.pool_size),
            tx,
            last_delivery: None,
            stats: SamplerStats::default(),
        };
        (sampler, rx)
    }

    pub fn target(&self) -> Dimensions {
        self.scaler.output_size()
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Forget the last delivery time so the next frame is due immediately
    pub fn reset(&mut self) {
        self.last_delivery = None;
    }

    fn is_due(&self, pts: Duration) -> bool {
        match self.last_delivery {
            None => true,
            // Timestamps restarting (new capture session) count as due
            Some(last) if pts < last => true,
            Some(last) => pts - last > self.interval,
        }
    }

    /// Offer a frame; scales and delivers it when the interval has elapsed
    pub fn offer(&mut self, frame: &VideoFrame) -> SampleOutcome {
        if !self.is_due(frame.pts) {
            return SampleOutcome::NotDue;
        }

        if self.tx.is_closed() {
            return SampleOutcome::Dropped;
        }
        // Skip the scaling work outright when the consumer has no room
        if self.tx.capacity() == 0 {
            self.stats.dropped += 1;
            trace!("Inference consumer busy, dropping frame at {:?}", frame.pts);
            return SampleOutcome::Dropped;
        }

        let delivery = self.prepare(frame);
        let outcome = if delivery.scaled {
            SampleOutcome::Scaled
        } else {
            SampleOutcome::FullResolution
        };

        match self.tx.try_send(delivery) {
            Ok(()) => {
                self.last_delivery = Some(frame.pts);
                self.stats.delivered += 1;
                if outcome == SampleOutcome::FullResolution {
                    self.stats.fallbacks += 1;
                }
                outcome
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped += 1;
                SampleOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Inference consumer closed");
                SampleOutcome::Dropped
            }
        }
    }

    fn prepare(&mut self, frame: &VideoFrame) -> InferenceFrame {
        if let Some(mut buf) = self.pool.acquire() {
            match self.scaler.scale_into(frame, &mut buf) {
                Ok(()) => {
                    let target = self.scaler.output_size();
                    return InferenceFrame {
                        frame: VideoFrame::new(target.width, target.height, buf, frame.pts),
                        scaled: true,
                        pool: Some(self.pool.clone()),
                    };
                }
                Err(e) => {
                    warn!("Down-sampling failed, delivering full resolution: {}", e);
                    self.pool.release(buf);
                }
            }
        } else {
            debug!("Buffer pool exhausted, delivering full resolution");
        }

        InferenceFrame {
            frame: frame.clone(),
            scaled: false,
            pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> InferenceSettings {
        InferenceSettings {
            width: 64,
            height: 36,
            ..Default::default()
        }
    }

    fn frame_at(ms: u64) -> VideoFrame {
        VideoFrame::solid(128, 72, [9, 9, 9, 255], Duration::from_millis(ms))
    }

    #[test]
    fn test_pool_capacity_and_reuse() {
        let pool = BufferPool::new(2);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());

        pool.release(a);
        assert_eq!(pool.outstanding(), 1);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_throttles_to_interval() {
        let (mut sampler, mut rx) = DownscaleSampler::new(&InferenceSettings {
            queue_depth: 16,
            ..settings()
        });

        let mut delivered = 0;
        // 30 fps for one second
        for i in 0..30u64 {
            if sampler.offer(&frame_at(i * 33)) == SampleOutcome::Scaled {
                delivered += 1;
                rx.try_recv().unwrap();
            }
        }
        // 0, 231, 462, 693, 924
        assert_eq!(delivered, 5);
    }

    #[test]
    fn test_drops_when_consumer_busy() {
        let (mut sampler, mut rx) = DownscaleSampler::new(&settings());

        assert_eq!(sampler.offer(&frame_at(0)), SampleOutcome::Scaled);
        // Queue holds one and nobody is reading
        assert_eq!(sampler.offer(&frame_at(300)), SampleOutcome::Dropped);
        assert_eq!(sampler.stats().dropped, 1);

        let first = rx.try_recv().unwrap();
        assert!(first.is_scaled());
        assert_eq!(first.dimensions(), Dimensions::new(64, 36));
        drop(first);

        assert_eq!(sampler.offer(&frame_at(301)), SampleOutcome::Scaled);
    }

    #[test]
    fn test_buffers_return_to_pool() {
        let (mut sampler, mut rx) = DownscaleSampler::new(&settings());
        sampler.offer(&frame_at(0));
        assert_eq!(sampler.pool().outstanding(), 1);

        drop(rx.try_recv().unwrap());
        assert_eq!(sampler.pool().outstanding(), 0);
        assert_eq!(sampler.pool().available(), 1);
    }

    #[test]
    fn test_falls_back_to_full_resolution() {
        let (mut sampler, mut rx) = DownscaleSampler::new(&settings());

        // Degenerate geometry cannot be scaled
        let mut odd = frame_at(0);
        odd.stride = 4;
        odd.data.truncate(16);
        assert_eq!(sampler.offer(&odd), SampleOutcome::FullResolution);

        let got = rx.try_recv().unwrap();
        assert!(!got.is_scaled());
        assert_eq!(got.dimensions(), Dimensions::new(128, 72));
        assert_eq!(sampler.stats().fallbacks, 1);
        assert_eq!(sampler.pool().outstanding(), 0);
    }

    #[test]
    fn test_restarted_timestamps_are_due() {
        let (mut sampler, mut rx) = DownscaleSampler::new(&settings());
        sampler.offer(&frame_at(5_000));
        rx.try_recv().unwrap();
        assert_eq!(sampler.offer(&frame_at(10)), SampleOutcome::Scaled);
    }

    #[test]
    fn test_closed_consumer() {
        let (mut sampler, rx) = DownscaleSampler::new(&settings());
        drop(rx);
        assert_eq!(sampler.offer(&frame_at(0)), SampleOutcome::Dropped);
    }
}
