//! Decoder for raw recordings

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{self, Pixel, Sample};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::util::frame::audio::Audio;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::Rational;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::SendScaler;
use crate::error::{Result, ScorecastError};
use crate::media::MediaReader;
use crate::types::{AudioChunk, AudioFormat, Dimensions, FrameSample, VideoFrame};

struct VideoInput {
    stream_index: usize,
    time_base: Rational,
    decoder: ffmpeg::decoder::Video,
    scaler: SendScaler,
    dimensions: Dimensions,
}

struct AudioInput {
    stream_index: usize,
    time_base: Rational,
    decoder: ffmpeg::decoder::Audio,
    format: AudioFormat,
    warned: bool,
}

/// FFmpeg implementation of [`MediaReader`]
///
/// Yields BGRA video frames and interleaved `f32` audio in decode order. Both
/// tracks share one time origin, the earliest stream start, so the offset
/// between audio and video survives decoding.
pub struct FfmpegReader {
    input: format::context::Input,
    origin: Origin,
    video: VideoInput,
    audio: Option<AudioInput>,
    frame_rate: Option<u32>,
    rotation: u32,
    pending: VecDeque<FrameSample>,
    eof: bool,
}

impl FfmpegReader {
    pub fn open(path: &Path) -> Result<Self> {
        let input = format::input(&path)
            .map_err(|e| ScorecastError::decoder(format!("Failed to open {}: {}", path.display(), e)))?;

        let (video, video_start, frame_rate, rotation) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| ScorecastError::decoder("No video stream"))?;

            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| ScorecastError::decoder(format!("Decoder context: {}", e)))?;
            let decoder = context
                .decoder()
                .video()
                .map_err(|e| ScorecastError::decoder(format!("Failed to open video decoder: {}", e)))?;

            let (width, height) = (decoder.width(), decoder.height());
            let scaler = scaling::Context::get(
                decoder.format(),
                width,
                height,
                Pixel::BGRA,
                width,
                height,
                Flags::BILINEAR,
            )
            .map_err(|e| ScorecastError::decoder(format!("Failed to create scaler: {}", e)))?;

            let fps = stream.avg_frame_rate();
            let frame_rate = (fps.1 != 0 && fps.0 > 0)
                .then(|| (fps.0 as f64 / fps.1 as f64).round() as u32);
            let rotation = stream
                .metadata()
                .get("rotate")
                .and_then(|r| r.parse::<i32>().ok())
                .map(|r| r.rem_euclid(360) as u32)
                .unwrap_or(0);

            let video = VideoInput {
                stream_index: stream.index(),
                time_base: stream.time_base(),
                decoder,
                scaler: SendScaler(scaler),
                dimensions: Dimensions::new(width, height),
            };
            let start = stream_start(stream.start_time(), stream.time_base());
            (video, start, frame_rate, rotation)
        };

        let mut audio_start = None;

        let audio = match input.streams().best(Type::Audio) {
            Some(stream) => {
                let opened = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                    .and_then(|c| c.decoder().audio());
                match opened {
                    Ok(decoder) => {
                        audio_start = stream_start(stream.start_time(), stream.time_base());
                        Some(AudioInput {
                            stream_index: stream.index(),
                            time_base: stream.time_base(),
                            format: AudioFormat {
                                sample_rate: decoder.rate(),
                                channels: decoder.channels() as u32,
                            },
                            decoder,
                            warned: false,
                        })
                    }
                    Err(e) => {
                        warn!("Ignoring undecodable audio stream: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        debug!(
            "Reader opened: {:?} ({} video, audio {:?}, {:?} fps, rotation {})",
            path,
            video.dimensions,
            audio.as_ref().map(|a| a.format),
            frame_rate,
            rotation
        );

        let origin = Origin(video_start.into_iter().chain(audio_start).min());

        Ok(Self {
            input,
            origin,
            video,
            audio,
            frame_rate,
            rotation,
            pending: VecDeque::new(),
            eof: false,
        })
    }

    fn drain_video(&mut self) -> Result<()> {
        let mut decoded = Video::empty();
        while self.video.decoder.receive_frame(&mut decoded).is_ok() {
            let mut bgra = Video::empty();
            self.video
                .scaler
                .run(&decoded, &mut bgra)
                .map_err(|e| ScorecastError::decoder(format!("Color conversion failed: {}", e)))?;

            let pts = self
                .origin
                .relative(decoded.timestamp().or(decoded.pts()), self.video.time_base);
            let frame = copy_bgra(&bgra, self.video.dimensions, pts);
            self.pending.push_back(FrameSample::Video(frame));
        }
        Ok(())
    }

    fn drain_audio(&mut self) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let mut decoded = Audio::empty();
        while audio.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(samples) = interleave_f32(&decoded, audio.format.channels as usize) else {
                if !audio.warned {
                    warn!("Unsupported audio sample format {:?}, audio dropped", decoded.format());
                    audio.warned = true;
                }
                continue;
            };
            let pts = self.origin.relative(decoded.pts(), audio.time_base);
            self.pending
                .push_back(FrameSample::Audio(AudioChunk::new(audio.format, samples, pts)));
        }
    }

    fn read_packet(&mut self) -> Result<()> {
        let next = self
            .input
            .packets()
            .next()
            .map(|(stream, packet)| (stream.index(), packet));

        let Some((index, packet)) = next else {
            self.eof = true;
            self.video.decoder.send_eof().ok();
            self.drain_video()?;
            if let Some(audio) = self.audio.as_mut() {
                audio.decoder.send_eof().ok();
            }
            self.drain_audio();
            return Ok(());
        };

        if index == self.video.stream_index {
            self.video
                .decoder
                .send_packet(&packet)
                .map_err(|e| ScorecastError::decoder(format!("Failed to decode video: {}", e)))?;
            self.drain_video()?;
        } else if let Some(audio) = self.audio.as_mut().filter(|a| a.stream_index == index) {
            if let Err(e) = audio.decoder.send_packet(&packet) {
                debug!("Skipping bad audio packet: {}", e);
            }
            self.drain_audio();
        }
        Ok(())
    }
}

/// Timestamp in nanoseconds on the container clock
fn pts_nanos(pts: i64, time_base: Rational) -> i128 {
    pts as i128 * time_base.0 as i128 * 1_000_000_000 / time_base.1.max(1) as i128
}

fn stream_start(start_time: i64, time_base: Rational) -> Option<i128> {
    (start_time != ffmpeg::ffi::AV_NOPTS_VALUE).then(|| pts_nanos(start_time, time_base))
}

/// Zero point shared by every track of one file
///
/// Falls back to the first decoded timestamp when the container does not
/// report stream start times.
#[derive(Debug, Default)]
struct Origin(Option<i128>);

impl Origin {
    fn relative(&mut self, pts: Option<i64>, time_base: Rational) -> Duration {
        let Some(pts) = pts else {
            return Duration::ZERO;
        };
        let nanos = pts_nanos(pts, time_base);
        let origin = *self.0.get_or_insert(nanos);
        Duration::from_nanos((nanos - origin).max(0) as u64)
    }
}

fn copy_bgra(frame: &Video, dimensions: Dimensions, pts: Duration) -> VideoFrame {
    let row_bytes = dimensions.width as usize * 4;
    let src_stride = frame.stride(0);
    let src = frame.data(0);
    let mut data = Vec::with_capacity(row_bytes * dimensions.height as usize);
    for y in 0..dimensions.height as usize {
        data.extend_from_slice(&src[y * src_stride..y * src_stride + row_bytes]);
    }
    VideoFrame::new(dimensions.width, dimensions.height, data, pts)
}

fn interleave_f32(frame: &Audio, channels: usize) -> Option<Vec<f32>> {
    let samples = frame.samples();
    match frame.format() {
        Sample::F32(format::sample::Type::Packed) => {
            let bytes = &frame.data(0)[..samples * channels * 4];
            bytemuck::try_cast_slice::<u8, f32>(bytes).ok().map(<[f32]>::to_vec)
        }
        Sample::F32(format::sample::Type::Planar) => {
            let planes: Vec<&[f32]> = (0..channels).map(|ch| frame.plane::<f32>(ch)).collect();
            let mut out = Vec::with_capacity(samples * channels);
            for i in 0..samples {
                out.extend(planes.iter().map(|p| p[i]));
            }
            Some(out)
        }
        _ => None,
    }
}

impl MediaReader for FfmpegReader {
    fn video_dimensions(&self) -> Dimensions {
        self.video.dimensions
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        self.audio.as_ref().map(|a| a.format)
    }

    fn frame_rate(&self) -> Option<u32> {
        self.frame_rate
    }

    fn rotation_degrees(&self) -> u32 {
        self.rotation
    }

    fn next_sample(&mut self) -> Result<Option<FrameSample>> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Ok(Some(sample));
            }
            if self.eof {
                return Ok(None);
            }
            self.read_packet()?;
        }
    }
}
