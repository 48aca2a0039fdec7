//! Container writer with H.264 and AAC encoders

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::{self, Pixel, Sample};
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::util::frame::audio::Audio;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{ChannelLayout, Dictionary, Rational};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{find_h264, format_name, SendScaler};
use crate::error::{Result, ScorecastError};
use crate::media::{AudioTrackParams, MediaMuxer, MuxerSummary, TrackParams, VideoTrackParams};
use crate::types::{AudioChunk, VideoFrame};

/// Video time base (90 kHz, the MPEG clock)
const VIDEO_TIME_BASE: Rational = Rational(1, 90_000);

struct VideoTrack {
    encoder: encoder::video::Encoder,
    scaler: Option<(u32, u32, SendScaler)>,
    bgra: Video,
    yuv: Video,
    stream_index: usize,
    last_pts: Option<i64>,
    frames: u64,
}

struct AudioTrack {
    encoder: encoder::audio::Encoder,
    frame: Audio,
    stream_index: usize,
    channels: usize,
    sample_rate: u32,
    frame_size: usize,
    /// Interleaved samples waiting for a full encoder frame
    pending: Vec<f32>,
    /// Pts of the first pending sample, in samples
    next_pts: Option<i64>,
    chunks: u64,
}

/// FFmpeg implementation of [`MediaMuxer`]
pub struct FfmpegMuxer {
    path: PathBuf,
    output: format::context::Output,
    video: VideoTrack,
    audio: Option<AudioTrack>,
    failed: bool,
}

impl FfmpegMuxer {
    /// Open `path`, set up both encoders and write the container header
    pub fn create(path: &Path, params: &TrackParams) -> Result<Self> {
        let mut output = format::output_as(&path, format_name(params.container)).map_err(|e| {
            ScorecastError::container(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let video = open_video(&mut output, &params.video, global_header)?;
        let audio = match &params.audio {
            Some(audio) => Some(open_audio(&mut output, audio, global_header)?),
            None => None,
        };

        output
            .write_header()
            .map_err(|e| ScorecastError::container(format!("Failed to write file header: {}", e)))?;

        info!(
            "Muxer opened: {:?} ({}, {}x{}, audio: {})",
            path,
            format_name(params.container),
            video.encoder.width(),
            video.encoder.height(),
            audio.is_some()
        );

        Ok(Self {
            path: path.to_path_buf(),
            output,
            video,
            audio,
            failed: false,
        })
    }

    fn stream_time_base(&self, index: usize) -> Rational {
        self.output
            .stream(index)
            .map(|s| s.time_base())
            .unwrap_or(VIDEO_TIME_BASE)
    }

    fn encode_audio_frames(&mut self, flush: bool) -> Result<()> {
        let Some(track) = self.audio.as_mut() else {
            return Ok(());
        };
        let per_frame = track.frame_size * track.channels;

        while track.pending.len() >= per_frame || (flush && !track.pending.is_empty()) {
            let take = per_frame.min(track.pending.len());
            let mut samples: Vec<f32> = track.pending.drain(..take).collect();
            samples.resize(per_frame, 0.0);

            // AAC takes planar float: one plane per channel
            for ch in 0..track.channels {
                let plane: &mut [f32] = track.frame.plane_mut(ch);
                for (i, sample) in plane.iter_mut().take(track.frame_size).enumerate() {
                    *sample = samples[i * track.channels + ch];
                }
            }

            let pts = track.next_pts.unwrap_or(0);
            track.frame.set_pts(Some(pts));
            track.next_pts = Some(pts + track.frame_size as i64);

            track
                .encoder
                .send_frame(&track.frame)
                .map_err(|e| ScorecastError::encoder(format!("Failed to send audio frame: {}", e)))?;

            let tb = self
                .output
                .stream(track.stream_index)
                .map(|s| s.time_base())
                .unwrap_or(Rational(1, track.sample_rate as i32));
            let enc_tb = Rational(1, track.sample_rate as i32);
            write_packets(&mut track.encoder, &mut self.output, track.stream_index, enc_tb, tb)?;
        }
        Ok(())
    }
}

fn open_video(
    output: &mut format::context::Output,
    params: &VideoTrackParams,
    global_header: bool,
) -> Result<VideoTrack> {
    let codec = find_h264().ok_or_else(|| ScorecastError::encoder("No H.264 encoder available"))?;

    // 4:2:0 needs even dimensions
    let width = params.dimensions.width & !1;
    let height = params.dimensions.height & !1;
    if width == 0 || height == 0 {
        return Err(ScorecastError::container(format!(
            "Cannot encode {} video",
            params.dimensions
        )));
    }

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(|e| ScorecastError::encoder(format!("Failed to create encoder context: {}", e)))?;

    let bitrate = params.bitrate_kbps as usize * 1000;
    let fps = params.fps.max(1) as i32;
    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_time_base(VIDEO_TIME_BASE);
    encoder.set_frame_rate(Some(Rational::new(fps, 1)));
    encoder.set_bit_rate(bitrate);
    encoder.set_max_bit_rate(bitrate * 2);
    encoder.set_gop(fps as u32 * 2);
    if params.realtime {
        encoder.set_max_b_frames(0);
    }
    if global_header {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    opts.set("profile", params.profile.ffmpeg_name());
    if params.realtime {
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");
    } else {
        opts.set("preset", "medium");
    }

    let encoder = encoder
        .open_with(opts)
        .map_err(|e| ScorecastError::encoder(format!("Failed to open H.264 encoder: {}", e)))?;

    let stream_index = {
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| ScorecastError::container(format!("Failed to add video stream: {}", e)))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(VIDEO_TIME_BASE);
        if params.rotation_degrees % 360 != 0 {
            set_display_rotation(&mut stream, params.rotation_degrees)?;
        }
        stream.index()
    };

    debug!(
        "Video track: {} {}x{} @ {} kbps, profile {}",
        codec.name(),
        width,
        height,
        params.bitrate_kbps,
        params.profile.ffmpeg_name()
    );

    Ok(VideoTrack {
        encoder,
        scaler: None,
        bgra: Video::empty(),
        yuv: Video::new(Pixel::YUV420P, width, height),
        stream_index,
        last_pts: None,
        frames: 0,
    })
}

/// Store the playback rotation as a display matrix on the stream
fn set_display_rotation(stream: &mut format::stream::StreamMut, degrees: u32) -> Result<()> {
    // SAFETY: the stream was just added to a live output context and its codec
    // parameters are allocated. rust-ffmpeg has no safe API for coded side data,
    // so we allocate a 3x3 display matrix through libavcodec and let
    // libavutil fill it. Both functions take ownership semantics FFmpeg expects.
    unsafe {
        let par = (*stream.as_mut_ptr()).codecpar;
        let side_data = ffmpeg::ffi::av_packet_side_data_new(
            &mut (*par).coded_side_data,
            &mut (*par).nb_coded_side_data,
            ffmpeg::ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
            9 * std::mem::size_of::<i32>(),
            0,
        );
        if side_data.is_null() {
            return Err(ScorecastError::container("Failed to allocate display matrix"));
        }
        // FFmpeg angles are counter-clockwise
        ffmpeg::ffi::av_display_rotation_set((*side_data).data as *mut i32, -(degrees as f64));
    }
    Ok(())
}

fn open_audio(
    output: &mut format::context::Output,
    params: &AudioTrackParams,
    global_header: bool,
) -> Result<AudioTrack> {
    let codec = encoder::find_by_name("aac")
        .ok_or_else(|| ScorecastError::encoder("AAC encoder not found"))?;

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .audio()
        .map_err(|e| ScorecastError::encoder(format!("Failed to create audio encoder: {}", e)))?;

    let channel_layout = match params.format.channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        6 => ChannelLayout::_5POINT1,
        8 => ChannelLayout::_7POINT1,
        n => {
            warn!("Unusual channel count {}, defaulting to stereo", n);
            ChannelLayout::STEREO
        }
    };
    let channels = if matches!(params.format.channels, 1 | 2 | 6 | 8) {
        params.format.channels as usize
    } else {
        2
    };
    let sample_format = Sample::F32(format::sample::Type::Planar);
    let time_base = Rational::new(1, params.format.sample_rate as i32);

    encoder.set_rate(params.format.sample_rate as i32);
    encoder.set_bit_rate(params.bitrate_kbps as usize * 1000);
    encoder.set_format(sample_format);
    encoder.set_time_base(time_base);
    encoder.set_channel_layout(channel_layout);
    if global_header {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    opts.set("aac_coder", "twoloop");
    let encoder = encoder
        .open_with(opts)
        .map_err(|e| ScorecastError::encoder(format!("Failed to open audio encoder: {}", e)))?;

    let frame_size = match encoder.frame_size() as usize {
        0 => 1024,
        n => n,
    };

    let stream_index = {
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| ScorecastError::container(format!("Failed to add audio stream: {}", e)))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        stream.index()
    };

    debug!(
        "Audio track: AAC {}ch @ {}Hz, {} kbps, frame_size={}",
        channels, params.format.sample_rate, params.bitrate_kbps, frame_size
    );

    let mut frame = Audio::new(sample_format, frame_size, channel_layout);
    frame.set_rate(params.format.sample_rate);

    Ok(AudioTrack {
        encoder,
        frame,
        stream_index,
        channels,
        sample_rate: params.format.sample_rate,
        frame_size,
        pending: Vec::with_capacity(frame_size * channels * 2),
        next_pts: None,
        chunks: 0,
    })
}

/// Move every packet the encoder has ready into the container
fn write_packets(
    encoder: &mut encoder::Encoder,
    output: &mut format::context::Output,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
) -> Result<()> {
    let mut packet = ffmpeg::Packet::empty();
    loop {
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                packet.set_stream(stream_index);
                packet.rescale_ts(encoder_time_base, stream_time_base);
                trace!(
                    "Packet: stream={}, pts={:?}, size={}",
                    stream_index,
                    packet.pts(),
                    packet.size()
                );
                packet
                    .write_interleaved(output)
                    .map_err(|e| ScorecastError::container(format!("Failed to write packet: {}", e)))?;
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => {
                return Err(ScorecastError::encoder(format!(
                    "Failed to receive packet: {}",
                    e
                )));
            }
        }
    }
    Ok(())
}

fn duration_to_ticks(d: Duration, time_base: Rational) -> i64 {
    (d.as_nanos() as i128 * time_base.1 as i128 / (time_base.0 as i128 * 1_000_000_000)) as i64
}

/// Where an incoming audio chunk starts relative to the end of the queued samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioAlignment {
    Contiguous,
    /// Chunk starts this many sample frames after the queue ends
    Gap(usize),
    /// Chunk starts this many sample frames before the queue ends
    Overlap(usize),
}

/// Compare a chunk's start with the expected one, both in samples
///
/// Drift within `tolerance` (half an encoder frame at the call site) is
/// capture jitter and the chunk is appended as is.
fn align_audio(expected: i64, actual: i64, tolerance: i64) -> AudioAlignment {
    let drift = actual - expected;
    if drift > tolerance {
        AudioAlignment::Gap(drift as usize)
    } else if drift < -tolerance {
        AudioAlignment::Overlap(drift.unsigned_abs() as usize)
    } else {
        AudioAlignment::Contiguous
    }
}

impl MediaMuxer for FfmpegMuxer {
    fn is_video_ready(&self) -> bool {
        !self.failed
    }

    fn is_audio_ready(&self) -> bool {
        !self.failed && self.audio.is_some()
    }

    fn append_video(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()> {
        let ticks = duration_to_ticks(pts, VIDEO_TIME_BASE);
        let track = &mut self.video;
        if track.last_pts.is_some_and(|last| ticks <= last) {
            return Err(ScorecastError::encoder(format!(
                "Non-increasing video timestamp {:?}",
                pts
            )));
        }

        // Copy the BGRA rows into an FFmpeg frame
        if track.bgra.width() != frame.width || track.bgra.height() != frame.height {
            track.bgra = Video::new(Pixel::BGRA, frame.width, frame.height);
        }
        let dst_stride = track.bgra.stride(0);
        let row_bytes = frame.width as usize * 4;
        let src_stride = frame.stride as usize;
        let dst = track.bgra.data_mut(0);
        for y in 0..frame.height as usize {
            let src = &frame.data[y * src_stride..y * src_stride + row_bytes];
            dst[y * dst_stride..y * dst_stride + row_bytes].copy_from_slice(src);
        }

        let rebuild = !matches!(&track.scaler, Some((w, h, _)) if *w == frame.width && *h == frame.height);
        if rebuild {
            let scaler = scaling::Context::get(
                Pixel::BGRA,
                frame.width,
                frame.height,
                Pixel::YUV420P,
                track.encoder.width(),
                track.encoder.height(),
                Flags::BILINEAR,
            )
            .map_err(|e| ScorecastError::encoder(format!("Failed to create scaler: {}", e)))?;
            track.scaler = Some((frame.width, frame.height, SendScaler(scaler)));
        }
        if let Some((_, _, scaler)) = track.scaler.as_mut() {
            scaler
                .run(&track.bgra, &mut track.yuv)
                .map_err(|e| ScorecastError::encoder(format!("Color conversion failed: {}", e)))?;
        }

        track.yuv.set_pts(Some(ticks));
        track
            .encoder
            .send_frame(&track.yuv)
            .map_err(|e| ScorecastError::encoder(format!("Failed to send frame: {}", e)))?;
        track.last_pts = Some(ticks);
        track.frames += 1;

        let index = track.stream_index;
        let stream_tb = self.stream_time_base(index);
        if let Err(e) = write_packets(
            &mut self.video.encoder,
            &mut self.output,
            index,
            VIDEO_TIME_BASE,
            stream_tb,
        ) {
            self.failed = true;
            return Err(e);
        }
        Ok(())
    }

    fn append_audio(&mut self, chunk: &AudioChunk, pts: Duration) -> Result<()> {
        let Some(track) = self.audio.as_mut() else {
            return Err(ScorecastError::encoder("No audio track"));
        };
        if chunk.format.channels as usize != track.channels
            || chunk.format.sample_rate != track.sample_rate
        {
            return Err(ScorecastError::encoder(format!(
                "Audio format {}Hz/{}ch does not match track {}Hz/{}ch",
                chunk.format.sample_rate, chunk.format.channels, track.sample_rate, track.channels
            )));
        }

        let chunk_start = duration_to_ticks(pts, Rational(1, track.sample_rate as i32));
        let samples: &[f32] = match track.next_pts {
            None => {
                track.next_pts = Some(chunk_start);
                &chunk.samples
            }
            Some(next) => {
                let queued_end = next + (track.pending.len() / track.channels) as i64;
                match align_audio(queued_end, chunk_start, track.frame_size as i64 / 2) {
                    AudioAlignment::Contiguous => &chunk.samples,
                    AudioAlignment::Gap(frames) => {
                        debug!("Audio gap of {} samples at {:?}, padding with silence", frames, pts);
                        let padded = track.pending.len() + frames * track.channels;
                        track.pending.resize(padded, 0.0);
                        &chunk.samples
                    }
                    AudioAlignment::Overlap(frames) => {
                        trace!("Audio chunk at {:?} overlaps by {} samples", pts, frames);
                        let skip = (frames * track.channels).min(chunk.samples.len());
                        &chunk.samples[skip..]
                    }
                }
            }
        };
        track.pending.extend_from_slice(samples);
        track.chunks += 1;

        if let Err(e) = self.encode_audio_frames(false) {
            self.failed = true;
            return Err(e);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<MuxerSummary> {
        // Pad and encode the audio tail, then drain both encoders
        self.encode_audio_frames(true)?;

        self.video
            .encoder
            .send_eof()
            .map_err(|e| ScorecastError::encoder(format!("Failed to send EOF: {}", e)))?;
        let video_index = self.video.stream_index;
        let video_tb = self.stream_time_base(video_index);
        write_packets(
            &mut self.video.encoder,
            &mut self.output,
            video_index,
            VIDEO_TIME_BASE,
            video_tb,
        )?;

        let mut audio_chunks = 0;
        if let Some(track) = self.audio.as_mut() {
            track
                .encoder
                .send_eof()
                .map_err(|e| ScorecastError::encoder(format!("Failed to send audio EOF: {}", e)))?;
            let tb = self
                .output
                .stream(track.stream_index)
                .map(|s| s.time_base())
                .unwrap_or(Rational(1, track.sample_rate as i32));
            write_packets(
                &mut track.encoder,
                &mut self.output,
                track.stream_index,
                Rational(1, track.sample_rate as i32),
                tb,
            )?;
            audio_chunks = track.chunks;
        }

        self.output
            .write_trailer()
            .map_err(|e| ScorecastError::container(format!("Failed to write file trailer: {}", e)))?;

        info!(
            "Container complete: {:?} ({} video frames, {} audio chunks)",
            self.path, self.video.frames, audio_chunks
        );

        Ok(MuxerSummary {
            path: self.path.clone(),
            video_frames: self.video.frames,
            audio_chunks,
        })
    }
}
