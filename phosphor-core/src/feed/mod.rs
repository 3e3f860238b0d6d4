//! The feed pipeline: five worker threads between the external demuxer and
//! the composer.
//!
//! demux -> packet queues -> decoders -> scaler/resampler -> double-buffers.
//! The composer runs on the caller's thread, consuming the two output
//! double-buffers synchronously; backpressure travels the other way through
//! the bounded queues. Every stage observes the shared abort flag and every
//! queue carries its own mutex/condvar pair.

pub mod audio;
pub mod dbuffer;
pub mod pattern;
pub mod queue;
pub mod sources;
pub mod video;

use std::sync::Arc;

use log::{info, warn};

use crate::errors::FeedError;
use crate::overlay::OverlayStack;
use crate::rational::Rational;
use crate::subtitles::{SubtitleEntry, SubtitleList};
use dbuffer::DoubleBuffer;
use queue::{Packet, PacketQueue, StreamKind, DEFAULT_QUEUE_BYTES};

/// Field order of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interlace {
    Progressive,
    TopFirst,
    BottomFirst,
}

/// One decoded video frame, packed 0RGB.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>,
    pub pts: Option<i64>,
    pub time_base: Rational,
    pub pixel_aspect: Rational,
    pub interlace: Interlace,
}

/// One decoded audio block, interleaved at the source's native rate.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub rate: u32,
    pub pts: i64,
    pub time_base: Rational,
}

/// A frame rescaled to the mode raster, ready for line composition.
#[derive(Debug, Clone)]
pub struct ScaledFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>,
    /// Source was wider than 1.55:1; drives WSS auto signalling.
    pub wide: bool,
}

/// External demuxer callback: packets in source order, `None` at EOF.
pub trait Demuxer: Send {
    fn read_packet(&mut self) -> Result<Option<Packet>, FeedError>;
}

/// External video decoder callback.
pub trait VideoDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>, FeedError>;
}

/// External audio decoder callback.
pub trait AudioDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioBlock>, FeedError>;
}

/// Inline subtitle decoder: runs on the demux thread, no queue behind it.
pub trait SubtitleDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<SubtitleEntry>, FeedError>;
}

/// Everything the upstream media library provides.
pub struct MediaSource {
    pub demuxer: Box<dyn Demuxer>,
    pub video: Option<Box<dyn VideoDecoder>>,
    pub audio: Option<Box<dyn AudioDecoder>>,
    pub subtitles: Option<Box<dyn SubtitleDecoder>>,
}

/// Raster and programme parameters resolved from the mode descriptor.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub raster_width: usize,
    pub raster_height: usize,
    pub frame_rate: Rational,
    pub audio_samples_per_frame: usize,
    pub letterbox: bool,
    pub pillarbox: bool,
    pub volume: f32,
    pub downmix: bool,
    /// Frames to skip before the first composed frame (position knob).
    pub start_offset_frames: i64,
}

/// Consumer view handed to the composer closure.
pub struct Feed<'a> {
    pub video: &'a DoubleBuffer<ScaledFrame>,
    pub audio: &'a DoubleBuffer<Vec<(f32, f32)>>,
}

/// Demux producer: dispatch packets by stream until EOF, then close every
/// queue so the consumers drain.
fn run_demux(
    mut demuxer: Box<dyn Demuxer>,
    mut subtitle_decoder: Option<Box<dyn SubtitleDecoder>>,
    video_queue: &PacketQueue,
    audio_queue: &PacketQueue,
    has_video: bool,
    has_audio: bool,
    subtitle_list: &SubtitleList,
) {
    loop {
        match demuxer.read_packet() {
            Ok(Some(packet)) => {
                let result = match packet.stream {
                    // Streams with no decoder are dropped, never queued:
                    // an unconsumed queue would fill and stall the demux
                    StreamKind::Video if !has_video => Ok(()),
                    StreamKind::Audio if !has_audio => Ok(()),
                    StreamKind::Video => video_queue.push(packet),
                    StreamKind::Audio => audio_queue.push(packet),
                    StreamKind::Subtitle => {
                        if let Some(decoder) = &mut subtitle_decoder {
                            match decoder.decode(&packet) {
                                Ok(entries) => {
                                    for entry in entries {
                                        subtitle_list.push(entry);
                                    }
                                }
                                Err(err) => warn!("subtitle decode failed: {err}"),
                            }
                        }
                        Ok(())
                    }
                };
                if matches!(result, Err(FeedError::Aborted)) {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("demux failed, ending all streams: {err}");
                break;
            }
        }
    }
    video_queue.finish();
    audio_queue.finish();
    info!("demux finished");
}

/// Run the whole feed pipeline, invoking `consumer` on the caller's thread
/// with the two output double-buffers. Returns the consumer's result after
/// all five workers have joined.
pub fn run_pipeline<R, F>(
    source: MediaSource,
    cfg: FeedConfig,
    overlays: OverlayStack,
    subtitle_list: Arc<SubtitleList>,
    consumer: F,
) -> R
where
    F: FnOnce(Feed<'_>) -> R,
{
    let video_queue = PacketQueue::new(DEFAULT_QUEUE_BYTES);
    let audio_queue = PacketQueue::new(DEFAULT_QUEUE_BYTES);
    let decoded_video: DoubleBuffer<VideoFrame> = DoubleBuffer::new();
    let scaled_video: DoubleBuffer<ScaledFrame> = DoubleBuffer::new();
    let decoded_audio: DoubleBuffer<AudioBlock> = DoubleBuffer::new();
    let programme_audio: DoubleBuffer<Vec<(f32, f32)>> = DoubleBuffer::new();

    let MediaSource {
        demuxer,
        video: video_decoder,
        audio: audio_decoder,
        subtitles: subtitle_decoder,
    } = source;

    let has_video = video_decoder.is_some();
    let has_audio = audio_decoder.is_some();

    crossbeam::thread::scope(|scope| {
        scope.spawn(|_| {
            run_demux(
                demuxer,
                subtitle_decoder,
                &video_queue,
                &audio_queue,
                has_video,
                has_audio,
                &subtitle_list,
            );
        });

        match video_decoder {
            Some(decoder) => {
                scope.spawn(|_| video::run_video_decoder(&video_queue, decoder, &decoded_video));
                scope.spawn(|_| {
                    video::run_video_scaler(&decoded_video, &scaled_video, &cfg, &overlays)
                });
            }
            None => {
                decoded_video.finish();
                scaled_video.finish();
            }
        }

        match audio_decoder {
            Some(decoder) => {
                scope.spawn(|_| audio::run_audio_decoder(&audio_queue, decoder, &decoded_audio));
                scope.spawn(|_| {
                    audio::run_audio_resampler(&decoded_audio, &programme_audio, &cfg)
                });
            }
            None => {
                decoded_audio.finish();
                programme_audio.finish();
            }
        }

        let result = consumer(Feed {
            video: &scaled_video,
            audio: &programme_audio,
        });

        // Graceful close: wake everything so the scope can join
        video_queue.abort();
        audio_queue.abort();
        decoded_video.abort();
        scaled_video.abort();
        decoded_audio.abort();
        programme_audio.abort();
        result
    })
    .expect("feed pipeline worker panicked")
}
