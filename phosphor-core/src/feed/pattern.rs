//! Built-in test source: EBU 75% colour bars with a stereo ident tone.
//!
//! Runs the whole pipeline with no external media and gives the
//! integration tests a deterministic picture.

use std::f32::consts::TAU;

use crate::errors::FeedError;
use crate::feed::queue::{Packet, StreamKind};
use crate::feed::{
    AudioBlock, AudioDecoder, Demuxer, Interlace, MediaSource, VideoDecoder, VideoFrame,
};
use crate::rational::Rational;

/// 75% EBU bars, left to right.
const BARS: [u32; 8] = [
    0x00BFBFBF, 0x00BFBF00, 0x0000BFBF, 0x0000BF00, 0x00BF00BF, 0x00BF0000, 0x000000BF,
    0x00000000,
];

const TONE_HZ: f32 = 1000.0;
const TONE_LEVEL: f32 = 0.5;
const AUDIO_RATE: u32 = 32_000;

/// Demuxer half: interleaves one video and one audio packet per frame.
struct PatternDemuxer {
    frame: u64,
    limit: Option<u64>,
    pending_audio: bool,
}

impl Demuxer for PatternDemuxer {
    fn read_packet(&mut self) -> Result<Option<Packet>, FeedError> {
        if self.pending_audio {
            self.pending_audio = false;
            let pts = self.frame as i64 - 1;
            return Ok(Some(Packet {
                stream: StreamKind::Audio,
                pts,
                data: pts.to_le_bytes().to_vec(),
            }));
        }
        if let Some(limit) = self.limit {
            if self.frame >= limit {
                return Ok(None);
            }
        }
        let pts = self.frame as i64;
        self.frame += 1;
        self.pending_audio = true;
        Ok(Some(Packet {
            stream: StreamKind::Video,
            pts,
            data: pts.to_le_bytes().to_vec(),
        }))
    }
}

struct PatternVideoDecoder {
    width: usize,
    height: usize,
    frame_rate: Rational,
}

impl VideoDecoder for PatternVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>, FeedError> {
        let mut data = vec![0u32; self.width * self.height];
        for (x, pixel) in data[..self.width].iter_mut().enumerate() {
            *pixel = BARS[(x * BARS.len()) / self.width];
        }
        let first_row = data[..self.width].to_vec();
        for row in data.chunks_mut(self.width).skip(1) {
            row.copy_from_slice(&first_row);
        }
        Ok(vec![VideoFrame {
            width: self.width,
            height: self.height,
            data,
            pts: Some(packet.pts),
            // Frame-count timebase: one tick per frame
            time_base: self.frame_rate.recip(),
            pixel_aspect: Rational::integer(1),
            interlace: Interlace::Progressive,
        }])
    }
}

struct PatternAudioDecoder {
    frame_rate: Rational,
    phase: f32,
}

impl AudioDecoder for PatternAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioBlock>, FeedError> {
        let per_frame = (Rational::integer(AUDIO_RATE as i64) / self.frame_rate).ceil() as usize;
        let step = TAU * TONE_HZ / AUDIO_RATE as f32;
        let mut samples = Vec::with_capacity(per_frame * 2);
        for _ in 0..per_frame {
            let s = TONE_LEVEL * self.phase.sin();
            samples.push(s);
            samples.push(s);
            self.phase = (self.phase + step) % TAU;
        }
        Ok(vec![AudioBlock {
            samples,
            channels: 2,
            rate: AUDIO_RATE,
            pts: packet.pts,
            time_base: self.frame_rate.recip(),
        }])
    }
}

/// Stand-alone bars decoder for sources that supply their own audio.
pub fn bars_video_decoder(
    width: usize,
    height: usize,
    frame_rate: Rational,
) -> Box<dyn VideoDecoder> {
    Box::new(PatternVideoDecoder {
        width,
        height,
        frame_rate,
    })
}

/// Assemble the bars-and-tone source. `limit` bounds the stream length in
/// frames; `None` runs until aborted.
pub fn bars_and_tone(
    width: usize,
    height: usize,
    frame_rate: Rational,
    limit: Option<u64>,
) -> MediaSource {
    MediaSource {
        demuxer: Box::new(PatternDemuxer {
            frame: 0,
            limit,
            pending_audio: false,
        }),
        video: Some(Box::new(PatternVideoDecoder {
            width,
            height,
            frame_rate,
        })),
        audio: Some(Box::new(PatternAudioDecoder {
            frame_rate,
            phase: 0.0,
        })),
        subtitles: None,
    }
}
