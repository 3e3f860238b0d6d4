//! Bundled media sources backed by symphonia.
//!
//! The audio-file source plays an MP3/AAC/WAV/FLAC file as the programme
//! sound while the built-in bars generator supplies vision. The demuxer
//! half paces synthetic video packets against the audio stream clock so
//! the time-align policy sees a normally interleaved programme.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::errors::{ConfigError, FeedError, TvError};
use crate::feed::pattern::bars_video_decoder;
use crate::feed::queue::{Packet, StreamKind};
use crate::feed::{AudioBlock, AudioDecoder, Demuxer, MediaSource};
use crate::rational::Rational;

struct SymphoniaDemuxer {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    time_base: Rational,
    frame_rate: Rational,
    next_video_frame: i64,
    pending_audio: Option<Packet>,
    finished: bool,
}

impl SymphoniaDemuxer {
    /// Video frame index an audio timestamp falls in.
    fn frame_of(&self, ts: i64) -> i64 {
        let num = ts as i128 * self.time_base.num() as i128 * self.frame_rate.num() as i128;
        let den = self.time_base.den() as i128 * self.frame_rate.den() as i128;
        num.div_euclid(den) as i64
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn read_packet(&mut self) -> Result<Option<Packet>, FeedError> {
        if let Some(packet) = self.pending_audio.take() {
            return Ok(Some(packet));
        }
        if self.finished {
            return Ok(None);
        }
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(_) => {
                    self.finished = true;
                    return Ok(None);
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let ts = packet.ts() as i64;
            let audio = Packet {
                stream: StreamKind::Audio,
                pts: ts,
                data: packet.buf().to_vec(),
            };
            // Emit the video frame covering this timestamp first
            if self.frame_of(ts) >= self.next_video_frame {
                let frame = self.next_video_frame;
                self.next_video_frame += 1;
                self.pending_audio = Some(audio);
                return Ok(Some(Packet {
                    stream: StreamKind::Video,
                    pts: frame,
                    data: Vec::new(),
                }));
            }
            return Ok(Some(audio));
        }
    }
}

struct SymphoniaAudioDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    rate: u32,
    time_base: Rational,
}

impl AudioDecoder for SymphoniaAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioBlock>, FeedError> {
        let spacket = symphonia::core::formats::Packet::new_from_slice(
            self.track_id,
            packet.pts.max(0) as u64,
            0,
            &packet.data,
        );
        let decoded = self.decoder.decode(&spacket).map_err(|e| FeedError::Decode {
            reason: e.to_string(),
        })?;
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        Ok(vec![AudioBlock {
            samples: buffer.samples().to_vec(),
            channels,
            rate: self.rate,
            pts: packet.pts,
            time_base: self.time_base,
        }])
    }
}

/// Open an audio file as a programme source, with bars for vision.
pub fn audio_file(
    path: &Path,
    raster_width: usize,
    raster_height: usize,
    frame_rate: Rational,
) -> Result<MediaSource, TvError> {
    let file = File::open(path).map_err(|e| {
        TvError::Config(ConfigError::InvalidParameter {
            name: "input".to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            TvError::Config(ConfigError::InvalidParameter {
                name: "input".to_string(),
                reason: format!("unrecognized format: {e}"),
            })
        })?;

    let reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            TvError::Config(ConfigError::InvalidParameter {
                name: "input".to_string(),
                reason: "no audio track found".to_string(),
            })
        })?;
    let track_id = track.id;
    let rate = track.codec_params.sample_rate.ok_or_else(|| {
        TvError::Config(ConfigError::InvalidParameter {
            name: "input".to_string(),
            reason: "unknown sample rate".to_string(),
        })
    })?;
    let time_base = track
        .codec_params
        .time_base
        .map(|tb| Rational::new(tb.numer as i64, tb.denom as i64))
        .unwrap_or_else(|| Rational::new(1, rate as i64));

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| {
            TvError::Config(ConfigError::InvalidParameter {
                name: "input".to_string(),
                reason: format!("no decoder: {e}"),
            })
        })?;

    Ok(MediaSource {
        demuxer: Box::new(SymphoniaDemuxer {
            reader,
            track_id,
            time_base,
            frame_rate,
            next_video_frame: 0,
            pending_audio: None,
            finished: false,
        }),
        video: Some(bars_video_decoder(raster_width, raster_height, frame_rate)),
        audio: Some(Box::new(SymphoniaAudioDecoder {
            decoder,
            track_id,
            rate,
            time_base,
        })),
        subtitles: None,
    })
}
