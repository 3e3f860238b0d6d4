//! Audio side of the feed pipeline: the decode consumer and the resampler
//! that delivers exactly one programme block per video frame at 32 kHz.

use log::{info, warn};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::dsp::PolyphaseResampler;
use crate::errors::FeedError;
use crate::feed::dbuffer::{DoubleBuffer, Tick};
use crate::feed::queue::PacketQueue;
use crate::feed::{AudioBlock, AudioDecoder, FeedConfig};
use crate::rational::Rational;

/// Pipeline programme rate, Hz.
pub const PROGRAMME_RATE: usize = 32_000;
/// Resampler input chunk, frames.
const CHUNK_FRAMES: usize = 1024;

/// Decoder consumer: pops packets, pushes decoded blocks downstream.
pub fn run_audio_decoder(
    queue: &PacketQueue,
    mut decoder: Box<dyn AudioDecoder>,
    decoded: &DoubleBuffer<AudioBlock>,
) {
    loop {
        let packet = match queue.pop() {
            Ok(packet) => packet,
            Err(FeedError::EndOfStream) => break,
            Err(_) => return,
        };
        match decoder.decode(&packet) {
            Ok(blocks) => {
                for block in blocks {
                    if decoded.put_fresh(block).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!("audio decode failed, ending stream: {err}");
                break;
            }
        }
    }
    decoded.finish();
    info!("audio decoder drained");
}

/// Mix an interleaved multi-channel block down to stereo pairs.
fn to_stereo(block: &AudioBlock, downmix: bool, volume: f32) -> Vec<(f32, f32)> {
    let ch = block.channels.max(1);
    let frames = block.samples.len() / ch;
    let mut out = Vec::with_capacity(frames);
    for f in 0..frames {
        let frame = &block.samples[f * ch..(f + 1) * ch];
        let (l, r) = match ch {
            1 => (frame[0], frame[0]),
            2 => (frame[0], frame[1]),
            _ if downmix => {
                // Fold centre and surrounds into the front pair
                let centre = frame.get(2).copied().unwrap_or(0.0) * 0.7071;
                let sl = frame.get(4).copied().unwrap_or(0.0) * 0.5;
                let sr = frame.get(5).copied().unwrap_or(0.0) * 0.5;
                (frame[0] + centre + sl, frame[1] + centre + sr)
            }
            _ => (frame[0], frame[1]),
        };
        out.push(((l * volume).clamp(-1.0, 1.0), (r * volume).clamp(-1.0, 1.0)));
    }
    out
}

/// Stereo converter to the programme rate. Small rational ratios (48 kHz
/// is 3:2 against 32 kHz) take the exact polyphase path; anything else
/// goes through the polynomial converter.
enum StereoResampler {
    Passthrough,
    Rational {
        left: PolyphaseResampler,
        right: PolyphaseResampler,
    },
    Polynomial {
        inner: FastFixedIn<f32>,
        pending: Vec<(f32, f32)>,
    },
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl StereoResampler {
    fn new(native_rate: u32) -> Result<Self, FeedError> {
        let native = native_rate as usize;
        if native == PROGRAMME_RATE {
            return Ok(StereoResampler::Passthrough);
        }
        let g = gcd(PROGRAMME_RATE, native);
        let (up, down) = (PROGRAMME_RATE / g, native / g);
        if up * down <= 64 {
            return Ok(StereoResampler::Rational {
                left: PolyphaseResampler::new(up, down, 16),
                right: PolyphaseResampler::new(up, down, 16),
            });
        }
        let inner = FastFixedIn::<f32>::new(
            PROGRAMME_RATE as f64 / native_rate as f64,
            1.0,
            PolynomialDegree::Linear,
            CHUNK_FRAMES,
            2,
        )
        .map_err(|e| FeedError::Resample {
            reason: e.to_string(),
        })?;
        Ok(StereoResampler::Polynomial {
            inner,
            pending: Vec::new(),
        })
    }

    fn push(&mut self, samples: &[(f32, f32)], out: &mut Vec<(f32, f32)>) -> Result<(), FeedError> {
        match self {
            StereoResampler::Passthrough => {
                out.extend_from_slice(samples);
                Ok(())
            }
            StereoResampler::Rational { left, right } => {
                let mut l_out = Vec::new();
                let mut r_out = Vec::new();
                for &(l, r) in samples {
                    left.push(l as f64, &mut l_out);
                    right.push(r as f64, &mut r_out);
                }
                out.extend(
                    l_out
                        .iter()
                        .zip(r_out.iter())
                        .map(|(&l, &r)| (l as f32, r as f32)),
                );
                Ok(())
            }
            StereoResampler::Polynomial { inner, pending } => {
                pending.extend_from_slice(samples);
                let mut input = vec![Vec::with_capacity(CHUNK_FRAMES); 2];
                while pending.len() >= CHUNK_FRAMES {
                    input[0].clear();
                    input[1].clear();
                    for (l, r) in pending.drain(..CHUNK_FRAMES) {
                        input[0].push(l);
                        input[1].push(r);
                    }
                    let produced = inner.process(&input, None).map_err(|e| FeedError::Resample {
                        reason: e.to_string(),
                    })?;
                    out.extend(
                        produced[0]
                            .iter()
                            .zip(produced[1].iter())
                            .map(|(&l, &r)| (l, r)),
                    );
                }
                Ok(())
            }
        }
    }

    /// Flush the final partial chunk, zero-padded.
    fn finish(&mut self, out: &mut Vec<(f32, f32)>) -> Result<(), FeedError> {
        match self {
            StereoResampler::Passthrough | StereoResampler::Rational { .. } => Ok(()),
            StereoResampler::Polynomial { inner, pending } => {
                if pending.is_empty() {
                    return Ok(());
                }
                let tail: Vec<(f32, f32)> = pending.drain(..).collect();
                let mut input = vec![vec![0.0f32; CHUNK_FRAMES]; 2];
                for (i, &(l, r)) in tail.iter().enumerate() {
                    input[0][i] = l;
                    input[1][i] = r;
                }
                let produced = inner.process(&input, None).map_err(|e| FeedError::Resample {
                    reason: e.to_string(),
                })?;
                out.extend(
                    produced[0]
                        .iter()
                        .zip(produced[1].iter())
                        .map(|(&l, &r)| (l, r)),
                );
                Ok(())
            }
        }
    }
}

/// Resampler consumer: native blocks in, exact per-frame programme blocks
/// out. The first block's PTS sets the initial skew, corrected by trimming
/// input or inserting silence.
pub fn run_audio_resampler(
    decoded: &DoubleBuffer<AudioBlock>,
    programme: &DoubleBuffer<Vec<(f32, f32)>>,
    cfg: &FeedConfig,
) {
    let per_frame = cfg.audio_samples_per_frame;
    let mut fifo: Vec<(f32, f32)> = Vec::with_capacity(per_frame * 4);
    let mut resampler: Option<StereoResampler> = None;
    let mut skew_handled = false;
    // The position knob drops whole frames of programme so audio stays
    // aligned with the video frames the scaler drops
    let mut trim_remaining: usize = cfg.start_offset_frames.max(0) as usize * per_frame;

    loop {
        let block = match decoded.take() {
            Ok(Tick::Fresh(block)) => block,
            Ok(Tick::Repeat) => continue,
            Err(FeedError::EndOfStream) => break,
            Err(_) => return,
        };

        if !skew_handled {
            skew_handled = true;
            let skew = Rational::rescale(
                block.pts,
                block.time_base,
                Rational::new(1, PROGRAMME_RATE as i64),
            );
            if skew > 0 {
                let pad = (skew as usize).saturating_sub(trim_remaining);
                trim_remaining = trim_remaining.saturating_sub(skew as usize);
                fifo.extend(std::iter::repeat((0.0f32, 0.0f32)).take(pad));
            } else {
                trim_remaining += (-skew) as usize;
            }
        }

        let converter = match &mut resampler {
            Some(r) => r,
            None => match StereoResampler::new(block.rate) {
                Ok(r) => resampler.insert(r),
                Err(err) => {
                    warn!("audio resampler unavailable, ending stream: {err}");
                    break;
                }
            },
        };

        let mut stereo = to_stereo(&block, cfg.downmix, cfg.volume);
        if trim_remaining > 0 {
            let n = trim_remaining.min(stereo.len());
            stereo.drain(..n);
            trim_remaining -= n;
        }
        if converter.push(&stereo, &mut fifo).is_err() {
            warn!("audio resample failed, ending stream");
            break;
        }

        while fifo.len() >= per_frame {
            let frame: Vec<(f32, f32)> = fifo.drain(..per_frame).collect();
            if programme.put_fresh(frame).is_err() {
                return;
            }
        }
    }

    // Drain the converter and pad the final partial frame with silence
    if let Some(converter) = &mut resampler {
        let _ = converter.finish(&mut fifo);
    }
    if !fifo.is_empty() {
        fifo.resize(per_frame, (0.0, 0.0));
        let _ = programme.put_fresh(fifo);
    }
    programme.finish();
    info!("audio resampler drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_stereo_mono_duplicates() {
        let block = AudioBlock {
            samples: vec![0.5, -0.5],
            channels: 1,
            rate: 32_000,
            pts: 0,
            time_base: Rational::new(1, 32_000),
        };
        let stereo = to_stereo(&block, false, 1.0);
        assert_eq!(stereo, vec![(0.5, 0.5), (-0.5, -0.5)]);
    }

    #[test]
    fn test_to_stereo_volume_clamps() {
        let block = AudioBlock {
            samples: vec![0.9, -0.9],
            channels: 2,
            rate: 32_000,
            pts: 0,
            time_base: Rational::new(1, 32_000),
        };
        let stereo = to_stereo(&block, false, 2.0);
        assert_eq!(stereo, vec![(1.0, -1.0)]);
    }

    #[test]
    fn test_to_stereo_downmix_folds_centre() {
        let block = AudioBlock {
            samples: vec![0.2, 0.2, 0.4, 0.0, 0.0, 0.0],
            channels: 6,
            rate: 48_000,
            pts: 0,
            time_base: Rational::new(1, 48_000),
        };
        let with = to_stereo(&block, true, 1.0);
        let without = to_stereo(&block, false, 1.0);
        assert!(with[0].0 > without[0].0);
    }

    #[test]
    fn test_passthrough_resampler_is_exact() {
        let mut rs = StereoResampler::new(32_000).unwrap();
        let mut out = Vec::new();
        let input: Vec<(f32, f32)> = (0..100).map(|i| (i as f32, -(i as f32))).collect();
        rs.push(&input, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_resampler_rate_conversion_count() {
        // 48 kHz to 32 kHz: 3 input chunks of 1024 produce ~2048 outputs
        let mut rs = StereoResampler::new(48_000).unwrap();
        let mut out = Vec::new();
        let input = vec![(0.1f32, 0.1f32); 3 * CHUNK_FRAMES];
        rs.push(&input, &mut out).unwrap();
        let expected = 3 * CHUNK_FRAMES * 2 / 3;
        let tolerance = CHUNK_FRAMES;
        assert!(
            (out.len() as i64 - expected as i64).unsigned_abs() as usize <= tolerance,
            "got {} expected about {}",
            out.len(),
            expected
        );
    }
}
