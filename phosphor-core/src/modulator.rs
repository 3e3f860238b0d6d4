//! IQ modulator and output shaper.
//!
//! Consumes the composer's real baseband and produces what the sink wants:
//! real samples at baseband, vestigial-sideband AM on a low-IF carrier,
//! wide FM for the MAC family, or SSB. Filter coefficients are designed
//! once at construction; the per-sample path is multiply-accumulate only.

use num_complex::Complex64;

use crate::dsp::fir::design_lowpass;
use crate::dsp::{ComplexNco, HilbertTransformer};
use crate::errors::SinkError;
use crate::modes::{ModeDescriptor, ModulationKind};

/// Where the modulated samples go. Interleaved I/Q for complex outputs,
/// plain samples for real baseband.
pub trait SampleSink {
    fn write_i16(&mut self, samples: &[i16]) -> Result<(), SinkError>;
}

/// Vestigial-sideband width below the carrier, Hz.
const VSB_LOWER_HZ: f64 = 750_000.0;
const VSB_TAPS: usize = 129;

/// Complex band-shaping filter over a real input stream.
struct ComplexFir {
    taps: Vec<Complex64>,
    history: Vec<f64>,
    cursor: usize,
}

impl ComplexFir {
    /// Asymmetric passband: a low-pass prototype of half the total width
    /// rotated up so the band covers -lower..+upper around the carrier.
    fn vsb(upper_hz: f64, lower_hz: f64, sample_rate: f64, taps: usize) -> Self {
        let half_width = (upper_hz + lower_hz) / 2.0;
        let shift = (upper_hz - lower_hz) / 2.0;
        let proto = design_lowpass(half_width / sample_rate, taps);
        let step = std::f64::consts::TAU * shift / sample_rate;
        let taps = proto
            .iter()
            .enumerate()
            .map(|(n, &h)| {
                let phase = step * (n as f64 - (taps / 2) as f64);
                Complex64::new(phase.cos(), phase.sin()) * h
            })
            .collect::<Vec<_>>();
        Self {
            history: vec![0.0; taps.len()],
            cursor: 0,
            taps,
        }
    }

    fn process(&mut self, sample: f64) -> Complex64 {
        self.history[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.history.len();
        let mut acc = Complex64::new(0.0, 0.0);
        for (i, &t) in self.taps.iter().enumerate() {
            let idx = (self.cursor + i) % self.history.len();
            acc += t * self.history[idx];
        }
        acc
    }
}

enum Shaper {
    /// Real baseband straight through.
    Baseband,
    /// Negative (or positive for System L) AM with a vestigial sideband.
    AmVsb {
        filter: ComplexFir,
        carrier: ComplexNco,
        positive: bool,
        sync: f64,
        white: f64,
    },
    /// Wide FM, MAC and satellite style.
    FmWide {
        carrier: ComplexNco,
        deviation_step: f64,
        phase: f64,
    },
    /// Single sideband via the Hilbert pair.
    Ssb {
        hilbert: HilbertTransformer,
        delay: std::collections::VecDeque<f64>,
        carrier: ComplexNco,
    },
}

pub struct IqModulator {
    shaper: Shaper,
    gain: f64,
}

impl IqModulator {
    /// `frequency_hz` of zero selects plain baseband output regardless of
    /// the mode's RF system.
    pub fn new(mode: &ModeDescriptor, frequency_hz: f64, gain_db: f64) -> Self {
        let sample_rate = mode.sample_rate.as_f64();
        let gain = 10f64.powf(gain_db / 20.0);
        let shaper = if frequency_hz == 0.0 {
            Shaper::Baseband
        } else {
            match mode.modulation {
                ModulationKind::AmVsb => {
                    // Pass everything up to the highest sound subcarrier
                    let top_audio = mode
                        .audio
                        .iter()
                        .map(|c| c.freq_hz)
                        .chain(mode.nicam.map(|n| n.freq_hz))
                        .fold(4_500_000.0, f64::max);
                    let upper = (top_audio + 500_000.0).min(sample_rate * 0.45);
                    Shaper::AmVsb {
                        filter: ComplexFir::vsb(upper, VSB_LOWER_HZ, sample_rate, VSB_TAPS),
                        carrier: ComplexNco::new(frequency_hz, sample_rate),
                        positive: mode.positive_modulation,
                        sync: mode.levels.sync,
                        white: mode.levels.white,
                    }
                }
                ModulationKind::FmWide => {
                    let deviation = mode
                        .mac
                        .map(|m| m.fm_deviation_hz)
                        .unwrap_or(13_500_000.0);
                    Shaper::FmWide {
                        carrier: ComplexNco::new(frequency_hz, sample_rate),
                        deviation_step: std::f64::consts::TAU * deviation / sample_rate,
                        phase: 0.0,
                    }
                }
            }
        };
        Self { shaper, gain }
    }

    /// Baseband-real emits one sample per input; complex modes emit an
    /// interleaved I/Q pair.
    pub fn is_complex(&self) -> bool {
        !matches!(self.shaper, Shaper::Baseband)
    }

    /// Select SSB shaping instead of the mode default. Used for the
    /// narrow-band monitoring output.
    pub fn with_ssb(mode: &ModeDescriptor, frequency_hz: f64, gain_db: f64) -> Self {
        let sample_rate = mode.sample_rate.as_f64();
        let hilbert = HilbertTransformer::new(VSB_TAPS);
        let delay = std::collections::VecDeque::from(vec![0.0; hilbert.delay()]);
        Self {
            shaper: Shaper::Ssb {
                hilbert,
                delay,
                carrier: ComplexNco::new(frequency_hz, sample_rate),
            },
            gain: 10f64.powf(gain_db / 20.0),
        }
    }

    /// Modulate a baseband block into interleaved i16 output samples.
    pub fn process_into(&mut self, baseband: &[f64], out: &mut Vec<i16>) {
        out.clear();
        let quantize = |v: f64| (v.clamp(-1.0, 1.0) * i16::MAX as f64) as i16;
        match &mut self.shaper {
            Shaper::Baseband => {
                for &x in baseband {
                    out.push(quantize(x * self.gain));
                }
            }
            Shaper::AmVsb {
                filter,
                carrier,
                positive,
                sync,
                white,
            } => {
                for &x in baseband {
                    // Map sync..white onto carrier amplitude; sync tip is
                    // full carrier under negative modulation
                    let depth = ((x - *sync) / (*white - *sync)).clamp(0.0, 1.25);
                    let amplitude = if *positive {
                        0.2 + 0.8 * depth
                    } else {
                        1.0 - 0.8 * depth
                    };
                    let shaped = filter.process(amplitude);
                    let iq = shaped * carrier.next() * self.gain * 0.5;
                    out.push(quantize(iq.re));
                    out.push(quantize(iq.im));
                }
            }
            Shaper::FmWide {
                carrier,
                deviation_step,
                phase,
            } => {
                for &x in baseband {
                    *phase += *deviation_step * x;
                    if *phase >= std::f64::consts::TAU {
                        *phase -= std::f64::consts::TAU;
                    } else if *phase < 0.0 {
                        *phase += std::f64::consts::TAU;
                    }
                    let rotated = Complex64::new(phase.cos(), phase.sin()) * carrier.next();
                    out.push(quantize(rotated.re * self.gain));
                    out.push(quantize(rotated.im * self.gain));
                }
            }
            Shaper::Ssb {
                hilbert,
                delay,
                carrier,
            } => {
                for &x in baseband {
                    let q = hilbert.process(x);
                    delay.push_back(x);
                    let i = delay.pop_front().unwrap_or(0.0);
                    let analytic = Complex64::new(i, q);
                    let iq = analytic * carrier.next() * self.gain * 0.5;
                    out.push(quantize(iq.re));
                    out.push(quantize(iq.im));
                }
            }
        }
    }

    /// i8 variant for sinks that take 8-bit interleaved samples.
    pub fn process_into_i8(&mut self, baseband: &[f64], scratch: &mut Vec<i16>, out: &mut Vec<i8>) {
        self.process_into(baseband, scratch);
        out.clear();
        out.extend(scratch.iter().map(|&s| (s >> 8) as i8));
    }
}
