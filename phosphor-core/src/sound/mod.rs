//! Sound subsystem: analog FM/AM subcarriers, A2 stereo, and NICAM-728.
//!
//! The mixer owns one frame's worth of 32 kHz stereo programme at a time and
//! renders the summed subcarrier contribution per output sample. Carrier
//! phase is continuous across lines and frames; only the programme read
//! position resets at each frame boundary, which keeps long-term A/V drift
//! inside the frame period.

pub mod fm;
pub mod nicam;

use crate::dsp::Fir;
use crate::modes::{AudioChannel, ModeDescriptor};
use fm::FmCarrier;
use nicam::NicamModulator;

/// Programme low-pass cutoff: 15 kHz at the 32 kHz rate.
const PROGRAMME_CUTOFF: f64 = 15_000.0 / 32_000.0;

pub struct SoundMixer {
    carriers: Vec<FmCarrier>,
    nicam: Option<NicamModulator>,
    lowpass: (Fir, Fir),
    /// Current frame programme, pre-emphasized per carrier lazily.
    frame: Vec<(f32, f32)>,
    /// Programme position in 32 kHz samples, fixed-point against the
    /// output rate: `pos_acc / sample_rate` samples.
    pos: usize,
    pos_acc: u64,
    sample_rate_int: u64,
    programme_rate: u64,
}

impl SoundMixer {
    pub fn new(mode: &ModeDescriptor) -> Self {
        let rate_f = mode.sample_rate.as_f64();
        let carriers = mode
            .audio
            .iter()
            .map(|&c| FmCarrier::new(c, rate_f))
            .collect();
        let nicam = mode
            .nicam
            .map(|n| NicamModulator::new(n.freq_hz, n.level, rate_f));
        Self {
            carriers,
            nicam,
            lowpass: (Fir::lowpass(PROGRAMME_CUTOFF, 31), Fir::lowpass(PROGRAMME_CUTOFF, 31)),
            frame: Vec::new(),
            pos: 0,
            pos_acc: 0,
            sample_rate_int: (mode.sample_rate.num() / mode.sample_rate.den()) as u64,
            programme_rate: 32_000,
        }
    }

    pub fn has_carriers(&self) -> bool {
        !self.carriers.is_empty() || self.nicam.is_some()
    }

    /// Install the programme block covering the next video frame. The
    /// analog carriers take a 15 kHz band-limited copy; NICAM takes the
    /// full-band samples.
    pub fn load_frame(&mut self, samples: Vec<(f32, f32)>) {
        if let Some(nicam) = &mut self.nicam {
            nicam.push_samples(&samples);
        }
        self.frame = samples
            .into_iter()
            .map(|(l, r)| {
                (
                    self.lowpass.0.process(l as f64) as f32,
                    self.lowpass.1.process(r as f64) as f32,
                )
            })
            .collect();
        self.pos = 0;
        self.pos_acc = 0;
    }

    /// Current stereo programme pair, zero-order hold.
    fn programme(&self) -> (f64, f64) {
        match self.frame.get(self.pos) {
            Some(&(l, r)) => (l as f64, r as f64),
            None => (0.0, 0.0),
        }
    }

    /// Raw programme pair at the output rate, for modes that carry sound
    /// digitally instead of on subcarriers.
    pub(crate) fn next_programme(&mut self) -> (f64, f64) {
        let pair = self.programme();
        self.pos_acc += self.programme_rate;
        while self.pos_acc >= self.sample_rate_int {
            self.pos_acc -= self.sample_rate_int;
            self.pos += 1;
        }
        pair
    }

    /// Render one output-rate sample: the sum of every subcarrier.
    pub fn next_sample(&mut self) -> f64 {
        let (l, r) = self.programme();
        let mut out = 0.0;
        for carrier in &mut self.carriers {
            let programme = match carrier.channel() {
                AudioChannel::Mono => 0.5 * (l + r),
                AudioChannel::Right => r,
            };
            let emphasized = carrier.emphasize(programme);
            out += carrier.next_sample(emphasized);
        }
        if let Some(nicam) = &mut self.nicam {
            out += nicam.next_sample();
        }

        // Advance the 32 kHz read position against the output rate
        self.pos_acc += self.programme_rate;
        while self.pos_acc >= self.sample_rate_int {
            self.pos_acc -= self.sample_rate_int;
            self.pos += 1;
        }
        out
    }
}
