//! Numerically controlled oscillators.
//!
//! Every carrier in the system — colour subcarrier, FM sound subcarriers,
//! the IQ up-converter — is a phase accumulator stepped once per output
//! sample. Phase is continuous across lines and fields; the colour NCO is
//! additionally seekable so its phase can be made absolute to line 1 of
//! field 1.

use num_complex::Complex64;
use std::f64::consts::TAU;

/// Real-output oscillator with a per-sample phase increment.
#[derive(Debug, Clone)]
pub struct Nco {
    phase: f64,
    step: f64,
}

impl Nco {
    /// `freq_hz` may be negative for a low-side carrier.
    pub fn new(freq_hz: f64, sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            step: TAU * freq_hz / sample_rate,
        }
    }

    /// Advance one sample and return sin(phase).
    pub fn next_sin(&mut self) -> f64 {
        let out = self.phase.sin();
        self.advance();
        out
    }

    /// Advance one sample with an extra phase offset (FM deviation) folded in.
    pub fn next_sin_fm(&mut self, deviation: f64) -> f64 {
        let out = self.phase.sin();
        self.phase += deviation;
        self.advance();
        out
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Jump to the phase this oscillator would have after `samples` steps
    /// from phase zero. Used to pin the colour subcarrier to an absolute
    /// frame origin.
    pub fn seek(&mut self, samples: u64) {
        self.phase = (self.step * samples as f64).rem_euclid(TAU);
    }

    fn advance(&mut self) {
        self.phase += self.step;
        if self.phase >= TAU {
            self.phase -= TAU;
        } else if self.phase < 0.0 {
            self.phase += TAU;
        }
    }
}

/// Complex-output oscillator for IQ up-conversion.
#[derive(Debug, Clone)]
pub struct ComplexNco {
    phase: f64,
    step: f64,
}

impl ComplexNco {
    pub fn new(freq_hz: f64, sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            step: TAU * freq_hz / sample_rate,
        }
    }

    pub fn next(&mut self) -> Complex64 {
        let out = Complex64::new(self.phase.cos(), self.phase.sin());
        self.phase += self.step;
        if self.phase >= TAU {
            self.phase -= TAU;
        } else if self.phase < 0.0 {
            self.phase += TAU;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_nco_period() {
        // 1 kHz at 8 kHz: sin must return to ~0 after 8 samples
        let mut nco = Nco::new(1000.0, 8000.0);
        let mut last = 0.0;
        for _ in 0..8 {
            last = nco.next_sin();
        }
        assert_abs_diff_eq!(last, -(TAU / 8.0).sin(), epsilon = 1e-9);
        assert_abs_diff_eq!(nco.phase(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_seek_matches_stepping() {
        let mut stepped = Nco::new(4_433_618.75, 20_250_000.0);
        for _ in 0..1296 {
            stepped.next_sin();
        }
        let mut seeked = Nco::new(4_433_618.75, 20_250_000.0);
        seeked.seek(1296);
        assert_abs_diff_eq!(stepped.phase(), seeked.phase(), epsilon = 1e-6);
    }

    #[test]
    fn test_complex_nco_unit_magnitude() {
        let mut nco = ComplexNco::new(-1500.0, 48_000.0);
        for _ in 0..100 {
            let z = nco.next();
            assert_abs_diff_eq!(z.norm(), 1.0, epsilon = 1e-12);
        }
    }
}
