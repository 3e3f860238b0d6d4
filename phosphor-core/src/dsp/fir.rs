//! FIR filtering, rational-ratio resampling, and the Hilbert transformer.
//!
//! Filters are designed once at open time with a windowed-sinc method and run
//! as plain multiply-accumulate loops after that. Coefficients are normalized
//! for unit DC gain so that video levels survive the filter chain unchanged.

use std::f64::consts::PI;

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Blackman window value for tap `i` of `n`.
fn blackman(i: usize, n: usize) -> f64 {
    let x = i as f64 / (n - 1) as f64;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

/// Design a low-pass FIR with the given normalized cutoff (cycles/sample),
/// Blackman-windowed, unit DC gain.
pub fn design_lowpass(cutoff: f64, taps: usize) -> Vec<f64> {
    assert!(taps % 2 == 1, "low-pass design requires an odd tap count");
    let mid = (taps / 2) as f64;
    let mut h: Vec<f64> = (0..taps)
        .map(|i| 2.0 * cutoff * sinc(2.0 * cutoff * (i as f64 - mid)) * blackman(i, taps))
        .collect();
    let sum: f64 = h.iter().sum();
    for c in &mut h {
        *c /= sum;
    }
    h
}

/// Streaming FIR over a circular history window.
#[derive(Debug, Clone)]
pub struct Fir {
    taps: Vec<f64>,
    history: Vec<f64>,
    cursor: usize,
}

impl Fir {
    pub fn new(taps: Vec<f64>) -> Self {
        let len = taps.len();
        Self {
            taps,
            history: vec![0.0; len],
            cursor: 0,
        }
    }

    pub fn lowpass(cutoff: f64, taps: usize) -> Self {
        Self::new(design_lowpass(cutoff, taps))
    }

    /// Push one sample, return the filtered output (group delay applies).
    pub fn process(&mut self, sample: f64) -> f64 {
        self.history[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.history.len();
        let mut acc = 0.0;
        for (i, &t) in self.taps.iter().enumerate() {
            let idx = (self.cursor + i) % self.history.len();
            acc += t * self.history[idx];
        }
        acc
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// Rational-ratio polyphase resampler (up by L, down by M).
///
/// The prototype low-pass is designed at the upsampled rate and split into L
/// phases; each output sample costs `taps / L` multiplies. Used by the audio
/// path to convert the 32 kHz programme rate into per-line sample counts.
#[derive(Debug, Clone)]
pub struct PolyphaseResampler {
    phases: Vec<Vec<f64>>,
    history: Vec<f64>,
    cursor: usize,
    up: usize,
    down: usize,
    phase_acc: usize,
}

impl PolyphaseResampler {
    pub fn new(up: usize, down: usize, taps_per_phase: usize) -> Self {
        assert!(up > 0 && down > 0);
        let total = up * taps_per_phase + 1;
        let total = if total % 2 == 0 { total + 1 } else { total };
        // Cut at the narrower of the two Nyquist limits, in units of the
        // upsampled rate
        let cutoff = 0.5 / up.max(down) as f64;
        let proto = design_lowpass(cutoff, total);
        let mut phases = vec![Vec::with_capacity(taps_per_phase + 1); up];
        for (i, &c) in proto.iter().enumerate() {
            // Polyphase decomposition: gain of L restores unit passband level
            phases[i % up].push(c * up as f64);
        }
        let hist_len = phases.iter().map(Vec::len).max().unwrap_or(1);
        Self {
            phases,
            history: vec![0.0; hist_len],
            cursor: 0,
            up,
            down,
            phase_acc: 0,
        }
    }

    /// Feed one input sample; append any produced output samples to `out`.
    pub fn push(&mut self, sample: f64, out: &mut Vec<f64>) {
        self.history[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.history.len();
        // Each input admits `up` virtual samples; emit one output every
        // `down` virtual samples.
        while self.phase_acc < self.up {
            let phase = &self.phases[self.phase_acc];
            let mut acc = 0.0;
            for (i, &t) in phase.iter().enumerate() {
                let idx = (self.cursor + self.history.len() - 1 - i) % self.history.len();
                acc += t * self.history[idx];
            }
            out.push(acc);
            self.phase_acc += self.down;
        }
        self.phase_acc -= self.up;
    }

    pub fn ratio(&self) -> (usize, usize) {
        (self.up, self.down)
    }
}

/// FIR Hilbert transformer producing the quadrature component for SSB.
///
/// Odd-length, antisymmetric, windowed; even taps are zero so only half the
/// multiplies run. The caller must delay the in-phase path by the group
/// delay returned from [`HilbertTransformer::delay`].
#[derive(Debug, Clone)]
pub struct HilbertTransformer {
    taps: Vec<f64>,
    history: Vec<f64>,
    cursor: usize,
}

impl HilbertTransformer {
    pub fn new(taps_len: usize) -> Self {
        let taps_len = if taps_len % 2 == 0 { taps_len + 1 } else { taps_len };
        let mid = (taps_len / 2) as i64;
        let taps: Vec<f64> = (0..taps_len)
            .map(|i| {
                let k = i as i64 - mid;
                if k % 2 == 0 {
                    0.0
                } else {
                    (2.0 / (PI * k as f64)) * blackman(i, taps_len)
                }
            })
            .collect();
        Self {
            history: vec![0.0; taps_len],
            cursor: 0,
            taps,
        }
    }

    pub fn delay(&self) -> usize {
        self.taps.len() / 2
    }

    pub fn process(&mut self, sample: f64) -> f64 {
        self.history[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.history.len();
        let mut acc = 0.0;
        for (i, &t) in self.taps.iter().enumerate() {
            if t != 0.0 {
                let idx = (self.cursor + i) % self.history.len();
                acc += t * self.history[idx];
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_lowpass_unit_dc_gain() {
        let h = design_lowpass(0.1, 63);
        let sum: f64 = h.iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fir_passes_dc() {
        let mut fir = Fir::lowpass(0.25, 31);
        let mut last = 0.0;
        for _ in 0..200 {
            last = fir.process(1.0);
        }
        assert_abs_diff_eq!(last, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_resampler_output_count() {
        // 3/2 ratio: 200 inputs must produce 300 outputs
        let mut rs = PolyphaseResampler::new(3, 2, 8);
        let mut out = Vec::new();
        for i in 0..200 {
            rs.push((i as f64 * 0.01).sin(), &mut out);
        }
        assert_eq!(out.len(), 300);
    }

    #[test]
    fn test_resampler_preserves_dc_level() {
        let mut rs = PolyphaseResampler::new(2, 1, 16);
        let mut out = Vec::new();
        for _ in 0..500 {
            rs.push(0.5, &mut out);
        }
        // Past the filter transient the level must hold
        let tail = &out[out.len() - 100..];
        for &v in tail {
            assert_abs_diff_eq!(v, 0.5, epsilon = 5e-3);
        }
    }

    #[test]
    fn test_hilbert_even_taps_zero() {
        let h = HilbertTransformer::new(63);
        let mid = h.taps.len() / 2;
        for (i, &t) in h.taps.iter().enumerate() {
            if (i as i64 - mid as i64) % 2 == 0 {
                assert_eq!(t, 0.0);
            }
        }
    }
}
