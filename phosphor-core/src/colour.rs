//! Colour encoding: RGB to YUV matrices and chroma subcarrier synthesis.
//!
//! PAL and NTSC modulate U/V onto a quadrature subcarrier (PAL inverts the
//! V axis on alternate lines); SECAM frequency-modulates D'R and D'B onto
//! alternate-line subcarriers. The subcarrier oscillator phase is absolute
//! to sample 0 of line 1, field 1, so a frame always starts with the same
//! chroma phase relationship.

use std::f64::consts::{PI, TAU};

use crate::dsp::Nco;
use crate::modes::{ColourSystem, ModeDescriptor};

/// 8-bit gamma transfer table applied ahead of the matrix.
#[derive(Debug, Clone)]
pub struct GammaLut {
    table: [f64; 256],
}

impl GammaLut {
    pub fn new(gamma: f64) -> Self {
        let mut table = [0.0; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = (i as f64 / 255.0).powf(gamma);
        }
        Self { table }
    }

    #[inline]
    pub fn lookup(&self, value: u8) -> f64 {
        self.table[value as usize]
    }
}

/// Split a packed 0RGB pixel into gamma-adjusted components.
#[inline]
pub fn split_rgb(pixel: u32, lut: &GammaLut) -> (f64, f64, f64) {
    (
        lut.lookup((pixel >> 16) as u8),
        lut.lookup((pixel >> 8) as u8),
        lut.lookup(pixel as u8),
    )
}

/// Luma plus colour-difference components for one sample, all in 0..1 terms.
#[inline]
pub fn rgb_to_yuv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = 0.493 * (b - y);
    let v = 0.877 * (r - y);
    (y, u, v)
}

/// SECAM colour-difference components.
#[inline]
pub fn rgb_to_secam(r: f64, g: f64, b: f64) -> (f64, f64) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let dr = -1.902 * (r - y);
    let db = 1.505 * (b - y);
    (dr, db)
}

const SECAM_FOR_HZ: f64 = 4_406_250.0;
const SECAM_FOB_HZ: f64 = 4_250_000.0;
const SECAM_DR_DEV_HZ: f64 = 280_000.0;
const SECAM_DB_DEV_HZ: f64 = 230_000.0;
const SECAM_LEVEL: f64 = 0.115;

/// Chroma subcarrier state for one of the three colour systems.
pub enum ChromaModulator {
    Qam {
        nco: Nco,
        /// PAL alternates the V axis per line; NTSC keeps `1.0`.
        pal_switch: bool,
        burst_phase: f64,
    },
    Fm {
        nco: Nco,
        sample_rate: f64,
    },
}

impl ChromaModulator {
    pub fn for_mode(mode: &ModeDescriptor) -> Option<Self> {
        let sample_rate = mode.sample_rate.as_f64();
        match mode.colour {
            ColourSystem::Pal => Some(ChromaModulator::Qam {
                nco: Nco::new(mode.chroma_freq?.as_f64(), sample_rate),
                pal_switch: true,
                burst_phase: 3.0 * PI / 4.0,
            }),
            ColourSystem::Ntsc => Some(ChromaModulator::Qam {
                nco: Nco::new(mode.chroma_freq?.as_f64(), sample_rate),
                pal_switch: false,
                burst_phase: PI,
            }),
            ColourSystem::Secam => Some(ChromaModulator::Fm {
                nco: Nco::new(SECAM_FOB_HZ, sample_rate),
                sample_rate,
            }),
            ColourSystem::None => None,
        }
    }

    /// PAL V-axis sign for a transmitted line (1-based over the frame).
    #[inline]
    pub fn v_switch(line: u32) -> f64 {
        if line % 2 == 1 {
            1.0
        } else {
            -1.0
        }
    }

    /// Pin the oscillator phase to the absolute sample index of the frame
    /// origin, line 1 field 1. Called once per line by the composer.
    pub fn begin_line(&mut self, abs_sample: u64) {
        match self {
            ChromaModulator::Qam { nco, .. } => nco.seek(abs_sample),
            // SECAM restarts its reference each line instead of keeping an
            // absolute phase; the receiver's discriminator does not care.
            ChromaModulator::Fm { nco, sample_rate } => {
                *nco = Nco::new(SECAM_FOB_HZ, *sample_rate);
            }
        }
    }

    /// One chroma sample for the active region.
    ///
    /// For QAM systems `cd1`/`cd2` are U and V (V already sign-switched for
    /// PAL); for SECAM they are D'R and D'B and the per-line alternation
    /// picks which one drives the FM carrier.
    #[inline]
    pub fn active_sample(&mut self, line: u32, cd1: f64, cd2: f64) -> f64 {
        match self {
            ChromaModulator::Qam { nco, .. } => {
                let phase = nco.phase();
                let out = cd1 * phase.sin() + cd2 * phase.cos();
                nco.next_sin();
                out
            }
            ChromaModulator::Fm { nco, sample_rate } => {
                let (centre, dev, comp) = if line % 2 == 1 {
                    (SECAM_FOR_HZ, SECAM_DR_DEV_HZ, cd1)
                } else {
                    (SECAM_FOB_HZ, SECAM_DB_DEV_HZ, cd2)
                };
                let offset = TAU * (centre - SECAM_FOB_HZ + dev * comp) / *sample_rate;
                SECAM_LEVEL * nco.next_sin_fm(offset)
            }
        }
    }

    /// One burst-window sample, or `None` where the system sends no burst.
    /// SECAM transmits an unmodulated reference in the burst position.
    #[inline]
    pub fn burst_sample(&mut self, line: u32, amplitude: f64) -> Option<f64> {
        match self {
            ChromaModulator::Qam {
                nco,
                pal_switch,
                burst_phase,
                ..
            } => {
                let phase = if *pal_switch {
                    // Swinging burst: 135 degrees on +V lines, 225 on -V
                    *burst_phase * Self::v_switch(line)
                } else {
                    *burst_phase
                };
                let out = amplitude * (nco.phase() + phase).sin();
                nco.next_sin();
                Some(out)
            }
            ChromaModulator::Fm { nco, sample_rate } => {
                let centre = if line % 2 == 1 {
                    SECAM_FOR_HZ
                } else {
                    SECAM_FOB_HZ
                };
                let offset = TAU * (centre - SECAM_FOB_HZ) / *sample_rate;
                Some(SECAM_LEVEL * nco.next_sin_fm(offset))
            }
        }
    }

    /// Step the oscillator through a sample that carries no chroma so phase
    /// stays absolute.
    #[inline]
    pub fn idle_sample(&mut self) {
        match self {
            ChromaModulator::Qam { nco, .. } => {
                nco.next_sin();
            }
            ChromaModulator::Fm { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeId;
    use crate::rational::Rational;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_yuv_white_has_no_chroma() {
        let (y, u, v) = rgb_to_yuv(1.0, 1.0, 1.0);
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(u, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_yuv_primaries() {
        let (y, _, v) = rgb_to_yuv(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(y, 0.299, epsilon = 1e-9);
        assert_abs_diff_eq!(v, 0.877 * (1.0 - 0.299), epsilon = 1e-9);
        let (y, u, _) = rgb_to_yuv(0.0, 0.0, 1.0);
        assert_abs_diff_eq!(y, 0.114, epsilon = 1e-9);
        assert_abs_diff_eq!(u, 0.493 * (1.0 - 0.114), epsilon = 1e-9);
    }

    #[test]
    fn test_pal_v_switch_alternates() {
        assert_eq!(ChromaModulator::v_switch(1), 1.0);
        assert_eq!(ChromaModulator::v_switch(2), -1.0);
        assert_eq!(ChromaModulator::v_switch(625), 1.0);
    }

    #[test]
    fn test_gamma_identity() {
        let lut = GammaLut::new(1.0);
        assert_abs_diff_eq!(lut.lookup(255), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lut.lookup(128), 128.0 / 255.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qam_grey_sample_is_zero() {
        let mode = ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap();
        let mut chroma = ChromaModulator::for_mode(&mode).unwrap();
        chroma.begin_line(0);
        for _ in 0..32 {
            let s = chroma.active_sample(1, 0.0, 0.0);
            assert_abs_diff_eq!(s, 0.0, epsilon = 1e-12);
        }
    }
}
