//! NICAM-728 digital stereo subcarrier.
//!
//! The encoder companded path follows the broadcast frame structure: 728-bit
//! frames of FAW + control + additional-data + 704 sound bits, 32 stereo
//! sample pairs per frame at 32 kHz. Sound samples are companded 14-to-10
//! bits per 32-sample block, parity-protected on their six MSBs with the
//! scale factor signalled through parity modification, bit-interleaved
//! 44x16, scrambled by the x^9+x^4+1 PRBS, and transmitted as DQPSK at
//! 364 kBd.

use std::collections::VecDeque;
use std::f64::consts::TAU;

/// Frame alignment word, transmitted MSB first.
const FAW: u8 = 0b0100_1110;
/// Bits per NICAM frame (1 ms).
const FRAME_BITS: usize = 728;
/// Sound bits per frame: 64 samples x 11 bits.
const SOUND_BITS: usize = 704;
/// Symbol rate, two bits per DQPSK symbol.
const SYMBOL_RATE: f64 = 364_000.0;

/// Per-block companding: pick the coding range for a 32-sample block.
/// Range 0 carries the loudest material (largest right-shift).
fn coding_range(peak: i16) -> u8 {
    let peak = peak.unsigned_abs();
    match peak {
        0..=511 => 4,
        512..=1023 => 3,
        1024..=2047 => 2,
        2048..=4095 => 1,
        _ => 0,
    }
}

/// Compand one 14-bit sample into 10 bits for the given range.
fn compand(sample: i16, range: u8) -> u16 {
    let shift = 4 - range as i16;
    ((sample >> shift) & 0x3FF) as u16
}

/// Even parity over the six MSBs of a 10-bit sample.
fn msb_parity(value: u16) -> u8 {
    (((value >> 4) & 0x3F).count_ones() & 1) as u8
}

/// Nine-bit PRBS generator, polynomial x^9 + x^4 + 1, seeded all-ones at
/// the start of every frame.
struct Prbs {
    state: u16,
}

impl Prbs {
    fn new() -> Self {
        Self { state: 0x1FF }
    }

    fn next_bit(&mut self) -> u8 {
        let out = ((self.state >> 8) ^ (self.state >> 3)) & 1;
        self.state = ((self.state << 1) | out) & 0x1FF;
        out as u8
    }
}

/// NICAM-728 encoder and DQPSK modulator.
pub struct NicamModulator {
    level: f64,
    carrier_phase: f64,
    carrier_step: f64,
    symbol_acc: f64,
    symbol_step: f64,
    dqpsk_phase: f64,
    /// Smoothed I/Q to bound the transmitted spectrum.
    iq: (f64, f64),
    pending: VecDeque<(i16, i16)>,
    bits: VecDeque<u8>,
    frame_parity_flip: bool,
}

impl NicamModulator {
    pub fn new(freq_hz: f64, level: f64, sample_rate: f64) -> Self {
        Self {
            level,
            carrier_phase: 0.0,
            carrier_step: TAU * freq_hz / sample_rate,
            symbol_acc: 0.0,
            symbol_step: SYMBOL_RATE / sample_rate,
            dqpsk_phase: 0.0,
            iq: (1.0, 0.0),
            pending: VecDeque::with_capacity(2048),
            bits: VecDeque::with_capacity(FRAME_BITS * 4),
            frame_parity_flip: false,
        }
    }

    /// Queue 32 kHz stereo programme samples.
    pub fn push_samples(&mut self, samples: &[(f32, f32)]) {
        for &(l, r) in samples {
            let l = (l.clamp(-1.0, 1.0) * 8191.0) as i16;
            let r = (r.clamp(-1.0, 1.0) * 8191.0) as i16;
            self.pending.push_back((l, r));
        }
        while self.pending.len() >= 32 {
            self.encode_frame();
        }
    }

    fn encode_frame(&mut self) {
        let block: Vec<(i16, i16)> = self.pending.drain(..32).collect();
        let peak_l = block.iter().map(|p| p.0.unsigned_abs()).max().unwrap_or(0) as i16;
        let peak_r = block.iter().map(|p| p.1.unsigned_abs()).max().unwrap_or(0) as i16;
        let range_l = coding_range(peak_l);
        let range_r = coding_range(peak_r);

        // 64 samples, A/B channels alternating, 11 bits each
        let mut sound = [0u8; SOUND_BITS];
        let scale = |range: u8, bit: usize| (range >> (2 - bit)) & 1;
        for (i, &(l, r)) in block.iter().enumerate() {
            for (ch, sample, range) in [(0usize, l, range_l), (1usize, r, range_r)] {
                let companded = compand(sample, range);
                let mut parity = msb_parity(companded);
                // Scale-factor signalling: the first 54 interleaved samples
                // carry one scale bit each in their parity sense
                let slot = i * 2 + ch;
                if slot < 54 {
                    parity ^= scale(range, (slot / 2) / 9);
                }
                let base = slot * 11;
                for b in 0..10 {
                    sound[base + b] = ((companded >> (9 - b)) & 1) as u8;
                }
                sound[base + 10] = parity;
            }
        }

        // 44x16 bit interleave over the sound block
        let mut interleaved = [0u8; SOUND_BITS];
        for (i, &bit) in sound.iter().enumerate() {
            interleaved[(i % 44) * 16 + i / 44] = bit;
        }

        // Assemble the frame: FAW, C0..C4, AD0..AD10, sound
        let mut frame = Vec::with_capacity(FRAME_BITS);
        for b in 0..8 {
            frame.push((FAW >> (7 - b)) & 1);
        }
        // C0 alternates every eight frames for receiver framing; C1..C3
        // signal the stereo application, C4 is reserve
        self.frame_parity_flip = !self.frame_parity_flip;
        frame.push(self.frame_parity_flip as u8);
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame.extend(std::iter::repeat(0).take(11));
        frame.extend_from_slice(&interleaved);
        debug_assert_eq!(frame.len(), FRAME_BITS);

        // Scramble everything after the FAW
        let mut prbs = Prbs::new();
        for bit in frame.iter_mut().skip(8) {
            *bit ^= prbs.next_bit();
        }

        self.bits.extend(frame);
    }

    /// Differential phase step for a DQPSK bit pair.
    fn phase_step(bits: (u8, u8)) -> f64 {
        match bits {
            (0, 0) => 0.0,
            (0, 1) => -TAU / 4.0,
            (1, 1) => TAU / 2.0,
            (1, 0) => TAU / 4.0,
            _ => unreachable!(),
        }
    }

    /// One output-rate subcarrier sample.
    pub fn next_sample(&mut self) -> f64 {
        self.symbol_acc += self.symbol_step;
        if self.symbol_acc >= 1.0 {
            self.symbol_acc -= 1.0;
            let b0 = self.bits.pop_front().unwrap_or(0);
            let b1 = self.bits.pop_front().unwrap_or(0);
            self.dqpsk_phase = (self.dqpsk_phase + Self::phase_step((b0, b1))).rem_euclid(TAU);
        }
        // One-pole smoothing of the target constellation point keeps the
        // occupied bandwidth near 700 kHz
        let target = (self.dqpsk_phase.cos(), self.dqpsk_phase.sin());
        self.iq.0 += 0.25 * (target.0 - self.iq.0);
        self.iq.1 += 0.25 * (target.1 - self.iq.1);

        let out = self.level
            * (self.iq.0 * self.carrier_phase.cos() - self.iq.1 * self.carrier_phase.sin());
        self.carrier_phase += self.carrier_step;
        if self.carrier_phase >= TAU {
            self.carrier_phase -= TAU;
        }
        out
    }

    /// Bits queued but not yet transmitted.
    pub fn backlog_bits(&self) -> usize {
        self.bits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prbs_period_is_511() {
        let mut prbs = Prbs::new();
        let first: Vec<u8> = (0..511).map(|_| prbs.next_bit()).collect();
        let second: Vec<u8> = (0..511).map(|_| prbs.next_bit()).collect();
        assert_eq!(first, second);
        assert!(first.iter().any(|&b| b == 1));
        assert!(first.iter().any(|&b| b == 0));
    }

    #[test]
    fn test_coding_ranges() {
        assert_eq!(coding_range(100), 4);
        assert_eq!(coding_range(600), 3);
        assert_eq!(coding_range(3000), 1);
        assert_eq!(coding_range(8000), 0);
    }

    #[test]
    fn test_compand_quiet_block_keeps_lsbs() {
        // Range 4 means no shift: small samples survive exactly
        assert_eq!(compand(5, 4), 5);
        assert_eq!(compand(-1, 4) & 0x3FF, 0x3FF);
        // Range 0 drops the low four bits
        assert_eq!(compand(8000, 0), (8000 >> 4) as u16);
    }

    #[test]
    fn test_parity_is_even() {
        assert_eq!(msb_parity(0), 0);
        assert_eq!(msb_parity(0b10000_00000), 1);
        assert_eq!(msb_parity(0b11000_00000), 0);
    }

    #[test]
    fn test_one_frame_per_32_pairs() {
        let mut nicam = NicamModulator::new(6_552_000.0, 0.1, 20_250_000.0);
        let silence = vec![(0.0f32, 0.0f32); 32];
        nicam.push_samples(&silence);
        assert_eq!(nicam.backlog_bits(), FRAME_BITS);
        nicam.push_samples(&silence);
        assert_eq!(nicam.backlog_bits(), 2 * FRAME_BITS);
    }

    #[test]
    fn test_output_bounded_by_level() {
        let mut nicam = NicamModulator::new(6_552_000.0, 0.1, 20_250_000.0);
        let tone: Vec<(f32, f32)> = (0..320)
            .map(|i| {
                let s = (i as f32 * 0.2).sin() * 0.8;
                (s, -s)
            })
            .collect();
        nicam.push_samples(&tone);
        for _ in 0..10_000 {
            let s = nicam.next_sample();
            assert!(s.abs() <= 0.1 * std::f64::consts::SQRT_2 + 1e-9);
        }
    }
}
