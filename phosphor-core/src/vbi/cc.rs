//! EIA-608 closed captions on line 21.
//!
//! The line carries a seven-cycle sine run-in at 32 times the line rate,
//! three start bits, and two 7-bit characters with odd parity. Caption text
//! is queued as pop-on command/character pairs; an idle encoder transmits
//! parity-padded nulls so the decoder keeps clock lock.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use crate::modes::ModeDescriptor;
use crate::vbi::teletext::odd_parity;

const LEVEL: f64 = 0.5;
/// Bit clock: 32 bits per line period.
const BITS_PER_LINE: u64 = 32;

/// Queue of two-byte caption words.
pub struct CaptionEncoder {
    words: VecDeque<(u8, u8)>,
}

impl CaptionEncoder {
    pub fn new() -> Self {
        Self {
            words: VecDeque::new(),
        }
    }

    /// Queue a pop-on caption: RCL, the text, then EOC to display it.
    pub fn caption_text(&mut self, text: &str) {
        // Resume Caption Loading, channel 1
        self.words.push_back((odd_parity(0x14), odd_parity(0x20)));
        let bytes: Vec<u8> = text
            .bytes()
            .filter(|&b| (0x20..0x7F).contains(&b))
            .collect();
        for pair in bytes.chunks(2) {
            let first = odd_parity(pair[0]);
            let second = odd_parity(if pair.len() > 1 { pair[1] } else { 0 });
            self.words.push_back((first, second));
        }
        // End Of Caption: swap memory to display
        self.words.push_back((odd_parity(0x14), odd_parity(0x2F)));
    }

    pub fn pending(&self) -> usize {
        self.words.len()
    }

    fn next_word(&mut self) -> (u8, u8) {
        self.words
            .pop_front()
            .unwrap_or((odd_parity(0), odd_parity(0)))
    }

    /// Render the line 21 waveform.
    pub fn render_line(&mut self, mode: &ModeDescriptor, buf: &mut [f64]) {
        let (first, second) = self.next_word();
        let rate = mode.sample_rate.as_f64();
        let bit_hz = BITS_PER_LINE as f64 * mode.line_rate().as_f64();
        let samples_per_bit = rate / bit_hz;

        // Seven-cycle run-in starting half a bit cell after 10.5 us
        let start = (10.5 * rate / 1e6).round() as usize;
        let run_in_len = (7.0 * samples_per_bit).round() as usize;
        for (i, sample) in buf[start..].iter_mut().take(run_in_len).enumerate() {
            let phase = TAU * i as f64 / samples_per_bit;
            *sample = 0.5 * LEVEL * mode.levels.white * (1.0 - phase.cos());
        }

        // Start bits 001 then two bytes, LSB first
        let mut bits: Vec<u8> = vec![0, 0, 1];
        for byte in [first, second] {
            for b in 0..8 {
                bits.push((byte >> b) & 1);
            }
        }
        let data_start = start + run_in_len + (samples_per_bit / 2.0) as usize;
        let line_rate = mode.line_rate();
        let num = BITS_PER_LINE * line_rate.num() as u64 * mode.sample_rate.den() as u64;
        let den = line_rate.den() as u64 * mode.sample_rate.num() as u64;
        let mut acc: u64 = 0;
        let mut bit = 0usize;
        for sample in buf.iter_mut().skip(data_start) {
            if bit >= bits.len() {
                break;
            }
            if bits[bit] == 1 {
                *sample = LEVEL * mode.levels.white;
            }
            acc += num;
            while acc >= den {
                acc -= den;
                bit += 1;
            }
        }
    }
}

impl Default for CaptionEncoder {
    fn default() -> Self {
        Self::new()
    }
}
