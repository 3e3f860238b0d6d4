//! Nagravision Syster line shuffling.
//!
//! Each field's 287 active lines are transmitted in a permuted order derived
//! from a 60-bit seed published in a VBI data line. The permutation is a
//! key-scheduled shuffle over the field; the receiver running the same
//! derivation rebuilds the inverse table and restores display order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Active lines shuffled per field.
pub const FIELD_LINES: usize = 287;

pub struct SysterEngine {
    seed: u64,
    /// Transmitted slot -> source line, rebuilt when the seed steps.
    permutation: [u16; FIELD_LINES],
    frame_count: u64,
}

impl SysterEngine {
    pub fn new(seed: u64) -> Self {
        let mut engine = Self {
            seed: seed & 0x0FFF_FFFF_FFFF_FFFF,
            permutation: [0; FIELD_LINES],
            frame_count: 0,
        };
        engine.derive();
        engine
    }

    /// The 60-bit seed currently announced over air.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fisher-Yates keyed by the seed. Deterministic: the same seed always
    /// yields the same table on both ends of the link.
    fn derive(&mut self) {
        for (i, slot) in self.permutation.iter_mut().enumerate() {
            *slot = i as u16;
        }
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        for i in (1..FIELD_LINES).rev() {
            let j = rng.gen_range(0..=i);
            self.permutation.swap(i, j);
        }
    }

    /// Per-frame tick; the seed steps every 16 frames.
    pub fn begin_frame(&mut self) {
        self.frame_count += 1;
        if self.frame_count % 16 == 0 {
            // Simple seed evolution: the receiver tracks the same sequence
            self.seed = (self
                .seed
                .wrapping_mul(0x5DEE_CE66D)
                .wrapping_add(0xB))
                & 0x0FFF_FFFF_FFFF_FFFF;
            self.derive();
        }
    }

    /// Source line (0-based within the field) for a transmitted slot.
    pub fn source_line(&self, slot: usize) -> usize {
        if slot < FIELD_LINES {
            self.permutation[slot] as usize
        } else {
            slot
        }
    }

    /// Seed bytes for the VBI announcement line, 60 bits MSB-justified.
    pub fn vbi_payload(&self) -> [u8; 8] {
        (self.seed << 4).to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_a_permutation() {
        let engine = SysterEngine::new(0x0123_4567_89AB_CDE);
        let mut seen = [false; FIELD_LINES];
        for slot in 0..FIELD_LINES {
            let src = engine.source_line(slot);
            assert!(src < FIELD_LINES);
            assert!(!seen[src], "line {src} fetched twice");
            seen[src] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_same_seed_same_table() {
        let a = SysterEngine::new(42);
        let b = SysterEngine::new(42);
        assert_eq!(a.permutation, b.permutation);
        let c = SysterEngine::new(43);
        assert_ne!(a.permutation, c.permutation);
    }

    #[test]
    fn test_seed_steps_every_16_frames() {
        let mut engine = SysterEngine::new(42);
        let first = engine.seed();
        for _ in 0..15 {
            engine.begin_frame();
            assert_eq!(engine.seed(), first);
        }
        engine.begin_frame();
        assert_ne!(engine.seed(), first);
        assert_eq!(engine.seed() >> 60, 0);
    }

    #[test]
    fn test_vbi_payload_carries_seed() {
        let engine = SysterEngine::new(0x0FFF_FFFF_FFFF_FFFF);
        let payload = engine.vbi_payload();
        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[7], 0xF0);
    }

    #[test]
    fn test_shuffle_actually_moves_lines() {
        let engine = SysterEngine::new(7);
        let moved = (0..FIELD_LINES)
            .filter(|&s| engine.source_line(s) != s)
            .count();
        assert!(moved > FIELD_LINES / 2);
    }
}
