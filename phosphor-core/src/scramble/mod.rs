//! Conditional-access engines.
//!
//! The composer drives every scheme through the same three calls:
//! [`Scrambler::begin_frame`] once per frame, [`Scrambler::prepare_line`]
//! before each active line, and [`Scrambler::apply`] on the rendered line
//! buffer. Syster additionally redirects which source row a transmitted
//! line fetches.

pub mod discret;
pub mod syster;
pub mod videocrypt;

use std::ops::Range;

use crate::errors::ConfigError;
use discret::DiscretEngine;
use syster::SysterEngine;
use videocrypt::{VcMode, VideocryptEngine};

pub enum Scrambler {
    None,
    Vc1(VideocryptEngine),
    Vc2(VideocryptEngine),
    Syster(SysterEngine),
    D11(DiscretEngine),
}

impl Scrambler {
    /// Parse a scrambler selector: `none`, `vc-<issue>`, `vc2-<issue>`,
    /// `syster`, `d11`.
    pub fn parse(name: &str, sample_rate: f64, seed: u64) -> Result<Self, ConfigError> {
        if name == "none" || name.is_empty() {
            return Ok(Scrambler::None);
        }
        if name == "syster" {
            return Ok(Scrambler::Syster(SysterEngine::new(seed)));
        }
        if name == "d11" {
            return Ok(Scrambler::D11(DiscretEngine::new(seed as u16, sample_rate)));
        }
        if let Some(issue) = name.strip_prefix("vc2-") {
            let mode = VcMode::parse(issue).ok_or_else(|| ConfigError::UnknownScrambler {
                name: name.to_string(),
            })?;
            return Ok(Scrambler::Vc2(VideocryptEngine::new(mode, true, seed)));
        }
        if let Some(issue) = name.strip_prefix("vc-") {
            // Accept both vc-sky-07 and vc-sky07
            let issue = issue.replace('-', "");
            let mode = VcMode::parse(&issue).ok_or_else(|| ConfigError::UnknownScrambler {
                name: name.to_string(),
            })?;
            return Ok(Scrambler::Vc1(VideocryptEngine::new(mode, false, seed)));
        }
        Err(ConfigError::UnknownScrambler {
            name: name.to_string(),
        })
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Scrambler::None)
    }

    /// Once per frame, before any line of the frame is composed.
    pub fn begin_frame(&mut self) {
        match self {
            Scrambler::None => {}
            Scrambler::Vc1(engine) | Scrambler::Vc2(engine) => engine.begin_frame(),
            Scrambler::Syster(engine) => engine.begin_frame(),
            Scrambler::D11(_) => {}
        }
    }

    /// Once per transmitted line, before the line is rendered.
    pub fn prepare_line(&mut self) {
        if let Scrambler::D11(engine) = self {
            engine.prepare_line();
        }
    }

    /// Redirect the source row an active line fetches. `slot` is the
    /// 0-based active-line index within the current field.
    pub fn video_row(&self, slot: usize, default_row: usize, field_offset: usize) -> usize {
        match self {
            Scrambler::Syster(engine) => {
                let src = engine.source_line(slot);
                // Preserve the field parity the default row encodes
                field_offset + src * 2
            }
            _ => default_row,
        }
    }

    /// Transform the rendered active region in place.
    pub fn apply(&mut self, buf: &mut [f64], active: Range<usize>, line_index: usize) {
        match self {
            Scrambler::None | Scrambler::Syster(_) => {}
            Scrambler::Vc1(engine) | Scrambler::Vc2(engine) => {
                engine.apply(buf, active, line_index)
            }
            Scrambler::D11(engine) => engine.apply(buf, active),
        }
    }

    /// 32-byte payload for the scheme's VBI data line, if it emits one.
    pub fn vbi_row(&mut self) -> Option<[u8; videocrypt::ROW_BYTES]> {
        match self {
            Scrambler::Vc1(engine) | Scrambler::Vc2(engine) => Some(engine.next_vbi_row()),
            Scrambler::Syster(engine) => {
                let mut row = [0u8; videocrypt::ROW_BYTES];
                row[..8].copy_from_slice(&engine.vbi_payload());
                Some(row)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selectors() {
        assert!(!Scrambler::parse("none", 20_250_000.0, 1).unwrap().is_active());
        assert!(Scrambler::parse("vc-sky-07", 20_250_000.0, 1).unwrap().is_active());
        assert!(matches!(
            Scrambler::parse("vc-xtea", 20_250_000.0, 1).unwrap(),
            Scrambler::Vc1(_)
        ));
        assert!(matches!(
            Scrambler::parse("vc2-mc", 20_250_000.0, 1).unwrap(),
            Scrambler::Vc2(_)
        ));
        assert!(matches!(
            Scrambler::parse("syster", 20_250_000.0, 1).unwrap(),
            Scrambler::Syster(_)
        ));
        assert!(matches!(
            Scrambler::parse("d11", 20_250_000.0, 1).unwrap(),
            Scrambler::D11(_)
        ));
        assert!(Scrambler::parse("vc-bogus", 20_250_000.0, 1).is_err());
    }

    #[test]
    fn test_syster_row_redirect_keeps_field_parity() {
        let scrambler = Scrambler::parse("syster", 20_250_000.0, 9).unwrap();
        // Field 2 rows are odd: offset 1, stride 2
        for slot in 0..10 {
            let row = scrambler.video_row(slot, slot * 2 + 1, 1);
            assert_eq!(row % 2, 1);
        }
    }

    #[test]
    fn test_non_syster_keeps_default_row() {
        let scrambler = Scrambler::parse("vc-sky-09", 20_250_000.0, 9).unwrap();
        assert_eq!(scrambler.video_row(5, 10, 0), 10);
    }
}
