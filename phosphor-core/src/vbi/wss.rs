//! Wide Screen Signalling, transmitted on line 23 of 625-line systems.
//!
//! The line carries a biphase run-in, a start code, and a 14-bit group; the
//! first four bits describe the aspect ratio. Elements are clocked at 5 MHz.

use serde::{Deserialize, Serialize};

use crate::modes::ModeDescriptor;

/// Aspect-ratio signalling selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WssMode {
    /// Follow the source frame's pixel aspect.
    #[default]
    Auto,
    FourThree,
    SixteenNine,
    Off,
}

impl WssMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(WssMode::Auto),
            "4:3" => Some(WssMode::FourThree),
            "16:9" => Some(WssMode::SixteenNine),
            "off" => Some(WssMode::Off),
            _ => None,
        }
    }
}

/// Element rate, Hz.
const ELEMENT_RATE: u64 = 5_000_000;
/// Data starts 11 microseconds after the sync leading edge.
const START_US: f64 = 11.0;
const LEVEL: f64 = 0.5;

/// Run-in: 29 elements of alternating emphasis.
const RUN_IN: [u8; 29] = [
    1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0,
];
/// Start code, 24 elements.
const START_CODE: [u8; 24] = [
    0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 0, 0, 0, 1,
];

/// Group-1 aspect bits, b0..b3.
fn aspect_bits(mode: WssMode, source_is_wide: bool) -> [u8; 4] {
    let wide = match mode {
        WssMode::Auto => source_is_wide,
        WssMode::FourThree => false,
        WssMode::SixteenNine => true,
        WssMode::Off => return [0; 4],
    };
    if wide {
        // 16:9 full format
        [1, 1, 1, 0]
    } else {
        // 4:3 full format
        [1, 0, 0, 0]
    }
}

/// Render the WSS waveform into a line buffer. Returns false when
/// signalling is disabled and the line should stay blank.
pub fn render_line(
    mode: &ModeDescriptor,
    wss: WssMode,
    source_is_wide: bool,
    buf: &mut [f64],
) -> bool {
    if wss == WssMode::Off {
        return false;
    }
    let rate = mode.sample_rate.as_f64();
    let start = (START_US * rate / 1e6).round() as usize;

    // Element stream: run-in, start code, then 14 group bits as 6-element
    // biphase symbols. Bits beyond the aspect group are zero.
    let mut elements: Vec<u8> = Vec::with_capacity(29 + 24 + 14 * 6);
    elements.extend_from_slice(&RUN_IN);
    elements.extend_from_slice(&START_CODE);
    let aspect = aspect_bits(wss, source_is_wide);
    for bit_index in 0..14 {
        let bit = if bit_index < 4 { aspect[bit_index] } else { 0 };
        if bit == 1 {
            elements.extend_from_slice(&[1, 1, 1, 0, 0, 0]);
        } else {
            elements.extend_from_slice(&[0, 0, 0, 1, 1, 1]);
        }
    }

    let num = ELEMENT_RATE * mode.sample_rate.den() as u64;
    let den = mode.sample_rate.num() as u64;
    let mut acc: u64 = 0;
    let mut element: usize = 0;
    for sample in buf.iter_mut().skip(start) {
        if element >= elements.len() {
            break;
        }
        if elements[element] == 1 {
            *sample = LEVEL * mode.levels.white;
        }
        acc += num;
        while acc >= den {
            acc -= den;
            element += 1;
        }
    }
    true
}
