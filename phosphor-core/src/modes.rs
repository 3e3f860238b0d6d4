//! Television mode catalogue.
//!
//! One immutable [`ModeDescriptor`] is built at open time for the selected
//! standard and sample rate. It resolves every microsecond-level timing
//! constant into whole sample counts, builds the per-frame line-kind table,
//! and carries the colour, sound, and VBI parameters the rest of the
//! pipeline reads. The composer holds no mode-specific code: everything it
//! does is driven from this table.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::rational::Rational;

/// Supported television standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeId {
    PalI,
    PalBG,
    PalN,
    NtscM,
    SecamL,
    DMac,
    D2Mac,
}

impl ModeId {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "pal-i" | "i" => ModeId::PalI,
            "pal-b" | "pal-g" | "pal-bg" | "b" | "g" => ModeId::PalBG,
            "pal-n" | "n" => ModeId::PalN,
            "ntsc-m" | "ntsc" | "m" => ModeId::NtscM,
            "secam-l" | "secam" | "l" => ModeId::SecamL,
            "mac-d" | "d-mac" => ModeId::DMac,
            "mac-d2" | "d2-mac" => ModeId::D2Mac,
            other => {
                return Err(ConfigError::UnknownMode {
                    name: other.to_string(),
                })
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModeId::PalI => "pal-i",
            ModeId::PalBG => "pal-b",
            ModeId::PalN => "pal-n",
            ModeId::NtscM => "ntsc-m",
            ModeId::SecamL => "secam-l",
            ModeId::DMac => "mac-d",
            ModeId::D2Mac => "mac-d2",
        }
    }
}

/// Colour encoding system carried on the active line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSystem {
    Pal,
    Ntsc,
    Secam,
    /// MAC modes carry no colour subcarrier.
    None,
}

/// What the composer draws for a given scanline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Two broad (field sync) pulses.
    BroadBroad,
    /// First half broad, second half equalizing.
    BroadEq,
    /// First half equalizing, second half broad.
    EqBroad,
    /// Two equalizing pulses.
    EqEq,
    /// Normal sync, blanked active region (general VBI line).
    Blank,
    /// Normal sync, teletext packet in the active region.
    Teletext,
    /// Normal sync, wide screen signalling run-in and group bits.
    Wss,
    /// Normal sync, EIA-608 closed caption waveform.
    ClosedCaption,
    /// Normal sync, active picture.
    Active,
}

/// RF modulation family the output shaper applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulationKind {
    /// Vestigial-sideband AM (Systems I/B/G/M/N/L).
    AmVsb,
    /// Wide-deviation FM (MAC family on satellite).
    FmWide,
}

/// Normalized video levels: blanking is 0.0 and peak white is 1.0.
#[derive(Debug, Clone, Copy)]
pub struct Levels {
    pub sync: f64,
    pub black: f64,
    pub white: f64,
    pub burst_amplitude: f64,
}

/// One analog FM (or AM for System L) sound subcarrier.
#[derive(Debug, Clone, Copy)]
pub struct AudioCarrier {
    pub freq_hz: f64,
    pub deviation_hz: f64,
    /// Carrier amplitude relative to peak video.
    pub level: f64,
    pub channel: AudioChannel,
    /// System L transmits sound as AM rather than FM.
    pub am: bool,
    /// Pre-emphasis time constant in microseconds.
    pub pre_emphasis_us: f64,
}

/// Which programme channel a carrier transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioChannel {
    Mono,
    /// A2/Zweiton second carrier: (L+R)/2 on carrier 1, R on carrier 2.
    Right,
}

/// NICAM-728 digital sound parameters.
#[derive(Debug, Clone, Copy)]
pub struct NicamParams {
    pub freq_hz: f64,
    pub level: f64,
}

/// MAC family parameters: duobinary data burst at the head of each line.
#[derive(Debug, Clone, Copy)]
pub struct MacParams {
    /// Data burst bit rate in bit/s (D: 20.25 M, D2: 10.125 M).
    pub data_rate: f64,
    /// Bits carried in the per-line burst.
    pub bits_per_line: usize,
    /// FM deviation for the wide-FM modulator, Hz per unit level.
    pub fm_deviation_hz: f64,
}

/// Microsecond-level constants for one standard; resolved to samples by
/// [`ModeDescriptor::new`].
struct ModeSpec {
    lines_per_frame: u32,
    frame_rate: Rational,
    interlaced: bool,
    colour: ColourSystem,
    /// Chroma subcarrier as an exact ratio, Hz.
    chroma_freq: Option<Rational>,
    sync_width_us: f64,
    broad_width_us: f64,
    eq_width_us: f64,
    /// Start of the burst window, from sync leading edge.
    burst_start_us: f64,
    burst_width_us: f64,
    /// Start of active video, from sync leading edge.
    active_start_us: f64,
    active_width_us: f64,
    levels: Levels,
    positive_modulation: bool,
    modulation: ModulationKind,
    audio: Vec<AudioCarrier>,
    nicam: Option<NicamParams>,
    mac: Option<MacParams>,
    /// (first_active, last_active) transmitted line numbers per field, and
    /// VBI service lines. Line numbers are 1-based over the whole frame.
    field1_active: (u32, u32),
    field2_active: (u32, u32),
    teletext_lines: Vec<u32>,
    wss_line: Option<u32>,
    cc_lines: Vec<u32>,
}

fn pal_levels() -> Levels {
    // 700 mV white, -300 mV sync, burst ±150 mV
    Levels {
        sync: -3.0 / 7.0,
        black: 0.0,
        white: 1.0,
        burst_amplitude: 1.5 / 7.0,
    }
}

fn ntsc_levels() -> Levels {
    // IRE/100 with 7.5 IRE setup
    Levels {
        sync: -0.4,
        black: 0.075,
        white: 1.0,
        burst_amplitude: 0.2,
    }
}

fn spec_for(id: ModeId) -> ModeSpec {
    let pal_timing = |colour: ColourSystem, chroma: Option<Rational>| ModeSpec {
        lines_per_frame: 625,
        frame_rate: Rational::integer(25),
        interlaced: true,
        colour,
        chroma_freq: chroma,
        sync_width_us: 4.7,
        broad_width_us: 27.3,
        eq_width_us: 2.35,
        burst_start_us: 5.6,
        burst_width_us: 2.25,
        active_start_us: 10.5,
        active_width_us: 52.0,
        levels: pal_levels(),
        positive_modulation: false,
        modulation: ModulationKind::AmVsb,
        audio: Vec::new(),
        nicam: None,
        mac: None,
        field1_active: (24, 310),
        field2_active: (336, 622),
        teletext_lines: (7..=18).chain(320..=331).collect(),
        wss_line: Some(23),
        cc_lines: Vec::new(),
    };

    match id {
        ModeId::PalI => {
            // 4433618.75 Hz = 17734475/4
            let mut spec = pal_timing(ColourSystem::Pal, Some(Rational::new(17_734_475, 4)));
            spec.audio = vec![AudioCarrier {
                freq_hz: 6_000_000.0,
                deviation_hz: 50_000.0,
                level: 0.19,
                channel: AudioChannel::Mono,
                am: false,
                pre_emphasis_us: 50.0,
            }];
            spec.nicam = Some(NicamParams {
                freq_hz: 6_552_000.0,
                level: 0.1,
            });
            spec
        }
        ModeId::PalBG => {
            let mut spec = pal_timing(ColourSystem::Pal, Some(Rational::new(17_734_475, 4)));
            spec.audio = vec![
                AudioCarrier {
                    freq_hz: 5_500_000.0,
                    deviation_hz: 50_000.0,
                    level: 0.19,
                    channel: AudioChannel::Mono,
                    am: false,
                    pre_emphasis_us: 50.0,
                },
                // A2/Zweiton second carrier at 5.5 MHz + 15.5 * fh
                AudioCarrier {
                    freq_hz: 5_742_187.5,
                    deviation_hz: 50_000.0,
                    level: 0.05,
                    channel: AudioChannel::Right,
                    am: false,
                    pre_emphasis_us: 50.0,
                },
            ];
            spec
        }
        ModeId::PalN => {
            // 3582056.25 Hz = 14328225/4
            let mut spec = pal_timing(ColourSystem::Pal, Some(Rational::new(14_328_225, 4)));
            spec.audio = vec![AudioCarrier {
                freq_hz: 4_500_000.0,
                deviation_hz: 25_000.0,
                level: 0.15,
                channel: AudioChannel::Mono,
                am: false,
                pre_emphasis_us: 75.0,
            }];
            spec
        }
        ModeId::NtscM => ModeSpec {
            lines_per_frame: 525,
            frame_rate: Rational::new(30_000, 1001),
            interlaced: true,
            colour: ColourSystem::Ntsc,
            // 315/88 MHz
            chroma_freq: Some(Rational::new(315_000_000, 88)),
            sync_width_us: 4.7,
            broad_width_us: 27.1,
            eq_width_us: 2.3,
            burst_start_us: 5.3,
            burst_width_us: 2.5,
            active_start_us: 9.4,
            active_width_us: 52.6,
            levels: ntsc_levels(),
            positive_modulation: false,
            modulation: ModulationKind::AmVsb,
            audio: vec![AudioCarrier {
                freq_hz: 4_500_000.0,
                deviation_hz: 25_000.0,
                level: 0.15,
                channel: AudioChannel::Mono,
                am: false,
                pre_emphasis_us: 75.0,
            }],
            nicam: None,
            mac: None,
            // Field 2 stops short of the trailing equalizing lines so
            // every raster row maps to a transmitted line
            field1_active: (22, 261),
            field2_active: (285, 523),
            teletext_lines: Vec::new(),
            wss_line: None,
            cc_lines: vec![21, 284],
        },
        ModeId::SecamL => {
            let mut spec = pal_timing(ColourSystem::Secam, None);
            spec.levels.burst_amplitude = 0.0;
            spec.positive_modulation = true;
            spec.audio = vec![AudioCarrier {
                freq_hz: 6_500_000.0,
                deviation_hz: 0.0,
                level: 0.1,
                channel: AudioChannel::Mono,
                am: true,
                pre_emphasis_us: 50.0,
            }];
            spec
        }
        ModeId::DMac | ModeId::D2Mac => {
            let data_rate = if id == ModeId::DMac {
                20_250_000.0
            } else {
                10_125_000.0
            };
            let mut spec = pal_timing(ColourSystem::None, None);
            spec.levels.burst_amplitude = 0.0;
            spec.modulation = ModulationKind::FmWide;
            // Data burst occupies the classic blanking interval
            spec.active_start_us = 10.5;
            spec.teletext_lines = Vec::new();
            spec.wss_line = None;
            spec.mac = Some(MacParams {
                data_rate,
                bits_per_line: if id == ModeId::DMac { 198 } else { 99 },
                fm_deviation_hz: 13_500_000.0,
            });
            spec
        }
    }
}

/// Fully sample-resolved mode descriptor. Immutable after open.
pub struct ModeDescriptor {
    pub id: ModeId,
    pub sample_rate: Rational,
    pub frame_rate: Rational,
    pub lines_per_frame: u32,
    pub interlaced: bool,
    pub samples_per_line: usize,
    pub samples_per_frame: u64,

    pub colour: ColourSystem,
    pub chroma_freq: Option<Rational>,
    pub levels: Levels,
    pub positive_modulation: bool,
    pub modulation: ModulationKind,

    pub sync_width: usize,
    pub broad_width: usize,
    pub eq_width: usize,
    pub burst_start: usize,
    pub burst_width: usize,
    pub active_start: usize,
    pub active_width: usize,

    pub audio: Vec<AudioCarrier>,
    pub nicam: Option<NicamParams>,
    pub mac: Option<MacParams>,

    /// One entry per transmitted line, index 0 = line 1.
    line_kinds: Vec<LineKind>,
    /// For active lines, the 0-based frame row they carry.
    frame_rows: Vec<Option<usize>>,
    /// Active picture raster dimensions the scaler must hit.
    pub active_lines: usize,
}

impl ModeDescriptor {
    pub fn new(id: ModeId, sample_rate: Rational) -> Result<Self, ConfigError> {
        let spec = spec_for(id);
        let line_rate = spec.frame_rate * Rational::integer(spec.lines_per_frame as i64);
        let per_line = sample_rate / line_rate;
        if !per_line.is_integer() {
            return Err(ConfigError::FractionalLine {
                rate: sample_rate.num() / sample_rate.den(),
            });
        }
        let samples_per_line = per_line.num() as usize;
        if samples_per_line < 256 {
            return Err(ConfigError::SampleRateTooLow {
                rate: sample_rate.num() / sample_rate.den(),
                min: 256 * line_rate.ceil(),
            });
        }
        let rate_f = sample_rate.as_f64();
        let us = |t: f64| (t * rate_f / 1e6).round() as usize;

        let mut line_kinds = vec![LineKind::Blank; spec.lines_per_frame as usize];
        let mut frame_rows = vec![None; spec.lines_per_frame as usize];
        let half = spec.lines_per_frame / 2;

        let set = |kinds: &mut Vec<LineKind>, line: u32, kind: LineKind| {
            kinds[(line - 1) as usize] = kind;
        };

        // Active ranges must never reach into the field sync blocks set
        // below: a line whose kind loses its Active marking would leave a
        // raster row mapped but never transmitted.
        let mut active_lines = 0usize;
        let (f1_first, f1_last) = spec.field1_active;
        let (f2_first, f2_last) = spec.field2_active;
        for line in f1_first..=f1_last {
            set(&mut line_kinds, line, LineKind::Active);
            frame_rows[(line - 1) as usize] = Some(((line - f1_first) * 2) as usize);
            active_lines += 1;
        }
        for line in f2_first..=f2_last {
            set(&mut line_kinds, line, LineKind::Active);
            frame_rows[(line - 1) as usize] = Some(((line - f2_first) * 2 + 1) as usize);
            active_lines += 1;
        }

        // Field sync blocks: broad pulses framed by equalizing pulses, the
        // second field offset by half a line via the mixed kinds.
        set(&mut line_kinds, 1, LineKind::BroadBroad);
        set(&mut line_kinds, 2, LineKind::BroadBroad);
        set(&mut line_kinds, 3, LineKind::BroadEq);
        set(&mut line_kinds, 4, LineKind::EqEq);
        set(&mut line_kinds, 5, LineKind::EqEq);
        set(&mut line_kinds, half + 1, LineKind::EqBroad);
        set(&mut line_kinds, half + 2, LineKind::BroadBroad);
        set(&mut line_kinds, half + 3, LineKind::BroadBroad);
        set(&mut line_kinds, half + 4, LineKind::EqEq);
        set(&mut line_kinds, half + 5, LineKind::EqEq);
        set(&mut line_kinds, spec.lines_per_frame - 1, LineKind::EqEq);
        set(&mut line_kinds, spec.lines_per_frame, LineKind::EqEq);

        for &line in &spec.teletext_lines {
            set(&mut line_kinds, line, LineKind::Teletext);
        }
        if let Some(line) = spec.wss_line {
            set(&mut line_kinds, line, LineKind::Wss);
        }
        for &line in &spec.cc_lines {
            set(&mut line_kinds, line, LineKind::ClosedCaption);
        }

        Ok(Self {
            id,
            sample_rate,
            frame_rate: spec.frame_rate,
            lines_per_frame: spec.lines_per_frame,
            interlaced: spec.interlaced,
            samples_per_line,
            samples_per_frame: samples_per_line as u64 * spec.lines_per_frame as u64,
            colour: spec.colour,
            chroma_freq: spec.chroma_freq,
            levels: spec.levels,
            positive_modulation: spec.positive_modulation,
            modulation: spec.modulation,
            sync_width: us(spec.sync_width_us),
            broad_width: us(spec.broad_width_us),
            eq_width: us(spec.eq_width_us),
            burst_start: us(spec.burst_start_us),
            burst_width: us(spec.burst_width_us),
            active_start: us(spec.active_start_us),
            active_width: us(spec.active_width_us),
            audio: spec.audio,
            nicam: spec.nicam,
            mac: spec.mac,
            line_kinds,
            frame_rows,
            active_lines,
        })
    }

    /// Kind of transmitted line `line` (1-based).
    pub fn line_kind(&self, line: u32) -> LineKind {
        self.line_kinds[(line - 1) as usize]
    }

    /// Frame row carried by transmitted line `line`, if it is active.
    pub fn frame_row(&self, line: u32) -> Option<usize> {
        self.frame_rows[(line - 1) as usize]
    }

    /// Target raster the scaler produces: active samples x active lines.
    pub fn raster_size(&self) -> (usize, usize) {
        (self.active_width, self.active_lines)
    }

    /// Audio samples the resampler must deliver per video frame at the
    /// 32 kHz programme rate.
    pub fn audio_samples_per_frame(&self) -> usize {
        (Rational::integer(32_000) / self.frame_rate).ceil() as usize
    }

    /// Line frequency in Hz.
    pub fn line_rate(&self) -> Rational {
        self.frame_rate * Rational::integer(self.lines_per_frame as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pal_i_timing_at_20_25_mhz() {
        let mode = ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap();
        assert_eq!(mode.samples_per_line, 1296);
        assert_eq!(mode.lines_per_frame, 625);
        assert_eq!(mode.samples_per_frame, 810_000);
        // Exactly 25 frames/s: samples per second must equal the rate
        assert_eq!(mode.samples_per_frame * 25, 20_250_000);
    }

    #[test]
    fn test_ntsc_line_count_at_13_5_mhz() {
        let mode = ModeDescriptor::new(ModeId::NtscM, Rational::integer(13_500_000)).unwrap();
        assert_eq!(mode.samples_per_line, 858);
        assert_eq!(mode.lines_per_frame, 525);
        // Trailing equalizing lines carry no picture
        assert_eq!(mode.line_kind(524), LineKind::EqEq);
        assert_eq!(mode.line_kind(525), LineKind::EqEq);
        assert_eq!(mode.frame_row(524), None);
    }

    #[test]
    fn test_every_raster_row_is_transmitted() {
        for (id, rate) in [
            (ModeId::PalI, 20_250_000),
            (ModeId::PalBG, 20_250_000),
            (ModeId::NtscM, 13_500_000),
            (ModeId::SecamL, 20_250_000),
            (ModeId::DMac, 20_250_000),
        ] {
            let mode = ModeDescriptor::new(id, Rational::integer(rate)).unwrap();
            let mut seen = vec![false; mode.active_lines];
            for line in 1..=mode.lines_per_frame {
                if mode.line_kind(line) == LineKind::Active {
                    let row = mode
                        .frame_row(line)
                        .unwrap_or_else(|| panic!("{}: active line {line} has no row", id.name()));
                    assert!(row < mode.active_lines, "{}: row {row} out of raster", id.name());
                    assert!(!seen[row], "{}: row {row} transmitted twice", id.name());
                    seen[row] = true;
                }
            }
            assert!(
                seen.iter().all(|&s| s),
                "{}: raster rows never transmitted: {:?}",
                id.name(),
                seen.iter().enumerate().filter(|(_, &s)| !s).map(|(i, _)| i).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_fractional_line_rejected() {
        // 1 MHz does not divide the PAL line rate into whole samples
        let err = ModeDescriptor::new(ModeId::PalI, Rational::integer(1_000_001));
        assert!(matches!(err, Err(ConfigError::FractionalLine { .. })));
    }

    #[test]
    fn test_pal_active_line_mapping() {
        let mode = ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap();
        assert_eq!(mode.frame_row(24), Some(0));
        assert_eq!(mode.frame_row(25), Some(2));
        assert_eq!(mode.frame_row(336), Some(1));
        assert_eq!(mode.frame_row(1), None);
        assert_eq!(mode.line_kind(1), LineKind::BroadBroad);
        assert_eq!(mode.line_kind(23), LineKind::Wss);
        assert_eq!(mode.line_kind(7), LineKind::Teletext);
    }

    #[test]
    fn test_audio_samples_per_frame() {
        let pal = ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap();
        assert_eq!(pal.audio_samples_per_frame(), 1280); // 32000 / 25
        let ntsc = ModeDescriptor::new(ModeId::NtscM, Rational::integer(13_500_000)).unwrap();
        assert_eq!(ntsc.audio_samples_per_frame(), 1068); // ceil(32000 * 1001 / 30000)
    }

    #[test]
    fn test_mode_names_round_trip() {
        for id in [
            ModeId::PalI,
            ModeId::PalBG,
            ModeId::PalN,
            ModeId::NtscM,
            ModeId::SecamL,
            ModeId::DMac,
            ModeId::D2Mac,
        ] {
            assert_eq!(ModeId::parse(id.name()).unwrap(), id);
        }
    }
}
