//! Library-level configuration: every knob the synthesis pipeline takes,
//! with the assembly helpers that turn a validated configuration into the
//! descriptor, scrambler, and feed parameters.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::composer::ComposerOptions;
use crate::errors::{ConfigError, TvError};
use crate::feed::FeedConfig;
use crate::modes::{ModeDescriptor, ModeId};
use crate::rational::Rational;
use crate::scramble::{videocrypt, Scrambler};
use crate::subtitles::SubtitleList;
use crate::vbi::teletext::TeletextGenerator;
use crate::vbi::wss::WssMode;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvConfig {
    /// Television standard, e.g. "pal-i".
    pub mode: String,
    /// Output sample rate in Hz; must divide into whole samples per line.
    pub sample_rate: i64,
    /// Low-IF carrier in Hz; 0 selects real baseband output.
    pub frequency: f64,
    /// Output gain in dB.
    pub gain: f64,
    /// Display gamma adjustment applied ahead of the colour matrix.
    pub gamma: f64,
    /// Directory of EP1 `.tti` teletext pages.
    pub teletext: Option<PathBuf>,
    /// Render subtitles onto the picture.
    pub subtitles: bool,
    /// Transmit subtitles in-band (teletext 888 and line 21).
    pub tx_subtitles: bool,
    /// Burn a running timestamp into the picture.
    pub timestamp: bool,
    /// Start offset into the source, minutes.
    pub position: f64,
    pub letterbox: bool,
    pub pillarbox: bool,
    /// Fold multi-channel audio down to stereo.
    pub downmix: bool,
    pub volume: f32,
    /// Wide screen signalling: auto, 4:3, 16:9, off.
    pub wss: String,
    /// Conditional access selector, e.g. "vc-sky-07", "syster", "none".
    pub scrambler: String,
    /// Mode-specific key material, hex-encoded.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub key: Vec<u8>,
    /// Seed for the scrambler's message PRNG; fixed seeds give repeatable
    /// transmissions for decoder testing.
    pub scramble_seed: u64,
}

impl Default for TvConfig {
    fn default() -> Self {
        Self {
            mode: "pal-i".to_string(),
            sample_rate: 20_250_000,
            frequency: 0.0,
            gain: 0.0,
            gamma: 1.0,
            teletext: None,
            subtitles: false,
            tx_subtitles: false,
            timestamp: false,
            position: 0.0,
            letterbox: false,
            pillarbox: false,
            downmix: false,
            volume: 1.0,
            wss: "auto".to_string(),
            scrambler: "none".to_string(),
            key: Vec::new(),
            scramble_seed: 0x5EED,
        }
    }
}

impl TvConfig {
    pub fn mode_descriptor(&self) -> Result<ModeDescriptor, TvError> {
        let id = ModeId::parse(&self.mode)?;
        Ok(ModeDescriptor::new(id, Rational::integer(self.sample_rate))?)
    }

    pub fn wss_mode(&self) -> Result<WssMode, TvError> {
        WssMode::parse(&self.wss).ok_or_else(|| {
            TvError::Config(ConfigError::InvalidParameter {
                name: "wss".to_string(),
                reason: format!("unknown value {:?}", self.wss),
            })
        })
    }

    pub fn scrambler(&self, mode: &ModeDescriptor) -> Result<Scrambler, TvError> {
        let scrambler = Scrambler::parse(
            &self.scrambler,
            mode.sample_rate.as_f64(),
            self.scramble_seed,
        )?;
        if let Scrambler::Vc1(engine) | Scrambler::Vc2(engine) = &scrambler {
            videocrypt::validate_key(engine.mode(), &self.key)?;
        }
        Ok(scrambler)
    }

    pub fn teletext(&self) -> Result<Option<TeletextGenerator>, TvError> {
        match &self.teletext {
            None => Ok(None),
            Some(dir) => {
                let mut generator = TeletextGenerator::new();
                let loaded = generator.load_directory(dir)?;
                log::info!("loaded {loaded} teletext pages from {}", dir.display());
                Ok(Some(generator))
            }
        }
    }

    pub fn feed_config(&self, mode: &ModeDescriptor) -> FeedConfig {
        let (raster_width, raster_height) = mode.raster_size();
        let start_offset_frames =
            (self.position * 60.0 * mode.frame_rate.as_f64()).round() as i64;
        FeedConfig {
            raster_width,
            raster_height,
            frame_rate: mode.frame_rate,
            audio_samples_per_frame: mode.audio_samples_per_frame(),
            letterbox: self.letterbox,
            pillarbox: self.pillarbox,
            volume: self.volume,
            downmix: self.downmix,
            start_offset_frames,
        }
    }

    pub fn composer_options(
        &self,
        subtitles: Option<Arc<SubtitleList>>,
    ) -> Result<ComposerOptions, TvError> {
        Ok(ComposerOptions {
            wss: self.wss_mode()?,
            gamma: self.gamma,
            tx_subtitles: self.tx_subtitles,
            subtitles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_resolves() {
        let config = TvConfig::default();
        let mode = config.mode_descriptor().unwrap();
        assert_eq!(mode.samples_per_line, 1296);
        assert!(matches!(config.scrambler(&mode).unwrap(), Scrambler::None));
        assert_eq!(config.wss_mode().unwrap(), WssMode::Auto);
    }

    #[test]
    fn test_bad_mode_is_config_error() {
        let config = TvConfig {
            mode: "pal-q".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.mode_descriptor(),
            Err(TvError::Config(ConfigError::UnknownMode { .. }))
        ));
    }

    #[test]
    fn test_position_maps_to_frames() {
        let config = TvConfig {
            position: 2.0,
            ..Default::default()
        };
        let mode = config.mode_descriptor().unwrap();
        let feed = config.feed_config(&mode);
        assert_eq!(feed.start_offset_frames, 3000); // 2 min * 25 fps
    }

    #[test]
    fn test_key_length_checked() {
        let config = TvConfig {
            scrambler: "vc-sky-07".to_string(),
            key: vec![0u8; 5],
            ..Default::default()
        };
        let mode = config.mode_descriptor().unwrap();
        assert!(config.scrambler(&mode).is_err());
    }
}
