//! CLI configuration: a TOML file with the transmitter knobs, overridden
//! by command-line flags.

use color_eyre::eyre::{Context, Result};
use log::LevelFilter;
use phosphor_core::TvConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    Stdout,
    #[default]
    Stderr,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// error, warn, info, debug, trace
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            target: LogTarget::default(),
            file_path: None,
            level: default_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }
}

/// Complete CLI configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Media input: a file path, or `test:bars` for the pattern source.
    #[serde(default = "default_input")]
    pub input: String,

    /// Output target: a `.wav`/`.iq` path, `-` for stdout, or a device
    /// name (`hackrf`, `fl2k`) when built with driver support.
    #[serde(default = "default_output")]
    pub output: String,

    /// Bound the render length, seconds. Unset runs to input EOF.
    #[serde(default)]
    pub duration: Option<f64>,

    /// Emit 8-bit instead of 16-bit samples.
    #[serde(default)]
    pub eight_bit: bool,

    /// Shape the output as SSB instead of the mode default.
    #[serde(default)]
    pub ssb: bool,

    /// Pre-rasterized logo in binary PPM (P6) format.
    #[serde(default)]
    pub logo: Option<PathBuf>,

    /// Transmitter knobs, passed through to the core.
    #[serde(default)]
    pub tv: TvConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_input() -> String {
    "test:bars".to_string()
}

fn default_output() -> String {
    "phosphor.iq".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            duration: None,
            eight_bit: false,
            ssb: false,
            logo: None,
            tv: TvConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {path}"))?;
        toml::from_str(&content).wrap_err_with(|| format!("failed to parse {path}"))
    }
}

/// Minimal binary PPM (P6) reader for pre-rasterized logos. Pure-white
/// pixels are treated as transparent so rectangular logo files keep their
/// silhouette.
pub fn load_ppm(path: &Path) -> Result<phosphor_core::overlay::OverlayImage> {
    let bytes = std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let mut fields = Vec::new();
    let mut pos = 0;
    // Header: magic, width, height, maxval, separated by whitespace with
    // optional # comments
    while fields.len() < 4 && pos < bytes.len() {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'#' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        fields.push(std::str::from_utf8(&bytes[start..pos])?.to_string());
    }
    pos += 1; // single whitespace after maxval
    if fields.len() != 4 || fields[0] != "P6" {
        color_eyre::eyre::bail!("{} is not a binary PPM file", path.display());
    }
    let width: usize = fields[1].parse()?;
    let height: usize = fields[2].parse()?;
    let pixels = &bytes[pos..];
    if pixels.len() < width * height * 3 {
        color_eyre::eyre::bail!("{} is truncated", path.display());
    }
    let argb = pixels
        .chunks_exact(3)
        .take(width * height)
        .map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            let alpha: u32 = if r == 255 && g == 255 && b == 255 { 0 } else { 255 };
            (alpha << 24) | (r << 16) | (g << 8) | b
        })
        .collect();
    Ok(phosphor_core::overlay::OverlayImage {
        width,
        height,
        argb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_parses() {
        let config: CliConfig = toml::from_str(
            r#"
            input = "test:bars"
            output = "out.wav"
            duration = 2.0

            [tv]
            mode = "pal-i"
            sample_rate = 20250000
            frequency = 0.0
            gain = 0.0
            gamma = 1.0
            subtitles = false
            tx_subtitles = false
            timestamp = true
            position = 0.0
            letterbox = false
            pillarbox = false
            downmix = false
            volume = 1.0
            wss = "auto"
            scrambler = "vc-sky-07"
            key = ""
            scramble_seed = 99
            "#,
        )
        .unwrap();
        assert_eq!(config.duration, Some(2.0));
        assert_eq!(config.tv.scrambler, "vc-sky-07");
        assert!(config.tv.timestamp);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.input, "test:bars");
        assert_eq!(config.tv.mode, "pal-i");
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Info);
    }
}
