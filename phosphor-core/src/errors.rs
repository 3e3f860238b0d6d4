//! Phosphor error types with granular categories

use thiserror::Error;

/// Top-level error type for all Phosphor operations
#[derive(Debug, Error)]
pub enum TvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed pipeline error: {0}")]
    Feed(#[from] FeedError),

    #[error("Teletext error: {0}")]
    Teletext(#[from] TeletextError),

    #[error("Scrambler error: {0}")]
    Scramble(#[from] ScrambleError),

    #[error("Sample sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration errors, reported at open time only
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown mode: {name}")]
    UnknownMode { name: String },

    #[error("Unknown scrambler: {name}")]
    UnknownScrambler { name: String },

    #[error("Sample rate {rate} Hz does not divide into whole samples per line for this mode")]
    FractionalLine { rate: i64 },

    #[error("Sample rate {rate} Hz is below the minimum {min} Hz for this mode")]
    SampleRateTooLow { rate: i64, min: i64 },

    #[error("Invalid key material: {reason}")]
    InvalidKey { reason: String },

    #[error("Output type {name} is not built into this binary")]
    UnsupportedOutput { name: String },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Feed pipeline errors crossing thread boundaries
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Stream ended")]
    EndOfStream,

    #[error("Pipeline aborted")]
    Aborted,

    #[error("Decode failed: {reason}")]
    Decode { reason: String },

    #[error("Resample failed: {reason}")]
    Resample { reason: String },
}

/// Teletext page and packet errors
#[derive(Debug, Error)]
pub enum TeletextError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed page {path}: {reason}")]
    MalformedPage { path: String, reason: String },

    #[error("Page number {page:03X} out of range 100..8FF")]
    PageOutOfRange { page: u16 },
}

/// Conditional-access errors
#[derive(Debug, Error)]
pub enum ScrambleError {
    #[error("Key of {got} bytes, mode requires {need}")]
    KeyLength { got: usize, need: usize },

    #[error("Scrambler {name} is not valid for this television mode")]
    ModeMismatch { name: &'static str },
}

/// Sample sink errors; always fatal to the pipeline
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("Device error: {reason}")]
    Device { reason: String },
}

/// Result type alias for Phosphor operations
pub type Result<T> = std::result::Result<T, TvError>;
