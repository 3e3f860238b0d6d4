//! Structured logging for the transmitter front end.
//!
//! Events from the core pipeline arrive through the `log` facade and are
//! written as JSON lines or plain text to the configured target.

use crate::config::{LogFormat, LogTarget, LoggingConfig};
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use log::{Level, LevelFilter, Metadata, Record};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    timestamp: DateTime<Utc>,
    level: &'a str,
    target: &'a str,
    message: String,
}

struct Inner {
    writer: Box<dyn Write + Send>,
    format: LogFormat,
}

pub struct StructuredLogger {
    inner: Mutex<Inner>,
    level: LevelFilter,
}

impl StructuredLogger {
    fn new(config: &LoggingConfig) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match config.target {
            LogTarget::Stdout => Box::new(io::stdout()),
            LogTarget::Stderr => Box::new(io::stderr()),
            LogTarget::File => {
                let path = config
                    .file_path
                    .as_ref()
                    .ok_or_else(|| color_eyre::eyre::eyre!("file path required for file logging"))?;
                Box::new(BufWriter::new(File::create(path)?))
            }
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                writer,
                format: config.format,
            }),
            level: config.level_filter(),
        })
    }

    /// Install as the global logger.
    pub fn install(config: &LoggingConfig) -> Result<()> {
        let logger = Self::new(config)?;
        let level = logger.level;
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl log::Log for StructuredLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let result = match inner.format {
            LogFormat::Json => {
                let line = LogLine {
                    timestamp: Utc::now(),
                    level: level_str(record.level()),
                    target: record.target(),
                    message: record.args().to_string(),
                };
                serde_json::to_string(&line)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                    .and_then(|json| writeln!(inner.writer, "{json}"))
            }
            LogFormat::Text => writeln!(
                inner.writer,
                "{} [{}] {}: {}",
                Utc::now().format("%H:%M:%S%.3f"),
                level_str(record.level()),
                record.target(),
                record.args()
            ),
        };
        let _ = result;
    }

    fn flush(&self) {
        let _ = self.inner.lock().unwrap().writer.flush();
    }
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}
