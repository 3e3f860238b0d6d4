//! Sample sinks: raw interleaved files, WAV for inspection, stdout.
//!
//! SDR device outputs (`hackrf`, `fl2k`) are recognized but this build
//! carries no drivers; selecting one reports a configuration error so the
//! exit code distinguishes it from I/O failure.

use color_eyre::eyre::{eyre, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use phosphor_core::errors::SinkError;
use phosphor_core::SampleSink;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Raw little-endian interleaved samples to a file or stdout.
pub struct RawSink {
    writer: Box<dyn Write>,
    eight_bit: bool,
    samples_written: u64,
}

impl RawSink {
    pub fn create(path: &str, eight_bit: bool) -> Result<Self> {
        let writer: Box<dyn Write> = if path == "-" {
            Box::new(io::stdout())
        } else {
            Box::new(BufWriter::new(File::create(path)?))
        };
        Ok(Self {
            writer,
            eight_bit,
            samples_written: 0,
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl SampleSink for RawSink {
    fn write_i16(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        if self.eight_bit {
            let bytes: Vec<u8> = samples.iter().map(|&s| ((s >> 8) as i8) as u8).collect();
            self.writer.write_all(&bytes)?;
        } else {
            let mut bytes = Vec::with_capacity(samples.len() * 2);
            for &s in samples {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            self.writer.write_all(&bytes)?;
        }
        self.samples_written += samples.len() as u64;
        Ok(())
    }
}

/// WAV output: one channel for baseband, two (I/Q) for complex output.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, complex: bool) -> Result<Self> {
        let spec = WavSpec {
            channels: if complex { 2 } else { 1 },
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        Ok(Self {
            writer: Some(WavWriter::create(path, spec)?),
            samples_written: 0,
        })
    }

    pub fn finalize(mut self) -> Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(self.samples_written)
    }
}

impl SampleSink for WavSink {
    fn write_i16(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or_else(|| SinkError::Device {
            reason: "wav writer already finalized".to_string(),
        })?;
        for &s in samples {
            writer.write_sample(s).map_err(|e| SinkError::Device {
                reason: e.to_string(),
            })?;
        }
        self.samples_written += samples.len() as u64;
        Ok(())
    }
}

/// One of the supported sink flavours, resolved from the output selector.
pub enum Output {
    Raw(RawSink),
    Wav(WavSink),
}

impl Output {
    pub fn open(selector: &str, sample_rate: u32, complex: bool, eight_bit: bool) -> Result<Self> {
        match selector {
            "hackrf" | "fl2k" => Err(eyre!(
                "output type {selector} is not built into this binary"
            )),
            path if path.ends_with(".wav") => {
                Ok(Output::Wav(WavSink::create(Path::new(path), sample_rate, complex)?))
            }
            path => Ok(Output::Raw(RawSink::create(path, eight_bit)?)),
        }
    }

    pub fn write(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        match self {
            Output::Raw(sink) => sink.write_i16(samples),
            Output::Wav(sink) => sink.write_i16(samples),
        }
    }

    pub fn finish(self) -> Result<u64> {
        match self {
            Output::Raw(sink) => Ok(sink.samples_written()),
            Output::Wav(sink) => sink.finalize(),
        }
    }
}
