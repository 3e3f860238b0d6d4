mod config;
mod logging;
mod sink;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use phosphor_core::composer::Composer;
use phosphor_core::errors::FeedError;
use phosphor_core::feed::{self, pattern, sources};
use phosphor_core::overlay::{Corner, OverlayStack};
use phosphor_core::subtitles::SubtitleList;
use phosphor_core::IqModulator;

use config::CliConfig;
use logging::StructuredLogger;
use sink::Output;

/// Process-wide abort flag, observed by the sample loop.
static ABORT: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(author, version, about = "Phosphor analog television transmitter", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Media input: a file path or test:bars (overrides config)
    #[arg(short, long)]
    input: Option<String>,

    /// Output: path (.wav or raw), "-", hackrf, fl2k (overrides config)
    #[arg(short, long)]
    output: Option<String>,

    /// Television mode, e.g. pal-i, ntsc-m, secam-l
    #[arg(short, long)]
    mode: Option<String>,

    /// Sample rate in Hz
    #[arg(short = 's', long)]
    sample_rate: Option<i64>,

    /// Carrier frequency in Hz; 0 for baseband
    #[arg(short, long)]
    frequency: Option<f64>,

    /// Output gain in dB
    #[arg(short, long)]
    gain: Option<f64>,

    /// Conditional access: none, vc-sky-07, vc-xtea, vc2-mc, syster, d11, ...
    #[arg(long)]
    scrambler: Option<String>,

    /// Teletext page directory (.tti files)
    #[arg(long)]
    teletext: Option<PathBuf>,

    /// Logo overlay, binary PPM
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Burn a running timestamp into the picture
    #[arg(long)]
    timestamp: bool,

    /// Render length in seconds (overrides config)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Verbose diagnostics
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            error!("open failed: {err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)
            .wrap_err_with(|| format!("failed to load config from {path}"))?,
        None => CliConfig::default(),
    };

    // Command-line overrides
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(mode) = args.mode {
        config.tv.mode = mode;
    }
    if let Some(rate) = args.sample_rate {
        config.tv.sample_rate = rate;
    }
    if let Some(frequency) = args.frequency {
        config.tv.frequency = frequency;
    }
    if let Some(gain) = args.gain {
        config.tv.gain = gain;
    }
    if let Some(scrambler) = args.scrambler {
        config.tv.scrambler = scrambler;
    }
    if let Some(teletext) = args.teletext {
        config.tv.teletext = Some(teletext);
    }
    if let Some(logo) = args.logo {
        config.logo = Some(logo);
    }
    if args.timestamp {
        config.tv.timestamp = true;
    }
    if let Some(duration) = args.duration {
        config.duration = Some(duration);
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    StructuredLogger::install(&config.logging)?;

    // Resolve the transmission chain
    let mode = config.tv.mode_descriptor()?;
    let scrambler = config.tv.scrambler(&mode)?;
    let teletext = config.tv.teletext()?;
    let feed_cfg = config.tv.feed_config(&mode);
    let subtitle_list = Arc::new(SubtitleList::new());
    let composer_options = config
        .tv
        .composer_options(Some(Arc::clone(&subtitle_list)))?;

    let logo = match &config.logo {
        Some(path) => Some((config::load_ppm(path)?, Corner::TopRight)),
        None => None,
    };
    let overlays = OverlayStack::new(
        logo,
        config.tv.timestamp,
        config
            .tv
            .subtitles
            .then(|| Arc::clone(&subtitle_list)),
    );

    let fps = mode.frame_rate.as_f64();
    let duration_frames = config.duration.map(|secs| (secs * fps).ceil() as u64);

    let (raster_width, raster_height) = mode.raster_size();
    let source = match config.input.as_str() {
        "test:bars" | "test" => {
            pattern::bars_and_tone(raster_width, raster_height, mode.frame_rate, duration_frames)
        }
        path => sources::audio_file(
            std::path::Path::new(path),
            raster_width,
            raster_height,
            mode.frame_rate,
        )?,
    };

    let mut modulator = if config.ssb {
        IqModulator::with_ssb(&mode, config.tv.frequency, config.tv.gain)
    } else {
        IqModulator::new(&mode, config.tv.frequency, config.tv.gain)
    };
    let mut output = Output::open(
        &config.output,
        config.tv.sample_rate as u32,
        modulator.is_complex(),
        config.eight_bit,
    )?;

    info!(
        "transmitting {} at {} Hz to {} ({} samples/line)",
        config.tv.mode, config.tv.sample_rate, config.output, mode.samples_per_line
    );

    let progress = match duration_frames {
        Some(frames) => {
            let bar = ProgressBar::new(frames);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40} {pos}/{len} frames ({eta})",
                )
                .unwrap(),
            );
            bar
        }
        None => ProgressBar::new_spinner(),
    };

    // Composer on this thread, workers behind the double-buffers
    let samples_per_line = mode.samples_per_line;
    let result: Result<ExitCode, FeedError> = feed::run_pipeline(
        source,
        feed_cfg,
        overlays,
        Arc::clone(&subtitle_list),
        |pipeline_feed| {
            let mut composer = Composer::new(
                &mode,
                pipeline_feed,
                scrambler,
                teletext,
                composer_options,
            );
            let mut baseband = vec![0.0f64; samples_per_line * 16];
            let mut samples = Vec::new();
            loop {
                if ABORT.load(Ordering::Relaxed) {
                    return Err(FeedError::Aborted);
                }
                if let Some(limit) = duration_frames {
                    if composer.frames_composed() >= limit {
                        return Ok(ExitCode::from(0));
                    }
                }
                let n = match composer.read(&mut baseband) {
                    Ok(n) => n,
                    Err(FeedError::EndOfStream) => return Ok(ExitCode::from(2)),
                    Err(err) => return Err(err),
                };
                modulator.process_into(&baseband[..n], &mut samples);
                if output.write(&samples).is_err() {
                    // Sink failures are fatal: abort the whole pipeline
                    return Err(FeedError::Decode {
                        reason: "sink write failed".to_string(),
                    });
                }
                progress.set_position(composer.frames_composed());
            }
        },
    );

    progress.finish_and_clear();

    match result {
        Ok(code) => {
            let written = match output {
                Output::Raw(sink) => sink.samples_written(),
                Output::Wav(sink) => sink.finalize()?,
            };
            info!("wrote {written} samples");
            Ok(code)
        }
        Err(FeedError::Aborted) => {
            info!("aborted by user");
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            error!("device error: {err}");
            Ok(ExitCode::from(3))
        }
    }
}
