//! End-to-end synthesis tests: the bars-and-tone source through the feed
//! pipeline, composer, and modulator, checked against the numbers the
//! broadcast standards pin down.

use std::sync::Arc;

use phosphor_core::composer::{Composer, ComposerOptions};
use phosphor_core::errors::FeedError;
use phosphor_core::feed::{self, pattern};
use phosphor_core::modes::{ModeDescriptor, ModeId};
use phosphor_core::modulator::IqModulator;
use phosphor_core::overlay::OverlayStack;
use phosphor_core::rational::Rational;
use phosphor_core::scramble::Scrambler;
use phosphor_core::subtitles::SubtitleList;
use phosphor_core::vbi::teletext::{hamming_8_4_valid, TeletextGenerator};

const PAL_RATE: i64 = 20_250_000;

fn pal_mode() -> ModeDescriptor {
    ModeDescriptor::new(ModeId::PalI, Rational::integer(PAL_RATE)).unwrap()
}

/// Render `frames` full frames of bars through the real pipeline.
fn render_frames(mode: &ModeDescriptor, frames: u64, scrambler: Scrambler) -> Vec<f64> {
    let (w, h) = mode.raster_size();
    let source = pattern::bars_and_tone(w, h, mode.frame_rate, Some(frames));
    let cfg = phosphor_core::TvConfig {
        sample_rate: PAL_RATE,
        ..Default::default()
    }
    .feed_config(mode);
    feed::run_pipeline(
        source,
        cfg,
        OverlayStack::disabled(),
        Arc::new(SubtitleList::new()),
        |pipeline| {
            let mut composer = Composer::new(
                mode,
                pipeline,
                scrambler,
                None,
                ComposerOptions::default(),
            );
            let mut out = Vec::new();
            let mut chunk = vec![0.0f64; mode.samples_per_line * 8];
            loop {
                match composer.read(&mut chunk) {
                    Ok(n) => {
                        out.extend_from_slice(&chunk[..n]);
                        if n < chunk.len() {
                            break;
                        }
                    }
                    Err(FeedError::EndOfStream) => break,
                    Err(err) => panic!("pipeline error: {err}"),
                }
            }
            out
        },
    )
}

#[test]
fn test_sample_count_is_exact_for_two_frames() {
    let mode = pal_mode();
    let samples = render_frames(&mode, 2, Scrambler::None);
    // 810000 samples per frame at 20.25 MHz / 25 fps, bit exact
    assert_eq!(samples.len() as u64, 2 * mode.samples_per_frame);
    assert_eq!(mode.samples_per_frame * 25, PAL_RATE as u64);
}

#[test]
fn test_sync_tips_at_line_boundaries_across_frame() {
    let mode = pal_mode();
    let samples = render_frames(&mode, 1, Scrambler::None);
    // Field sync and every normal line start with a pulse at sync level;
    // averaging over the pulse cancels sound-carrier ripple
    for line in [0usize, 1, 6, 100, 320, 624] {
        let start = line * mode.samples_per_line;
        let mean: f64 = samples[start..start + 40].iter().sum::<f64>() / 40.0;
        assert!(
            mean < -0.25,
            "line {line} should start with sync, mean {mean}"
        );
    }
}

#[test]
fn test_spectrum_carries_chroma_and_sound() {
    let mode = pal_mode();
    let samples = render_frames(&mode, 1, Scrambler::None);

    // FFT a window well inside field 1's active region
    let n = 65_536usize;
    let offset = 100 * mode.samples_per_line;
    let mut planner = rustfft::FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buf: Vec<rustfft::num_complex::Complex<f64>> = samples[offset..offset + n]
        .iter()
        .map(|&x| rustfft::num_complex::Complex::new(x, 0.0))
        .collect();
    fft.process(&mut buf);

    let band_energy = |centre_hz: f64| {
        let bin = (centre_hz * n as f64 / PAL_RATE as f64).round() as usize;
        buf[bin - 40..bin + 40].iter().map(|c| c.norm_sqr()).sum::<f64>()
    };

    // Colour subcarrier on 75% bars dwarfs a quiet part of the spectrum
    let chroma = band_energy(4_433_618.75);
    let quiet = band_energy(3_300_000.0);
    assert!(
        chroma > quiet * 5.0,
        "chroma {chroma:.1} should exceed quiet band {quiet:.1}"
    );

    // 6.0 MHz FM sound carrier present; 5.5 MHz carries nothing in System I
    let sound = band_energy(6_000_000.0);
    let between = band_energy(5_500_000.0);
    assert!(
        sound > between * 5.0,
        "sound carrier {sound:.1} vs gap {between:.1}"
    );
}

#[test]
fn test_videocrypt_rotates_active_video_only() {
    let mode = pal_mode();
    let clear = render_frames(&mode, 1, Scrambler::None);
    let scrambled = render_frames(
        &mode,
        1,
        Scrambler::parse("vc-sky-07", PAL_RATE as f64, 7).unwrap(),
    );
    assert_eq!(clear.len(), scrambled.len());

    // Line 100 is active: its sync region matches, its active region is a
    // rotation of the clear line
    let start = 99 * mode.samples_per_line;
    let clear_line = &clear[start..start + mode.samples_per_line];
    let scrambled_line = &scrambled[start..start + mode.samples_per_line];
    assert_eq!(
        &clear_line[..mode.sync_width],
        &scrambled_line[..mode.sync_width],
        "sync must not be scrambled"
    );
    let active = mode.active_start..mode.active_start + mode.active_width;
    assert_ne!(&clear_line[active.clone()], &scrambled_line[active]);
}

#[test]
fn test_ntsc_frame_geometry() {
    let mode = ModeDescriptor::new(ModeId::NtscM, Rational::integer(13_500_000)).unwrap();
    let samples = render_frames(&mode, 1, Scrambler::None);
    assert_eq!(samples.len(), 858 * 525);
}

#[test]
fn test_teletext_packets_protected() {
    let mut generator = TeletextGenerator::new();
    generator.set_subtitle(Some("HELLO WORLD"));
    for _ in 0..8 {
        let packet = generator.next_packet();
        // Clock run-in and framing code fixed
        assert_eq!(packet[0], 0x55);
        assert_eq!(packet[1], 0x55);
        assert_eq!(packet[2], 0x27);
        // Magazine/row address always Hamming protected
        assert!(hamming_8_4_valid(packet[3]), "byte 3 = {:02X}", packet[3]);
        assert!(hamming_8_4_valid(packet[4]), "byte 4 = {:02X}", packet[4]);
    }
}

#[test]
fn test_modulated_output_is_interleaved_iq() {
    let mode = pal_mode();
    let samples = render_frames(&mode, 1, Scrambler::None);
    let mut modulator = IqModulator::new(&mode, 4_000_000.0, 0.0);
    let mut out = Vec::new();
    modulator.process_into(&samples[..mode.samples_per_line], &mut out);
    assert_eq!(out.len(), mode.samples_per_line * 2);
    // The carrier keeps the output alive even over blanking
    assert!(out.iter().any(|&s| s != 0));
}

#[test]
fn test_syster_permutes_vertically_varying_picture() {
    use phosphor_core::feed::dbuffer::DoubleBuffer;
    use phosphor_core::feed::{Feed, ScaledFrame};

    let mode = pal_mode();
    let (w, h) = mode.raster_size();
    // Vertical gradient so a line permutation is visible
    let mut data = vec![0u32; w * h];
    for (i, px) in data.iter_mut().enumerate() {
        let v = ((i / w) * 255 / h) as u32;
        *px = (v << 16) | (v << 8) | v;
    }

    let render = |scrambler: Scrambler| {
        let video = DoubleBuffer::new();
        let audio = DoubleBuffer::new();
        video
            .put_fresh(ScaledFrame {
                width: w,
                height: h,
                data: data.clone(),
                wide: false,
            })
            .unwrap();
        audio
            .put_fresh(vec![(0.0f32, 0.0f32); mode.audio_samples_per_frame()])
            .unwrap();
        video.finish();
        audio.finish();
        let mut composer = Composer::new(
            &mode,
            Feed {
                video: &video,
                audio: &audio,
            },
            scrambler,
            None,
            ComposerOptions::default(),
        );
        let mut out = vec![0.0f64; mode.samples_per_frame as usize];
        composer.read(&mut out).unwrap();
        out
    };

    let clear = render(Scrambler::None);
    let scrambled = render(Scrambler::parse("syster", PAL_RATE as f64, 5).unwrap());
    assert_ne!(clear, scrambled, "field should be permuted");

    // Sync structure survives: line starts still show pulses
    for line in [0usize, 100, 400] {
        let start = line * mode.samples_per_line;
        let mean: f64 = scrambled[start..start + 40].iter().sum::<f64>() / 40.0;
        assert!(mean < -0.25);
    }
}
