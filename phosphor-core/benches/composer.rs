//! Line-composition throughput: frames per second the composer can
//! synthesize from a static picture, with and without scrambling.

use criterion::{criterion_group, criterion_main, Criterion};

use phosphor_core::composer::{Composer, ComposerOptions};
use phosphor_core::feed::dbuffer::DoubleBuffer;
use phosphor_core::feed::{Feed, ScaledFrame};
use phosphor_core::modes::{ModeDescriptor, ModeId};
use phosphor_core::rational::Rational;
use phosphor_core::scramble::Scrambler;

fn compose_one_frame(mode: &ModeDescriptor, scrambler: Scrambler) -> Vec<f64> {
    let (w, h) = mode.raster_size();
    let video = DoubleBuffer::new();
    let audio = DoubleBuffer::new();
    video
        .put_fresh(ScaledFrame {
            width: w,
            height: h,
            data: vec![0x00A0A0A0; w * h],
            wide: false,
        })
        .unwrap();
    audio
        .put_fresh(vec![(0.1f32, -0.1f32); mode.audio_samples_per_frame()])
        .unwrap();
    video.finish();
    audio.finish();
    let mut composer = Composer::new(
        mode,
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
}

fn bench_composer(c: &mut Criterion) {
    let mode = ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap();

    c.bench_function("pal_i_frame_clear", |b| {
        b.iter(|| compose_one_frame(&mode, Scrambler::None))
    });

    c.bench_function("pal_i_frame_videocrypt", |b| {
        b.iter(|| {
            compose_one_frame(
                &mode,
                Scrambler::parse("vc-sky-07", 20_250_000.0, 1).unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_composer);
criterion_main!(benches);
