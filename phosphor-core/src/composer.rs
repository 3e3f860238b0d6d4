//! Line composer and field scheduler.
//!
//! A synchronous pull-mode state machine: the sample sink asks for N
//! samples and the composer fills them from its current line buffer,
//! generating the next scanline whenever the buffer runs dry. Resume state
//! is the (line, sample) coordinate plus the absolute sample counter that
//! pins the colour subcarrier phase to line 1 of field 1. All per-line
//! decisions come from the mode descriptor's line-kind table.

use std::sync::Arc;

use log::{debug, info};

use crate::colour::{rgb_to_secam, rgb_to_yuv, split_rgb, ChromaModulator, GammaLut};
use crate::errors::FeedError;
use crate::feed::dbuffer::Tick;
use crate::feed::{Feed, ScaledFrame};
use crate::modes::{ColourSystem, LineKind, ModeDescriptor};
use crate::scramble::Scrambler;
use crate::sound::SoundMixer;
use crate::subtitles::SubtitleList;
use crate::vbi::cc::CaptionEncoder;
use crate::vbi::teletext::TeletextGenerator;
use crate::vbi::wss::WssMode;
use crate::vbi::render_nrz;

/// VBI lines that carry the scrambler's over-air data when one is active.
const SCRAMBLE_DATA_LINE_F1: u32 = 6;

/// Presentation options resolved from the configuration.
pub struct ComposerOptions {
    pub wss: WssMode,
    pub gamma: f64,
    /// Transmit subtitles in-band (teletext page 888 / line 21 captions).
    pub tx_subtitles: bool,
    pub subtitles: Option<Arc<SubtitleList>>,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            wss: WssMode::Auto,
            gamma: 1.0,
            tx_subtitles: false,
            subtitles: None,
        }
    }
}

/// Pre-rendered sync templates, one full line each.
struct SyncShapes {
    normal: Vec<f64>,
    broad_broad: Vec<f64>,
    broad_eq: Vec<f64>,
    eq_broad: Vec<f64>,
    eq_eq: Vec<f64>,
}

impl SyncShapes {
    fn build(mode: &ModeDescriptor) -> Self {
        let len = mode.samples_per_line;
        let half = len / 2;
        let sync = mode.levels.sync;
        let pulse = |buf: &mut Vec<f64>, start: usize, width: usize| {
            for sample in buf.iter_mut().skip(start).take(width) {
                *sample = sync;
            }
        };
        let mut normal = vec![0.0; len];
        pulse(&mut normal, 0, mode.sync_width);

        let mut broad_broad = vec![0.0; len];
        pulse(&mut broad_broad, 0, mode.broad_width);
        pulse(&mut broad_broad, half, mode.broad_width);

        let mut broad_eq = vec![0.0; len];
        pulse(&mut broad_eq, 0, mode.broad_width);
        pulse(&mut broad_eq, half, mode.eq_width);

        let mut eq_broad = vec![0.0; len];
        pulse(&mut eq_broad, 0, mode.eq_width);
        pulse(&mut eq_broad, half, mode.broad_width);

        let mut eq_eq = vec![0.0; len];
        pulse(&mut eq_eq, 0, mode.eq_width);
        pulse(&mut eq_eq, half, mode.eq_width);

        Self {
            normal,
            broad_broad,
            broad_eq,
            eq_broad,
            eq_eq,
        }
    }

    fn template(&self, kind: LineKind) -> &[f64] {
        match kind {
            LineKind::BroadBroad => &self.broad_broad,
            LineKind::BroadEq => &self.broad_eq,
            LineKind::EqBroad => &self.eq_broad,
            LineKind::EqEq => &self.eq_eq,
            _ => &self.normal,
        }
    }
}

pub struct Composer<'a> {
    mode: &'a ModeDescriptor,
    feed: Feed<'a>,
    scrambler: Scrambler,
    chroma: Option<ChromaModulator>,
    sound: SoundMixer,
    teletext: Option<TeletextGenerator>,
    captions: CaptionEncoder,
    options: ComposerOptions,
    gamma: GammaLut,
    shapes: SyncShapes,

    line_buf: Vec<f64>,
    buf_pos: usize,
    buf_filled: bool,

    /// 1-based transmitted line within the frame.
    line: u32,
    frame_index: u64,
    abs_sample: u64,

    frame: Option<ScaledFrame>,
    video_eof: bool,
    audio_eof: bool,
    last_subtitle: Option<String>,
    /// Duobinary data bit state for MAC modes.
    mac_last_bit: u8,
}

impl<'a> Composer<'a> {
    pub fn new(
        mode: &'a ModeDescriptor,
        feed: Feed<'a>,
        scrambler: Scrambler,
        teletext: Option<TeletextGenerator>,
        options: ComposerOptions,
    ) -> Self {
        Self {
            chroma: ChromaModulator::for_mode(mode),
            sound: SoundMixer::new(mode),
            captions: CaptionEncoder::new(),
            gamma: GammaLut::new(options.gamma),
            shapes: SyncShapes::build(mode),
            line_buf: vec![0.0; mode.samples_per_line],
            buf_pos: 0,
            buf_filled: false,
            line: 1,
            frame_index: 0,
            abs_sample: 0,
            frame: None,
            video_eof: false,
            audio_eof: false,
            last_subtitle: None,
            mac_last_bit: 0,
            mode,
            feed,
            scrambler,
            teletext,
            options,
        }
    }

    pub fn frames_composed(&self) -> u64 {
        self.frame_index
    }

    /// Fill `out` with baseband samples. Returns the count written, which
    /// is less than requested only at end of stream.
    pub fn read(&mut self, out: &mut [f64]) -> Result<usize, FeedError> {
        let mut written = 0;
        while written < out.len() {
            if !self.buf_filled || self.buf_pos >= self.line_buf.len() {
                match self.generate_line() {
                    Ok(()) => {}
                    Err(FeedError::EndOfStream) if written > 0 => return Ok(written),
                    Err(err) => return Err(err),
                }
            }
            let available = self.line_buf.len() - self.buf_pos;
            let take = available.min(out.len() - written);
            out[written..written + take]
                .copy_from_slice(&self.line_buf[self.buf_pos..self.buf_pos + take]);
            self.buf_pos += take;
            written += take;
        }
        Ok(written)
    }

    /// Pull the next video and audio frames at a frame boundary.
    fn begin_frame(&mut self) -> Result<(), FeedError> {
        if !self.video_eof {
            match self.feed.video.take() {
                Ok(Tick::Fresh(frame)) => self.frame = Some(frame),
                Ok(Tick::Repeat) => {
                    debug!("frame {} repeats previous picture", self.frame_index);
                }
                Err(FeedError::EndOfStream) => {
                    self.video_eof = true;
                    info!("video stream ended at frame {}", self.frame_index);
                }
                Err(err) => return Err(err),
            }
        }
        if !self.audio_eof {
            match self.feed.audio.take() {
                Ok(Tick::Fresh(block)) => self.sound.load_frame(block),
                Ok(Tick::Repeat) => {}
                Err(FeedError::EndOfStream) => {
                    self.audio_eof = true;
                    self.sound.load_frame(Vec::new());
                    info!("audio stream ended at frame {}", self.frame_index);
                }
                Err(err) => return Err(err),
            }
        }
        if self.video_eof && self.audio_eof {
            return Err(FeedError::EndOfStream);
        }

        self.scrambler.begin_frame();

        // Rolling services: header clock and subtitle propagation
        let fps = self.mode.frame_rate;
        let ms = self.frame_index as i64 * 1000 * fps.den() / fps.num();
        if let Some(teletext) = &mut self.teletext {
            let secs = (ms / 1000) as u32;
            teletext.set_clock(secs / 3600, (secs / 60) % 60, secs % 60);
        }
        if self.options.tx_subtitles {
            if let Some(list) = &self.options.subtitles {
                let current = list.current(ms);
                if current != self.last_subtitle {
                    if let Some(teletext) = &mut self.teletext {
                        teletext.set_subtitle(current.as_deref());
                    }
                    if let Some(text) = &current {
                        self.captions.caption_text(text);
                    }
                    self.last_subtitle = current;
                }
            }
        }
        Ok(())
    }

    fn generate_line(&mut self) -> Result<(), FeedError> {
        if self.line == 1 {
            self.begin_frame()?;
        }

        let kind = self.mode.line_kind(self.line);
        self.scrambler.prepare_line();

        // Sync template first, then the line's payload
        self.line_buf.clear();
        self.line_buf.extend_from_slice(self.shapes.template(kind));

        if let Some(chroma) = &mut self.chroma {
            chroma.begin_line(self.abs_sample);
        }

        match kind {
            LineKind::Active => self.render_active(),
            LineKind::Teletext => {
                if let Some(teletext) = &mut self.teletext {
                    teletext.render_line(self.mode, &mut self.line_buf);
                }
            }
            LineKind::Wss => {
                let wide = self.frame.as_ref().map(|f| f.wide).unwrap_or(false);
                crate::vbi::wss::render_line(self.mode, self.options.wss, wide, &mut self.line_buf);
            }
            LineKind::ClosedCaption => {
                if self.options.tx_subtitles {
                    self.captions.render_line(self.mode, &mut self.line_buf);
                }
            }
            LineKind::Blank => {
                let half = self.mode.lines_per_frame / 2;
                if self.line == SCRAMBLE_DATA_LINE_F1 || self.line == half + SCRAMBLE_DATA_LINE_F1 {
                    if let Some(row) = self.scrambler.vbi_row() {
                        let line_rate = self.mode.line_rate();
                        let num = 444
                            * line_rate.num() as u64
                            * self.mode.sample_rate.den() as u64;
                        let den = line_rate.den() as u64 * self.mode.sample_rate.num() as u64;
                        render_nrz(
                            &row,
                            self.mode.active_start,
                            num,
                            den,
                            0.66 * self.mode.levels.white,
                            &mut self.line_buf,
                        );
                    }
                }
            }
            _ => {}
        }

        // MAC modes carry their sound in the per-line duobinary burst
        if self.mode.mac.is_some() {
            self.render_mac_burst();
        } else if self.sound.has_carriers() {
            for sample in self.line_buf.iter_mut() {
                *sample += self.sound.next_sample();
            }
        }

        self.abs_sample += self.mode.samples_per_line as u64;
        self.line += 1;
        if self.line > self.mode.lines_per_frame {
            self.line = 1;
            self.frame_index += 1;
        }
        self.buf_pos = 0;
        self.buf_filled = true;
        Ok(())
    }

    /// Project the frame row into sample space, encode colour, scramble.
    fn render_active(&mut self) {
        let Some(default_row) = self.mode.frame_row(self.line) else {
            return;
        };
        let half = self.mode.lines_per_frame / 2;
        let parity = if self.line > half { 1 } else { 0 };
        let slot = (default_row - parity) / 2;
        let row_index = self.scrambler.video_row(slot, default_row, parity);

        let active_start = self.mode.active_start;
        let active_width = self.mode.active_width;
        let black = self.mode.levels.black;
        let white = self.mode.levels.white;
        let video_gain = white - black;

        let frame = self.frame.as_ref();
        let row = frame.and_then(|f| {
            let row_index = row_index.min(f.height.saturating_sub(1));
            f.data.get(row_index * f.width..(row_index + 1) * f.width)
        });

        // Burst window rides on the back porch
        if let Some(chroma) = &mut self.chroma {
            chroma.begin_line(self.abs_sample + self.mode.burst_start as u64);
            for i in 0..self.mode.burst_width {
                let idx = self.mode.burst_start + i;
                if let Some(sample) =
                    chroma.burst_sample(self.line, self.mode.levels.burst_amplitude)
                {
                    self.line_buf[idx] += sample;
                }
            }
            chroma.begin_line(self.abs_sample + active_start as u64);
        }

        let v_switch = ChromaModulator::v_switch(self.line);
        for i in 0..active_width {
            let idx = active_start + i;
            let level = match row {
                Some(pixels) => {
                    // Linear interpolation from pixel space to sample space
                    let pos = i as f64 * (pixels.len() - 1) as f64 / (active_width - 1) as f64;
                    let p0 = pos as usize;
                    let p1 = (p0 + 1).min(pixels.len() - 1);
                    let frac = pos - p0 as f64;
                    let (r0, g0, b0) = split_rgb(pixels[p0], &self.gamma);
                    let (r1, g1, b1) = split_rgb(pixels[p1], &self.gamma);
                    let r = r0 + (r1 - r0) * frac;
                    let g = g0 + (g1 - g0) * frac;
                    let b = b0 + (b1 - b0) * frac;
                    match self.mode.colour {
                        ColourSystem::Pal | ColourSystem::Ntsc => {
                            let (y, u, v) = rgb_to_yuv(r, g, b);
                            let v = if self.mode.colour == ColourSystem::Pal {
                                v * v_switch
                            } else {
                                v
                            };
                            let chroma_sample = self
                                .chroma
                                .as_mut()
                                .map(|c| c.active_sample(self.line, u, v))
                                .unwrap_or(0.0);
                            black + video_gain * (y + chroma_sample)
                        }
                        ColourSystem::Secam => {
                            let (dr, db) = rgb_to_secam(r, g, b);
                            let y = 0.299 * r + 0.587 * g + 0.114 * b;
                            let chroma_sample = self
                                .chroma
                                .as_mut()
                                .map(|c| c.active_sample(self.line, dr, db))
                                .unwrap_or(0.0);
                            black + video_gain * y + chroma_sample
                        }
                        ColourSystem::None => {
                            let y = 0.299 * r + 0.587 * g + 0.114 * b;
                            black + video_gain * y
                        }
                    }
                }
                None => black,
            };
            self.line_buf[idx] = level;
        }

        let active = active_start..active_start + active_width;
        self.scrambler
            .apply(&mut self.line_buf, active, self.line as usize);
    }

    /// Duobinary data burst at the head of a MAC line: three-level coding
    /// of the companded programme bits.
    fn render_mac_burst(&mut self) {
        let Some(mac) = self.mode.mac else { return };
        let rate = self.mode.sample_rate.as_f64();
        let samples_per_bit = (rate / mac.data_rate).max(1.0);
        let burst_samples =
            ((mac.bits_per_line as f64 * samples_per_bit).round() as usize).min(self.mode.active_start);
        let mut bit_acc = 0.0f64;
        let mut bit_index = 0usize;
        let mut level = 0.0f64;
        for i in 0..burst_samples {
            if bit_acc <= i as f64 {
                // Programme-derived bit stream keeps the burst busy even in
                // silence; duobinary maps bit transitions onto -1/0/+1
                let bit = (self.sound_bit(bit_index) + self.mac_last_bit) & 1;
                level = match bit + self.mac_last_bit {
                    0 => -0.4,
                    1 => 0.0,
                    _ => 0.4,
                };
                self.mac_last_bit = bit;
                bit_index += 1;
                bit_acc += samples_per_bit;
            }
            self.line_buf[i] = 0.5 + level;
        }
    }

    /// One programme-derived bit for the MAC data burst: the companded
    /// left sample walked bit by bit.
    fn sound_bit(&mut self, index: usize) -> u8 {
        let (left, _) = self.sound.next_programme();
        let quantized = (left * 8191.0) as i64 as u64;
        ((quantized >> (index % 14)) & 1) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::dbuffer::DoubleBuffer;
    use crate::modes::ModeId;
    use crate::rational::Rational;

    fn pal() -> ModeDescriptor {
        ModeDescriptor::new(ModeId::PalI, Rational::integer(20_250_000)).unwrap()
    }

    fn white_frame(mode: &ModeDescriptor) -> ScaledFrame {
        let (w, h) = mode.raster_size();
        ScaledFrame {
            width: w,
            height: h,
            data: vec![0x00FFFFFF; w * h],
            wide: false,
        }
    }

    fn feed_with_frames(
        mode: &ModeDescriptor,
        video: &DoubleBuffer<ScaledFrame>,
        audio: &DoubleBuffer<Vec<(f32, f32)>>,
        frames: usize,
    ) {
        for _ in 0..frames {
            video.put_fresh(white_frame(mode)).unwrap();
            audio
                .put_fresh(vec![(0.0, 0.0); mode.audio_samples_per_frame()])
                .unwrap();
        }
        video.finish();
        audio.finish();
    }

    #[test]
    fn test_sync_tips_align_to_line_boundaries() {
        let mode = pal();
        let video = DoubleBuffer::new();
        let audio = DoubleBuffer::new();
        feed_with_frames(&mode, &video, &audio, 1);
        let mut composer = Composer::new(
            &mode,
            Feed {
                video: &video,
                audio: &audio,
            },
            Scrambler::None,
            None,
            ComposerOptions::default(),
        );
        let mut out = vec![0.0; mode.samples_per_line * 8];
        let n = composer.read(&mut out).unwrap();
        assert_eq!(n, out.len());
        // Every early line begins with a sync pulse; averaging over the
        // shortest pulse width cancels the sound-carrier ripple
        for line in 0..8 {
            let start = line * mode.samples_per_line;
            let mean: f64 =
                out[start..start + 40].iter().sum::<f64>() / 40.0;
            assert!(mean < -0.25, "line {line} starts at mean {mean}");
        }
    }

    #[test]
    fn test_active_line_reaches_white() {
        let mode = pal();
        let video = DoubleBuffer::new();
        let audio = DoubleBuffer::new();
        feed_with_frames(&mode, &video, &audio, 1);
        let mut composer = Composer::new(
            &mode,
            Feed {
                video: &video,
                audio: &audio,
            },
            Scrambler::None,
            None,
            ComposerOptions::default(),
        );
        // Skip to line 30 (active) and inspect its active region
        let skip = mode.samples_per_line * 29;
        let mut out = vec![0.0; skip + mode.samples_per_line];
        composer.read(&mut out).unwrap();
        let line = &out[skip..];
        let active = &line[mode.active_start..mode.active_start + mode.active_width];
        let mean: f64 = active.iter().sum::<f64>() / active.len() as f64;
        assert!(mean > 0.85, "active region should be near white, mean {mean}");
    }

    #[test]
    fn test_partial_reads_preserve_stream() {
        let mode = pal();
        let video = DoubleBuffer::new();
        let audio = DoubleBuffer::new();
        feed_with_frames(&mode, &video, &audio, 1);
        let mut composer = Composer::new(
            &mode,
            Feed {
                video: &video,
                audio: &audio,
            },
            Scrambler::None,
            None,
            ComposerOptions::default(),
        );
        // Read in awkward chunk sizes across line boundaries
        let mut a = vec![0.0; 1000];
        let mut b = vec![0.0; 592];
        composer.read(&mut a).unwrap();
        composer.read(&mut b).unwrap();
        // 1592 samples consumed: we are 296 samples into line 2
        let mut rest = vec![0.0; mode.samples_per_line - 296];
        composer.read(&mut rest).unwrap();
        // Next read starts exactly at a line boundary: sync level
        let mut next = vec![0.0; 40];
        composer.read(&mut next).unwrap();
        let mean: f64 = next.iter().sum::<f64>() / next.len() as f64;
        assert!(mean < -0.25, "expected sync pulse, mean {mean}");
    }

    #[test]
    fn test_end_of_stream_after_last_frame() {
        let mode = pal();
        let video = DoubleBuffer::new();
        let audio = DoubleBuffer::new();
        feed_with_frames(&mode, &video, &audio, 2);
        let mut composer = Composer::new(
            &mode,
            Feed {
                video: &video,
                audio: &audio,
            },
            Scrambler::None,
            None,
            ComposerOptions::default(),
        );
        let mut out = vec![0.0; mode.samples_per_frame as usize * 2];
        assert_eq!(composer.read(&mut out).unwrap(), out.len());
        let mut more = vec![0.0; 16];
        assert_eq!(composer.read(&mut more), Err(FeedError::EndOfStream));
        assert_eq!(composer.frames_composed(), 2);
    }

    #[test]
    fn test_scrambled_frame_differs_from_clear() {
        let mode = pal();
        let render = |scrambler: Scrambler| {
            let video = DoubleBuffer::new();
            let audio = DoubleBuffer::new();
            // A frame with a horizontal gradient so rotation is visible
            let (w, h) = mode.raster_size();
            let mut data = vec![0u32; w * h];
            for (i, px) in data.iter_mut().enumerate() {
                let x = (i % w) as u32;
                let v = (x * 255 / w as u32) & 0xFF;
                *px = v << 16 | v << 8 | v;
            }
            video
                .put_fresh(ScaledFrame {
                    width: w,
                    height: h,
                    data,
                    wide: false,
                })
                .unwrap();
            audio
                .put_fresh(vec![(0.0, 0.0); mode.audio_samples_per_frame()])
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
            let mut out = vec![0.0; mode.samples_per_frame as usize];
            composer.read(&mut out).unwrap();
            out
        };
        let clear = render(Scrambler::None);
        let scrambled = render(Scrambler::parse("vc-sky-07", 20_250_000.0, 1).unwrap());
        assert_ne!(clear, scrambled);
    }
}
