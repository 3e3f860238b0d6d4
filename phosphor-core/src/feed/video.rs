//! Video side of the feed pipeline: the decode consumer, the PTS
//! time-align policy, and the raster scaler.

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::errors::FeedError;
use crate::feed::dbuffer::{DoubleBuffer, Tick};
use crate::feed::queue::PacketQueue;
use crate::feed::{FeedConfig, ScaledFrame, VideoDecoder, VideoFrame};
use crate::overlay::OverlayStack;
use crate::rational::Rational;

/// What the time-align policy decides for one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignAction {
    /// Frame arrived behind schedule; discard it.
    Drop,
    /// Emit `repeats` repeat ticks, then this frame.
    Emit { repeats: u32 },
}

/// Keeps the composer fed with exactly one frame per mode period, fresh or
/// repeated. `start_time` counts consumed frame periods; a positive start
/// value implements the position/seek knob by dropping early frames.
pub struct TimeAligner {
    frame_rate: Rational,
    start_time: i64,
    last_pts: Option<i64>,
}

impl TimeAligner {
    pub fn new(frame_rate: Rational, start_offset: i64) -> Self {
        Self {
            frame_rate,
            start_time: start_offset,
            last_pts: None,
        }
    }

    /// Frame tick for a PTS, truncating: a frame belongs to the period it
    /// starts in.
    fn tick_of(&self, pts: i64, time_base: Rational) -> i64 {
        // pts * time_base * frame_rate, floored
        let num = pts as i128
            * time_base.num() as i128
            * self.frame_rate.num() as i128;
        let den = time_base.den() as i128 * self.frame_rate.den() as i128;
        num.div_euclid(den) as i64
    }

    /// Decide for one frame; unknown timestamps inherit `last + 1`.
    pub fn align(&mut self, pts: Option<i64>, time_base: Rational) -> AlignAction {
        let tick = match pts {
            Some(pts) => self.tick_of(pts, time_base),
            None => self.last_pts.map(|t| t + 1).unwrap_or(self.start_time),
        };
        self.last_pts = Some(tick);
        let delta = tick - self.start_time;
        if delta < 0 {
            debug!("time-align: dropping frame at tick {tick} (expected {})", self.start_time);
            return AlignAction::Drop;
        }
        self.start_time = tick + 1;
        AlignAction::Emit {
            repeats: delta as u32,
        }
    }
}

/// Decoder consumer: pops packets, pushes decoded frames downstream.
pub fn run_video_decoder(
    queue: &PacketQueue,
    mut decoder: Box<dyn VideoDecoder>,
    decoded: &DoubleBuffer<VideoFrame>,
) {
    loop {
        let packet = match queue.pop() {
            Ok(packet) => packet,
            Err(FeedError::EndOfStream) => break,
            Err(_) => return,
        };
        match decoder.decode(&packet) {
            Ok(frames) => {
                for frame in frames {
                    if decoded.put_fresh(frame).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                // Soft EOF for this stream; the other stream continues
                warn!("video decode failed, ending stream: {err}");
                break;
            }
        }
    }
    decoded.finish();
    info!("video decoder drained");
}

/// Scaler consumer: time-aligns, rescales to the mode raster, composites
/// overlays, and feeds the composer's double-buffer.
pub fn run_video_scaler(
    decoded: &DoubleBuffer<VideoFrame>,
    scaled: &DoubleBuffer<ScaledFrame>,
    cfg: &FeedConfig,
    overlays: &OverlayStack,
) {
    let mut aligner = TimeAligner::new(cfg.frame_rate, cfg.start_offset_frames);
    let mut frame_index: i64 = 0;
    loop {
        let frame = match decoded.take() {
            Ok(Tick::Fresh(frame)) => frame,
            Ok(Tick::Repeat) => continue,
            Err(FeedError::EndOfStream) => break,
            Err(_) => return,
        };
        let repeats = match aligner.align(frame.pts, frame.time_base) {
            AlignAction::Drop => continue,
            AlignAction::Emit { repeats } => repeats,
        };
        for _ in 0..repeats {
            if scaled.put_repeat().is_err() {
                return;
            }
            frame_index += 1;
        }
        let mut out = scale_frame(&frame, cfg);
        if !overlays.is_empty() {
            overlays.composite(
                &mut out.data,
                out.width,
                out.height,
                frame_index,
                cfg.frame_rate,
            );
        }
        if scaled.put_fresh(out).is_err() {
            return;
        }
        frame_index += 1;
    }
    scaled.finish();
    info!("video scaler drained");
}

/// Bilinear rescale into the mode raster, honouring letterbox/pillarbox.
pub fn scale_frame(frame: &VideoFrame, cfg: &FeedConfig) -> ScaledFrame {
    let (dst_w, dst_h) = (cfg.raster_width, cfg.raster_height);
    let mut data = vec![0u32; dst_w * dst_h];

    // Display aspect of the source against the 4:3 target raster
    let source_dar =
        frame.width as f64 * frame.pixel_aspect.as_f64() / frame.height.max(1) as f64;
    let wide = source_dar > 1.55;

    // Active window inside the raster
    let (win_w, win_h, x0, y0) = if cfg.letterbox && wide {
        let h = (dst_h as f64 * (4.0 / 3.0) / source_dar).round() as usize;
        (dst_w, h.min(dst_h), 0, (dst_h - h.min(dst_h)) / 2)
    } else if cfg.pillarbox && source_dar < 1.30 {
        let w = (dst_w as f64 * source_dar / (4.0 / 3.0)).round() as usize;
        (w.min(dst_w), dst_h, (dst_w - w.min(dst_w)) / 2, 0)
    } else {
        (dst_w, dst_h, 0, 0)
    };

    let x_step = frame.width as f64 / win_w as f64;
    let y_step = frame.height as f64 / win_h as f64;

    data.par_chunks_mut(dst_w)
        .enumerate()
        .for_each(|(dy, row)| {
            if dy < y0 || dy >= y0 + win_h {
                return;
            }
            let sy = (dy - y0) as f64 * y_step;
            let sy0 = (sy as usize).min(frame.height - 1);
            let sy1 = (sy0 + 1).min(frame.height - 1);
            let fy = sy - sy0 as f64;
            for (dx, pixel) in row.iter_mut().enumerate().skip(x0).take(win_w) {
                let sx = (dx - x0) as f64 * x_step;
                let sx0 = (sx as usize).min(frame.width - 1);
                let sx1 = (sx0 + 1).min(frame.width - 1);
                let fx = sx - sx0 as f64;
                *pixel = bilinear(
                    frame.data[sy0 * frame.width + sx0],
                    frame.data[sy0 * frame.width + sx1],
                    frame.data[sy1 * frame.width + sx0],
                    frame.data[sy1 * frame.width + sx1],
                    fx,
                    fy,
                );
            }
        });

    ScaledFrame {
        width: dst_w,
        height: dst_h,
        data,
        wide,
    }
}

#[inline]
fn bilinear(p00: u32, p01: u32, p10: u32, p11: u32, fx: f64, fy: f64) -> u32 {
    let mix = |shift: u32| {
        let c00 = ((p00 >> shift) & 0xFF) as f64;
        let c01 = ((p01 >> shift) & 0xFF) as f64;
        let c10 = ((p10 >> shift) & 0xFF) as f64;
        let c11 = ((p11 >> shift) & 0xFF) as f64;
        let top = c00 + (c01 - c00) * fx;
        let bottom = c10 + (c11 - c10) * fx;
        ((top + (bottom - top) * fy).round() as u32).min(255) << shift
    };
    mix(16) | mix(8) | mix(0)
}
