//! Shared DSP primitives for the synthesis path.

pub mod fir;
pub mod nco;

pub use fir::{Fir, HilbertTransformer, PolyphaseResampler};
pub use nco::{ComplexNco, Nco};
