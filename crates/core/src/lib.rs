//! tonelink core - DSP primitives
//!
//! Filters, windowed-sinc design, real FFT spectrum analysis and the
//! capture ring buffer shared by the tonelink modulator and demodulators.

pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;

pub use error::{CoreError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        buffer::{RingBuffer, to_f64_samples, to_i16_samples},
        error::{CoreError, Result},
        fft::SpectrumAnalyzer,
        filter::{convolve_same, Filter, FirFilter, IirFilter, WindowKind},
    };
}
