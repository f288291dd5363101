//! Error types for tonelink core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid sample rate: {rate}")]
    InvalidSampleRate { rate: f64 },

    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid filter parameters: {msg}")]
    InvalidFilterParameters { msg: String },

    #[error("FFT error: {msg}")]
    FftError { msg: String },

    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("Samples {start}..{end} were overwritten, oldest available is {oldest}")]
    Overwritten { start: u64, end: u64, oldest: u64 },

    #[error("Samples {start}..{end} not written yet, write position is {written}")]
    NotYetWritten { start: u64, end: u64, written: u64 },
}

/// Result type for tonelink core operations
pub type Result<T> = std::result::Result<T, CoreError>;
