//! Error types for tonelink framing

use thiserror::Error;

/// Packet framing error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Packet incomplete: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Packet claims {size} payload bytes, maximum is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Checksum mismatch: header says {expected:#06x}, payload has {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Decompression failed: {msg}")]
    Decompression { msg: String },

    #[error("Compression failed: {msg}")]
    Compression { msg: String },

    #[error("Payload of {size} bytes exceeds maximum packet size {max}")]
    PayloadTooLong { size: usize, max: usize },

    #[error("Invalid packet configuration: {msg}")]
    InvalidConfig { msg: String },
}

impl FrameError {
    /// More audio may complete the packet; keep the buffered data.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::Incomplete { .. })
    }

    /// The buffered data can never form a valid packet and should be dropped.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            FrameError::TooLarge { .. }
                | FrameError::ChecksumMismatch { .. }
                | FrameError::Decompression { .. }
        )
    }
}

/// Result type for tonelink framing operations
pub type Result<T> = std::result::Result<T, FrameError>;
