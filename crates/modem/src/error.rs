//! Error types for tonelink modem

use thiserror::Error;

/// Modem error types
#[derive(Error, Debug)]
pub enum ModemError {
    #[error("Invalid modem configuration: {msg}")]
    Configuration { msg: String },

    #[error("Tone {tone} outside 0..{limit}")]
    InvalidTone { tone: i32, limit: u32 },

    #[error("Synchronization failed: {msg}")]
    Synchronization { msg: String },

    #[error("Core error: {0}")]
    Core(#[from] tonelink_core::CoreError),
}

/// Result type for tonelink modem operations
pub type Result<T> = std::result::Result<T, ModemError>;

pub(crate) fn config_error(msg: impl Into<String>) -> ModemError {
    ModemError::Configuration { msg: msg.into() }
}
