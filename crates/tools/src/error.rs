//! Error types for the tonelink tools

use thiserror::Error;
use tonelink_frame::FrameError;
use tonelink_modem::ModemError;

/// Why a batch decode produced no payload
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("No start of transmission found")]
    NoStartMarker,

    #[error("Packet error: {0}")]
    Frame(#[from] FrameError),

    #[error("Demodulation error: {0}")]
    Modem(#[from] ModemError),
}

impl ReceiveError {
    /// More audio could still complete the packet
    pub fn is_incomplete(&self) -> bool {
        match self {
            ReceiveError::Frame(e) => e.is_incomplete(),
            ReceiveError::NoStartMarker => true,
            ReceiveError::Modem(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("Packet error: {0}")]
    Frame(#[from] FrameError),

    #[error("Modulation error: {0}")]
    Modem(#[from] ModemError),
}

/// Startup validation failure of a [`crate::config::Profile`]
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("{0}")]
    Modem(#[from] ModemError),

    #[error("{0}")]
    Frame(#[from] FrameError),

    #[error("Invalid stream settings: {msg}")]
    Stream { msg: String },
}
