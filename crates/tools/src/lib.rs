//! Tonelink tools library
//!
//! Transmitter, batch receiver, streaming receiver and the pieces the
//! command line binaries share.

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod listen;
pub mod rx;
pub mod stream;
pub mod tx;

pub use config::{Profile, ProfileSummary, StreamConfig, TransmitConfig};
pub use error::{ProfileError, ReceiveError, TransmitError};
pub use listen::{listen, ListenOptions, ListenReport};
pub use rx::Receiver;
pub use stream::{ReceiverState, StreamEvent, StreamProcessor};
pub use tx::Transmitter;
