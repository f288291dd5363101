//! tonelink frame - packet layer
//!
//! Length-prefixed packets protected by a CRC-16, with optional trimmed
//! gzip compression of the payload. Receivers classify failures as
//! incomplete (wait for more audio) or corrupt (drop what was received).

pub mod compress;
pub mod crc;
pub mod error;
pub mod packet;

pub use error::{FrameError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        crc::crc16,
        error::{FrameError, Result},
        packet::{PacketCodec, PacketConfig, PacketHeader},
    };
}
