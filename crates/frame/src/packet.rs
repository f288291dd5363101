//! Packet framing: `[u16 length BE][u16 CRC-16 BE][payload]`

use crate::{compress, crc::crc16, FrameError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed packet header in front of every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length in bytes, after optional compression
    pub payload_length: u16,
    /// CRC-16 of the (possibly compressed) payload
    pub checksum: u16,
}

impl PacketHeader {
    /// Size of the packet header in bytes
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let len = self.payload_length.to_be_bytes();
        let crc = self.checksum.to_be_bytes();
        [len[0], len[1], crc[0], crc[1]]
    }

    /// Parse a header from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(FrameError::Incomplete {
                needed: Self::SIZE,
                available: bytes.len(),
            });
        }

        Ok(Self {
            payload_length: u16::from_be_bytes([bytes[0], bytes[1]]),
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Packet layer settings shared by transmitter and receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketConfig {
    /// Compress payloads with trimmed gzip
    pub compress: bool,
    /// Largest payload, after compression, a receiver will accept
    pub max_packet_size: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            compress: false,
            max_packet_size: 4096,
        }
    }
}

impl PacketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size == 0 || self.max_packet_size > u16::MAX as usize {
            return Err(FrameError::InvalidConfig {
                msg: format!(
                    "max_packet_size must be in 1..={}, got {}",
                    u16::MAX,
                    self.max_packet_size
                ),
            });
        }
        Ok(())
    }
}

/// Builds and parses packets
#[derive(Debug, Clone)]
pub struct PacketCodec {
    config: PacketConfig,
}

impl PacketCodec {
    pub fn new(config: PacketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    /// Frame `data` for transmission, compressing first if configured.
    pub fn pack(&self, data: &[u8]) -> Result<Vec<u8>> {
        let payload = if self.config.compress {
            let compressed = compress::compress(data)?;
            debug!(original = data.len(), compressed = compressed.len(), "compressed payload");
            compressed
        } else {
            data.to_vec()
        };

        if payload.len() > self.config.max_packet_size {
            return Err(FrameError::PayloadTooLong {
                size: payload.len(),
                max: self.config.max_packet_size,
            });
        }

        let header = PacketHeader {
            payload_length: payload.len() as u16,
            checksum: crc16(&payload),
        };

        let mut packet = Vec::with_capacity(PacketHeader::SIZE + payload.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(&payload);
        Ok(packet)
    }

    /// Payload length announced by the header, checked against the maximum.
    /// Needs only the header bytes.
    pub fn get_size(&self, data: &[u8]) -> Result<usize> {
        let header = PacketHeader::from_bytes(data)?;
        let size = header.payload_length as usize;
        if size > self.config.max_packet_size {
            return Err(FrameError::TooLarge {
                size,
                max: self.config.max_packet_size,
            });
        }
        Ok(size)
    }

    /// Recover the payload from a received byte stream.
    ///
    /// Bytes beyond the announced length are ignored.
    pub fn unpack(&self, data: &[u8]) -> Result<Vec<u8>> {
        let header = PacketHeader::from_bytes(data)?;
        let size = self.get_size(data)?;

        let body = &data[PacketHeader::SIZE..];
        if body.len() < size {
            return Err(FrameError::Incomplete {
                needed: PacketHeader::SIZE + size,
                available: data.len(),
            });
        }
        let payload = &body[..size];

        let actual = crc16(payload);
        if actual != header.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        if self.config.compress {
            compress::decompress(payload)
        } else {
            Ok(payload.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn codec(compress: bool) -> PacketCodec {
        PacketCodec::new(PacketConfig {
            compress,
            ..PacketConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_header_layout() {
        let packet = codec(false).pack(b"test 123").unwrap();
        assert_eq!(&packet[..2], &[0x00, 0x08]);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), crc16(b"test 123"));
        assert_eq!(&packet[4..], b"test 123");
    }

    #[test]
    fn test_empty_payload() {
        let codec = codec(false);
        let packet = codec.pack(b"").unwrap();
        assert_eq!(packet.len(), PacketHeader::SIZE);
        assert_eq!(codec.unpack(&packet).unwrap(), b"");
    }

    #[test]
    fn test_payload_too_long() {
        let codec = PacketCodec::new(PacketConfig {
            compress: false,
            max_packet_size: 16,
        })
        .unwrap();
        assert!(matches!(
            codec.pack(&[0u8; 17]),
            Err(FrameError::PayloadTooLong { size: 17, max: 16 })
        ));
    }

    #[test]
    fn test_claimed_size_over_max_is_corrupt() {
        let codec = codec(false);
        let err = codec.unpack(&[0xFF, 0xFF, 0x00, 0x00, 1, 2, 3]).unwrap_err();
        assert!(err.is_corrupt());
        let err = codec.get_size(&[0x20, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 8192, max: 4096 }));
    }

    #[test]
    fn test_get_size_needs_header() {
        let err = codec(false).get_size(&[0x00, 0x05, 0x00]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let codec = codec(false);
        let mut packet = codec.pack(b"abc").unwrap();
        packet.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(codec.unpack(&packet).unwrap(), b"abc");
    }

    #[test]
    fn test_invalid_config() {
        assert!(PacketCodec::new(PacketConfig {
            compress: false,
            max_packet_size: 70000,
        })
        .is_err());
    }

    #[quickcheck]
    fn prop_roundtrip(data: Vec<u8>, compress: bool) -> TestResult {
        if data.len() > 4096 {
            return TestResult::discard();
        }
        let codec = codec(compress);
        let packet = match codec.pack(&data) {
            Ok(packet) => packet,
            // incompressible input can grow past the maximum
            Err(FrameError::PayloadTooLong { .. }) => return TestResult::discard(),
            Err(_) => return TestResult::failed(),
        };
        TestResult::from_bool(codec.unpack(&packet).unwrap() == data)
    }

    #[quickcheck]
    fn prop_single_bit_flip_detected(data: Vec<u8>, position: usize, bit: u8) -> TestResult {
        if data.is_empty() || data.len() > 4096 {
            return TestResult::discard();
        }
        let codec = codec(false);
        let mut packet = codec.pack(&data).unwrap();
        let index = PacketHeader::SIZE + position % data.len();
        packet[index] ^= 1 << (bit % 8);

        TestResult::from_bool(matches!(
            codec.unpack(&packet),
            Err(FrameError::ChecksumMismatch { .. })
        ))
    }

    #[quickcheck]
    fn prop_truncation_is_incomplete(data: Vec<u8>, cut: usize) -> TestResult {
        if data.is_empty() || data.len() > 4096 {
            return TestResult::discard();
        }
        let codec = codec(false);
        let packet = codec.pack(&data).unwrap();
        let truncated = &packet[..cut % packet.len()];

        match codec.unpack(truncated) {
            Err(err) => TestResult::from_bool(err.is_incomplete() && !err.is_corrupt()),
            Ok(_) => TestResult::failed(),
        }
    }
}
