//! Trimmed gzip
//!
//! A gzip member minus its fixed 10-byte header and with the 4-byte ISIZE
//! trailer cut to its low 16 bits. What remains is the raw deflate body,
//! the CRC32 of the uncompressed data (little endian) and the uncompressed
//! length modulo 65536 (little endian). Gzip tools read it back after
//! prepending a standard header and two zero bytes.

use crate::{FrameError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Bytes following the deflate body: CRC32 + truncated size
pub const TRAILER_SIZE: usize = 6;

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| FrameError::Compression { msg: e.to_string() })?;
    let mut out = encoder
        .finish()
        .map_err(|e| FrameError::Compression { msg: e.to_string() })?;

    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    Ok(out)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < TRAILER_SIZE {
        return Err(FrameError::Decompression {
            msg: format!("{} bytes is shorter than the gzip trailer", data.len()),
        });
    }

    let (body, trailer) = data.split_at(data.len() - TRAILER_SIZE);
    let mut out = Vec::new();
    DeflateDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| FrameError::Decompression { msg: e.to_string() })?;

    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual_crc = crc32fast::hash(&out);
    if expected_crc != actual_crc {
        return Err(FrameError::Decompression {
            msg: format!("CRC32 {:#010x} does not match {:#010x}", actual_crc, expected_crc),
        });
    }

    let expected_size = u16::from_le_bytes([trailer[4], trailer[5]]);
    if expected_size != out.len() as u16 {
        return Err(FrameError::Decompression {
            msg: format!(
                "size {} does not match trailer size {}",
                out.len() as u16,
                expected_size
            ),
        });
    }

    Ok(out)
}
