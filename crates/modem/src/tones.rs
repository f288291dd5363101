//! Conversion between bytes and tone symbols

use crate::error::config_error;
use crate::{ModemError, Result};

/// Binary-reflected Gray code
pub fn to_gray(value: u8) -> u8 {
    value ^ (value >> 1)
}

pub fn from_gray(gray: u8) -> u8 {
    let mut value = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        value ^= shift;
        shift >>= 1;
    }
    value
}

fn check_tone_bits(tone_bits: u8) -> Result<()> {
    if [1, 2, 4, 8].contains(&tone_bits) {
        Ok(())
    } else {
        Err(config_error(format!(
            "tone_bits must be 1, 2, 4 or 8, got {}",
            tone_bits
        )))
    }
}

/// Split each byte into `8 / tone_bits` symbols, most significant first.
///
/// With `use_gray`, each symbol is Gray coded; for single-bit tones the
/// whole byte is Gray coded before splitting.
pub fn bytes_to_tones(data: &[u8], tone_bits: u8, use_gray: bool) -> Result<Vec<u8>> {
    check_tone_bits(tone_bits)?;

    let per_byte = 8 / tone_bits as usize;
    let mask = ((1u16 << tone_bits) - 1) as u8;
    let mut tones = Vec::with_capacity(data.len() * per_byte);

    for &byte in data {
        let byte = if use_gray && tone_bits == 1 {
            to_gray(byte)
        } else {
            byte
        };
        for i in (0..per_byte).rev() {
            let symbol = (byte >> (i * tone_bits as usize)) & mask;
            tones.push(if use_gray && tone_bits > 1 {
                to_gray(symbol)
            } else {
                symbol
            });
        }
    }

    Ok(tones)
}

/// Inverse of [`bytes_to_tones`]. A trailing partial byte is dropped.
pub fn tones_to_bytes(tones: &[u8], tone_bits: u8, use_gray: bool) -> Result<Vec<u8>> {
    check_tone_bits(tone_bits)?;

    let per_byte = 8 / tone_bits as usize;
    let limit = 1u32 << tone_bits;

    tones
        .chunks_exact(per_byte)
        .map(|group| {
            let mut byte = 0u8;
            for (j, &tone) in group.iter().enumerate() {
                if tone as u32 >= limit {
                    return Err(ModemError::InvalidTone {
                        tone: tone as i32,
                        limit,
                    });
                }
                let symbol = if use_gray && tone_bits > 1 {
                    from_gray(tone)
                } else {
                    tone
                };
                let shift = 8 - (j + 1) * tone_bits as usize;
                byte |= ((symbol as u16) << shift) as u8;
            }
            Ok(if use_gray && tone_bits == 1 {
                from_gray(byte)
            } else {
                byte
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_gray_sequence() {
        let gray: Vec<u8> = (0..8).map(to_gray).collect();
        assert_eq!(gray, vec![0, 1, 3, 2, 6, 7, 5, 4]);
        for v in 0..=255u8 {
            assert_eq!(from_gray(to_gray(v)), v);
        }
    }

    #[test]
    fn test_msb_first_order() {
        assert_eq!(bytes_to_tones(&[0xA5], 4, false).unwrap(), vec![0xA, 0x5]);
        assert_eq!(bytes_to_tones(&[0b1101_0010], 2, false).unwrap(), vec![3, 1, 0, 2]);
        assert_eq!(
            bytes_to_tones(&[0b1000_0001], 1, false).unwrap(),
            vec![1, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(bytes_to_tones(&[7, 200], 8, false).unwrap(), vec![7, 200]);
    }

    #[test]
    fn test_partial_trailing_group_dropped() {
        assert_eq!(tones_to_bytes(&[0x7, 0x4, 0x6], 4, false).unwrap(), b"t");
    }

    #[test]
    fn test_out_of_range_tone() {
        assert!(matches!(
            tones_to_bytes(&[16, 0], 4, false),
            Err(ModemError::InvalidTone { tone: 16, limit: 16 })
        ));
    }

    #[test]
    fn test_invalid_tone_bits() {
        assert!(bytes_to_tones(b"x", 3, false).is_err());
        assert!(tones_to_bytes(&[0, 1], 5, false).is_err());
    }

    #[test]
    fn test_testing_123_all_settings() {
        let message = b"testing testing 123";
        for use_gray in [true, false] {
            for tone_bits in [1, 2, 4, 8] {
                let tones = bytes_to_tones(message, tone_bits, use_gray).unwrap();
                assert_eq!(tones.len(), message.len() * 8 / tone_bits as usize);
                assert!(tones.iter().all(|&t| (t as u32) < (1 << tone_bits)));
                assert_eq!(tones_to_bytes(&tones, tone_bits, use_gray).unwrap(), message);
            }
        }
    }

    #[quickcheck]
    fn prop_roundtrip(data: Vec<u8>, bits_index: u8, use_gray: bool) -> TestResult {
        let tone_bits = [1, 2, 4, 8][(bits_index % 4) as usize];
        let tones = bytes_to_tones(&data, tone_bits, use_gray).unwrap();
        TestResult::from_bool(tones_to_bytes(&tones, tone_bits, use_gray).unwrap() == data)
    }
}
