//! Capture ring buffer and sample conversion
//!
//! Positions handed out by [`RingBuffer`] are absolute sample indices since
//! the buffer was created, so callers can keep cursors across wrap-around.

use crate::{CoreError, Result};
use dasp::Sample;
use tracing::trace;

/// Fixed-capacity circular buffer of 16-bit PCM samples.
///
/// The producer only advances the write cursor; the consumer reads behind it
/// and advances the consumed cursor. Writing more than `capacity` samples
/// ahead of the consumer overwrites the oldest unconsumed audio.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<i16>,
    write_pos: u64,
    consumed_pos: u64,
}

impl RingBuffer {
    /// Create an empty ring buffer holding `capacity` samples
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity { capacity });
        }

        Ok(Self {
            data: vec![0; capacity],
            write_pos: 0,
            consumed_pos: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Total number of samples ever written
    pub fn write_position(&self) -> u64 {
        self.write_pos
    }

    pub fn consumed_position(&self) -> u64 {
        self.consumed_pos
    }

    /// Oldest absolute position still held in the buffer
    pub fn oldest_available(&self) -> u64 {
        self.write_pos.saturating_sub(self.data.len() as u64)
    }

    /// Number of samples written but not yet consumed
    pub fn unconsumed(&self) -> usize {
        (self.write_pos - self.consumed_pos.max(self.oldest_available())) as usize
    }

    /// Append samples, returning how many unconsumed samples were overwritten.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let capacity = self.data.len() as u64;
        let previous_floor = self.consumed_pos.max(self.oldest_available());

        // Only the last `capacity` samples of an oversized push survive.
        let skip = samples.len().saturating_sub(self.data.len());
        for (i, &sample) in samples.iter().enumerate().skip(skip) {
            let index = ((self.write_pos + i as u64) % capacity) as usize;
            self.data[index] = sample;
        }
        self.write_pos += samples.len() as u64;

        let oldest = self.oldest_available();
        let lost = oldest.saturating_sub(previous_floor);
        if oldest > self.consumed_pos {
            self.consumed_pos = oldest;
        }
        if lost > 0 {
            trace!(lost, oldest, "overwrote unconsumed samples");
        }
        lost as usize
    }

    /// Copy samples starting at absolute position `start` into `out`.
    pub fn read(&self, start: u64, out: &mut [i16]) -> Result<()> {
        let end = start + out.len() as u64;
        if start < self.oldest_available() {
            return Err(CoreError::Overwritten {
                start,
                end,
                oldest: self.oldest_available(),
            });
        }
        if end > self.write_pos {
            return Err(CoreError::NotYetWritten {
                start,
                end,
                written: self.write_pos,
            });
        }

        let capacity = self.data.len() as u64;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data[((start + i as u64) % capacity) as usize];
        }
        Ok(())
    }

    /// Owned copy of `len` samples starting at `start`
    pub fn read_vec(&self, start: u64, len: usize) -> Result<Vec<i16>> {
        let mut out = vec![0; len];
        self.read(start, &mut out)?;
        Ok(out)
    }

    /// Mark everything before `pos` as consumed. Never moves backwards and
    /// never passes the write cursor.
    pub fn consume_to(&mut self, pos: u64) {
        let pos = pos.min(self.write_pos);
        if pos > self.consumed_pos {
            self.consumed_pos = pos;
        }
    }

    /// Drop all content and reset both cursors
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.write_pos = 0;
        self.consumed_pos = 0;
    }
}

/// Convert 16-bit PCM to floating point in `[-1.0, 1.0)`
pub fn to_f64_samples(samples: &[i16]) -> Vec<f64> {
    samples.iter().map(|s| s.to_sample::<f64>()).collect()
}

/// Convert floating point samples to 16-bit PCM, saturating at full scale
pub fn to_i16_samples(samples: &[f64]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| s.clamp(-1.0, 1.0).to_sample::<i16>())
        .collect()
}
