//! Multi-tone FSK demodulation
//!
//! Each tone is decided from the spectral peak of a short window centred
//! on its midpoint. Midpoints follow from the sync point in steps of one
//! tone; there is no clock recovery.

use crate::common::{DecodedTone, Demodulator, ModulationConfig, PacketEnd, SyncScheme};
use crate::error::config_error;
use crate::sync::{SilenceDetector, SweepDetector};
use crate::{ModemError, Result};
use tonelink_core::buffer::{to_f64_samples, RingBuffer};
use tonelink_core::fft::SpectrumAnalyzer;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct MfskDemodulator {
    config: ModulationConfig,
    analyzer: SpectrumAnalyzer,
}

impl MfskDemodulator {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        let read_size = config.read_size();
        if read_size == 0 {
            return Err(config_error("MFSK analysis window is empty"));
        }
        Ok(Self {
            config: config.clone(),
            analyzer: SpectrumAnalyzer::new(2 * read_size, config.sample_rate as f64)?,
        })
    }

    /// Length of the analysis window, twice the read size
    pub fn window_len(&self) -> usize {
        self.analyzer.size()
    }

    /// Classify the tone in one analysis window
    pub fn tone_at(&mut self, window: &[i16]) -> Result<DecodedTone> {
        let frequency = self.analyzer.peak_frequency(&to_f64_samples(window))?;
        let index = self.config.tone_index(frequency).round() as i32;
        trace!(frequency, index, "tone");
        Ok(DecodedTone::from_index(index, self.config.tone_bits))
    }

    /// Decode the tones of a complete recording, starting at the midpoint
    /// of the first data tone. Stops at the end tone or when the audio runs
    /// out.
    pub fn tones_from(&mut self, samples: &[i16], first_midpoint: usize) -> Result<Vec<u8>> {
        let read = self.config.read_size();
        let spt = self.config.samples_per_tone();
        let mut tones = Vec::new();

        let mut midpoint = first_midpoint.max(read);
        while midpoint + read <= samples.len() {
            match self.tone_at(&samples[midpoint - read..midpoint + read])? {
                DecodedTone::Data(tone) => tones.push(tone),
                DecodedTone::End => return Ok(tones),
                DecodedTone::Invalid(tone) => {
                    return Err(ModemError::InvalidTone {
                        tone,
                        limit: self.config.tone_count(),
                    })
                }
            }
            midpoint += spt;
        }

        debug!(tones = tones.len(), "audio ended before the end tone");
        Ok(tones)
    }
}

#[derive(Debug)]
enum Acquisition {
    Sweep(SweepDetector),
    Silence(SilenceDetector),
}

/// Streaming MFSK receiver. The cursor it hands out is the midpoint of the
/// next tone to decide.
#[derive(Debug)]
pub struct MfskReceiver {
    demodulator: MfskDemodulator,
    acquisition: Acquisition,
    samples_per_tone: usize,
    read_size: usize,
    sync_span: usize,
}

impl MfskReceiver {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        let acquisition = match config.sync {
            SyncScheme::Sweep { .. } => Acquisition::Sweep(SweepDetector::new(config)?),
            SyncScheme::Silence { .. } => Acquisition::Silence(SilenceDetector::new(config)?),
            SyncScheme::Marker { .. } => {
                return Err(config_error("MFSK receiver needs sweep or silence synchronization"))
            }
        };

        Ok(Self {
            demodulator: MfskDemodulator::new(config)?,
            acquisition,
            samples_per_tone: config.samples_per_tone(),
            read_size: config.read_size(),
            sync_span: config.sync_span(),
        })
    }
}

impl Demodulator for MfskReceiver {
    fn acquire(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<bool> {
        let start = (*cursor).max(ring.oldest_available());
        let end = ring.write_position();
        if start >= end {
            return Ok(false);
        }
        let window = ring.read_vec(start, (end - start) as usize)?;

        let found = match &mut self.acquisition {
            Acquisition::Sweep(detector) => detector.find_first_tone_midpoint(&window)?,
            Acquisition::Silence(detector) => detector
                .find_end_of_silence(&window)
                .map(|i| i + self.samples_per_tone / 2),
        };

        match found {
            Some(offset) => {
                *cursor = start + offset as u64;
                debug!(midpoint = *cursor, "first tone located");
                Ok(true)
            }
            None => {
                *cursor = start.max(end.saturating_sub(self.sync_span as u64));
                Ok(false)
            }
        }
    }

    fn next_tone(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<Option<DecodedTone>> {
        let read = self.read_size as u64;
        if ring.write_position() <= *cursor + read {
            return Ok(None);
        }

        let window = ring.read_vec(cursor.saturating_sub(read), 2 * self.read_size)?;
        let tone = self.demodulator.tone_at(&window)?;
        *cursor += self.samples_per_tone as u64;
        Ok(Some(tone))
    }

    fn packet_end(&self) -> PacketEnd {
        PacketEnd::EndTone
    }

    fn trailer_tone(&self) -> DecodedTone {
        DecodedTone::End
    }

    fn lookbehind(&self) -> usize {
        self.read_size
    }

    fn sync_span(&self) -> usize {
        self.sync_span
    }

    fn reset(&mut self) {}
}
