//! Link profiles: every setting a transmitter and receiver must agree on

use serde::{Deserialize, Serialize};
use std::fmt;
use tonelink_frame::packet::{PacketConfig, PacketHeader};
use tonelink_modem::common::{ModulationConfig, Scheme};
use tonelink_modem::modulator::ToneModulator;

use crate::error::ProfileError;

/// Receive-side buffering and processing cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Ring buffer size in samples
    pub buffer_capacity: usize,
    /// How often the consumer processes buffered audio
    pub processing_interval_ms: u64,
    /// Capture chunks the producer may queue ahead of the consumer
    pub queue_depth: usize,
    /// Samples per capture chunk
    pub chunk_samples: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 128 * 1024,
            processing_interval_ms: 1000,
            queue_depth: 64,
            chunk_samples: 2048,
        }
    }
}

impl StreamConfig {
    /// Seconds of audio the ring buffer holds
    pub fn buffer_seconds(&self, sample_rate: u32) -> f64 {
        self.buffer_capacity as f64 / sample_rate as f64
    }

    /// Check the buffer against the link it has to serve. A processing tick
    /// must come around before the buffer wraps, and the buffer must hold a
    /// whole sync preamble plus one tone.
    pub fn validate(&self, modulation: &ModulationConfig) -> Result<(), ProfileError> {
        let fail = |msg: String| Err(ProfileError::Stream { msg });

        if self.buffer_capacity == 0 || self.queue_depth == 0 || self.chunk_samples == 0 {
            return fail("buffer_capacity, queue_depth and chunk_samples must be positive".into());
        }
        if self.processing_interval_ms == 0 {
            return fail("processing_interval_ms must be positive".into());
        }

        let buffer_ms = self.buffer_seconds(modulation.sample_rate) * 1000.0;
        if self.processing_interval_ms as f64 >= buffer_ms {
            return fail(format!(
                "processing interval {} ms does not fit in the {:.0} ms ring buffer",
                self.processing_interval_ms, buffer_ms
            ));
        }

        let needed = modulation.sync_span() + modulation.samples_per_tone();
        if self.buffer_capacity < needed {
            return fail(format!(
                "buffer of {} samples cannot hold the {} sample sync preamble and one tone",
                self.buffer_capacity, needed
            ));
        }
        Ok(())
    }
}

/// Wake-up noise around a transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Noise samples before and after the signal
    pub noise_samples: usize,
    /// Peak amplitude of the uniform noise, in PCM units
    pub noise_level: f64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            noise_samples: 16_000,
            noise_level: 1e4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub modulation: ModulationConfig,
    pub packet: PacketConfig,
    pub stream: StreamConfig,
    pub transmit: TransmitConfig,
}

impl Default for Profile {
    fn default() -> Self {
        Self::mfsk()
    }
}

impl Profile {
    pub fn fsk() -> Self {
        Self {
            modulation: ModulationConfig::fsk(),
            packet: PacketConfig::default(),
            stream: StreamConfig::default(),
            transmit: TransmitConfig::default(),
        }
    }

    pub fn mfsk() -> Self {
        Self {
            modulation: ModulationConfig::mfsk(),
            ..Self::fsk()
        }
    }

    /// Built-in profile by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fsk" => Some(Self::fsk()),
            "mfsk" => Some(Self::mfsk()),
            _ => None,
        }
    }

    /// Cross-check all sections; run once at startup
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.modulation.validate()?;
        self.packet.validate()?;
        self.stream.validate(&self.modulation)?;
        if !(0.0..=i16::MAX as f64).contains(&self.transmit.noise_level) {
            return Err(ProfileError::Stream {
                msg: format!("noise_level {} outside PCM range", self.transmit.noise_level),
            });
        }
        Ok(())
    }

    pub fn summary(&self) -> Result<ProfileSummary, ProfileError> {
        let m = &self.modulation;
        let sample_rate = m.sample_rate as f64;
        let framing = ToneModulator::new(m.clone())?.transmission_len(0);
        let overhead = (2 * self.transmit.noise_samples + framing) as f64 / sample_rate;

        let max_bytes = self.packet.max_packet_size + PacketHeader::SIZE;
        let max_tones = max_bytes * 8 / m.tone_bits as usize;
        let buffer_seconds = self.stream.buffer_seconds(m.sample_rate);

        Ok(ProfileSummary {
            scheme: m.scheme,
            bits_per_second: m.bits_per_second(),
            samples_per_tone: m.samples_per_tone(),
            overhead_seconds: overhead,
            max_packet_bytes: max_bytes,
            max_packet_seconds: (max_tones * m.samples_per_tone()) as f64 / sample_rate,
            buffer_samples: self.stream.buffer_capacity,
            buffer_seconds,
            processing_budget_ms: buffer_seconds * 1000.0
                - self.stream.processing_interval_ms as f64,
        })
    }
}

/// Link figures shown by the `info` command
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSummary {
    pub scheme: Scheme,
    pub bits_per_second: u32,
    pub samples_per_tone: usize,
    /// Noise, sync preamble and trailer, in seconds
    pub overhead_seconds: f64,
    /// Largest packet including its header
    pub max_packet_bytes: usize,
    pub max_packet_seconds: f64,
    pub buffer_samples: usize,
    pub buffer_seconds: f64,
    /// Time a processing pass may take before audio is overwritten
    pub processing_budget_ms: f64,
}

impl fmt::Display for ProfileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.scheme {
            Scheme::Fsk => "single bit, comb filter",
            Scheme::Mfsk => "multiple bits, FFT",
        };
        writeln!(f, "{:<24} {}", "mode:", mode)?;
        writeln!(
            f,
            "{:<24} {} bits/s, {} bytes/s",
            "data rate:",
            self.bits_per_second,
            self.bits_per_second / 8
        )?;
        writeln!(f, "{:<24} {}", "samples per tone:", self.samples_per_tone)?;
        writeln!(f, "{:<24} {:.1} s", "transmission overhead:", self.overhead_seconds)?;
        writeln!(
            f,
            "{:<24} {} bytes, {:.1} s on air",
            "max packet:", self.max_packet_bytes, self.max_packet_seconds
        )?;
        writeln!(
            f,
            "{:<24} {} samples, {:.1} s",
            "record buffer:", self.buffer_samples, self.buffer_seconds
        )?;
        write!(f, "{:<24} {:.0} ms", "max process time:", self.processing_budget_ms)
    }
}
