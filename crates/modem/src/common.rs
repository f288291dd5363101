//! Modulation configuration and the demodulator strategy trait

use crate::error::config_error;
use crate::Result;
use serde::{Deserialize, Serialize};
use tonelink_core::{buffer::RingBuffer, filter::WindowKind};

/// Which demodulation strategy a link uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// One bit per tone, comb filter + PLL receiver
    Fsk,
    /// Several bits per tone, FFT peak receiver
    Mfsk,
}

/// Mapping from tone index to frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyShaping {
    /// `base + spacing * tone`
    Linear,
    /// `base + spacing * tone^1.5`
    Power3Halves,
}

/// How a receiver finds the start of a transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncScheme {
    /// Bit pattern preceded by alternating training bits (FSK)
    Marker { marker: String, training_bits: usize },
    /// Linear frequency sweep located by regression (MFSK)
    Sweep {
        start_freq: f64,
        end_freq: f64,
        samples: usize,
        /// Number of FFT windows the sweep is divided into
        split: usize,
        /// Absolute tolerance on the fitted samples-per-Hz slope
        slope_tolerance: f64,
        /// Extra samples added to the predicted first midpoint
        calibration_offset: i64,
    },
    /// A quiet gap of at least `min_samples` before the first tone (MFSK)
    Silence { level: i16, min_samples: usize },
}

/// Discontinuity suppression between consecutive tones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    /// Independent bursts, trimmed to a zero crossing and faded at both ends.
    /// A `fade_divisor` of 0 disables the fade.
    ClickSuppression {
        stop_at_zero_crossing: bool,
        fade_divisor: usize,
    },
    /// Single phase-continuous waveform whose frequency track is smoothed
    /// by a raised-cosine kernel one `kernel_divisor`-th of a tone wide.
    ContinuousPhase { kernel_divisor: usize },
}

/// Low-pass filter applied after the FSK comb filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowpassConfig {
    pub cutoff: f64,
    pub taps: usize,
    pub window: WindowKind,
}

impl Default for LowpassConfig {
    fn default() -> Self {
        Self {
            cutoff: 760.0,
            taps: 101,
            window: WindowKind::Hann,
        }
    }
}

/// Complete, immutable description of the air interface.
///
/// Construct with a preset or deserialize from a profile, then call
/// [`ModulationConfig::validate`] once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulationConfig {
    pub scheme: Scheme,
    pub sample_rate: u32,
    /// Must divide `sample_rate` exactly
    pub tones_per_second: u32,
    /// Bits carried by one tone: 1, 2, 4 or 8
    pub tone_bits: u8,
    pub freq_base: f64,
    pub freq_spacing: f64,
    pub shaping: FrequencyShaping,
    pub sync: SyncScheme,
    pub smoothing: Smoothing,
    pub use_gray: bool,
    /// MFSK reads `2 * samples_per_tone / read_fraction` samples per tone
    pub read_fraction: usize,
    /// Added to the fractional tone index before rounding
    pub tone_calibration_offset: f64,
    /// Sentinel tones appended after the packet
    pub end_tones: usize,
    pub lowpass: LowpassConfig,
    /// Peak amplitude as a fraction of full scale
    pub amplitude: f64,
}

impl Default for ModulationConfig {
    fn default() -> Self {
        Self::mfsk()
    }
}

impl ModulationConfig {
    /// 1920 baud binary FSK: mark (bit 1) at 1920 Hz, space (bit 0) at 3840 Hz
    pub fn fsk() -> Self {
        Self {
            scheme: Scheme::Fsk,
            sample_rate: 48_000,
            tones_per_second: 1920,
            tone_bits: 1,
            freq_base: 3840.0,
            freq_spacing: -1920.0,
            shaping: FrequencyShaping::Linear,
            sync: SyncScheme::Marker {
                marker: "RAPHBIN".to_string(),
                training_bits: 32,
            },
            smoothing: Smoothing::ContinuousPhase { kernel_divisor: 4 },
            use_gray: false,
            read_fraction: 8,
            tone_calibration_offset: 0.0,
            end_tones: 16,
            lowpass: LowpassConfig::default(),
            amplitude: 1.0,
        }
    }

    /// 48 tones per second, 16 tones between 500 Hz and 6000 Hz, sweep sync
    pub fn mfsk() -> Self {
        Self {
            scheme: Scheme::Mfsk,
            sample_rate: 48_000,
            tones_per_second: 48,
            tone_bits: 4,
            freq_base: 500.0,
            freq_spacing: (6000.0 - 500.0) / 15.0,
            shaping: FrequencyShaping::Linear,
            sync: SyncScheme::Sweep {
                start_freq: 500.0,
                end_freq: 6000.0,
                samples: 48_000,
                split: 60,
                slope_tolerance: 0.05,
                calibration_offset: 24,
            },
            smoothing: Smoothing::ContinuousPhase { kernel_divisor: 4 },
            use_gray: false,
            read_fraction: 8,
            tone_calibration_offset: 0.0,
            end_tones: 1,
            lowpass: LowpassConfig::default(),
            amplitude: 1.0,
        }
    }

    pub fn samples_per_tone(&self) -> usize {
        (self.sample_rate / self.tones_per_second.max(1)) as usize
    }

    /// Number of data tones, `2^tone_bits`
    pub fn tone_count(&self) -> u32 {
        1u32 << self.tone_bits
    }

    /// Out-of-band tone marking the end of an MFSK transmission
    pub fn end_tone(&self) -> u32 {
        self.tone_count()
    }

    /// Half-width of the MFSK analysis window around a tone midpoint
    pub fn read_size(&self) -> usize {
        self.samples_per_tone() / self.read_fraction.max(1)
    }

    pub fn bits_per_second(&self) -> u32 {
        self.tones_per_second * self.tone_bits as u32
    }

    /// Frequency in Hz of a (possibly fractional) tone index
    pub fn frequency(&self, tone: f64) -> f64 {
        match self.shaping {
            FrequencyShaping::Linear => self.freq_base + self.freq_spacing * tone,
            FrequencyShaping::Power3Halves => {
                self.freq_base + self.freq_spacing * tone.max(0.0).powf(1.5)
            }
        }
    }

    /// Fractional tone index for a measured frequency, calibration included
    pub fn tone_index(&self, frequency: f64) -> f64 {
        let linear = (frequency - self.freq_base) / self.freq_spacing;
        let index = match self.shaping {
            FrequencyShaping::Linear => linear,
            FrequencyShaping::Power3Halves => linear.signum() * linear.abs().powf(2.0 / 3.0),
        };
        index + self.tone_calibration_offset
    }

    /// Samples a receiver must keep around while waiting for sync
    pub fn sync_span(&self) -> usize {
        match &self.sync {
            SyncScheme::Marker { marker, .. } => marker.len() * 8 * self.samples_per_tone(),
            SyncScheme::Sweep { samples, .. } => *samples,
            SyncScheme::Silence { min_samples, .. } => *min_samples,
        }
    }

    /// Cross-check every field. Intended to run once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.tones_per_second == 0 {
            return Err(config_error("sample_rate and tones_per_second must be positive"));
        }
        if self.sample_rate % self.tones_per_second != 0 {
            return Err(config_error(format!(
                "tones_per_second {} does not divide sample_rate {}",
                self.tones_per_second, self.sample_rate
            )));
        }
        if ![1, 2, 4, 8].contains(&self.tone_bits) {
            return Err(config_error(format!(
                "tone_bits must be 1, 2, 4 or 8, got {}",
                self.tone_bits
            )));
        }
        if self.freq_spacing == 0.0 {
            return Err(config_error("freq_spacing must not be zero"));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return Err(config_error(format!("amplitude {} outside (0, 1]", self.amplitude)));
        }

        let nyquist = self.sample_rate as f64 / 2.0;
        let spt = self.samples_per_tone();

        match self.scheme {
            Scheme::Fsk => {
                if self.tone_bits != 1 {
                    return Err(config_error("FSK carries exactly one bit per tone"));
                }
                if spt < 2 {
                    return Err(config_error("FSK needs at least two samples per tone"));
                }
                if self.lowpass.cutoff <= 0.0 || self.lowpass.cutoff >= nyquist || self.lowpass.taps == 0 {
                    return Err(config_error(format!(
                        "invalid low-pass: cutoff {} Hz, {} taps",
                        self.lowpass.cutoff, self.lowpass.taps
                    )));
                }
                match &self.sync {
                    SyncScheme::Marker { marker, .. } if !marker.is_empty() => {}
                    SyncScheme::Marker { .. } => return Err(config_error("start marker is empty")),
                    _ => return Err(config_error("FSK requires marker synchronization")),
                }
            }
            Scheme::Mfsk => {
                if self.read_fraction == 0 || self.read_size() == 0 {
                    return Err(config_error(format!(
                        "read_fraction {} leaves no samples to analyze",
                        self.read_fraction
                    )));
                }
                match &self.sync {
                    SyncScheme::Sweep {
                        start_freq,
                        end_freq,
                        samples,
                        split,
                        slope_tolerance,
                        ..
                    } => {
                        if *split < 2 || samples / split < 2 {
                            return Err(config_error(format!(
                                "sweep of {} samples cannot be split into {} windows",
                                samples, split
                            )));
                        }
                        if start_freq == end_freq {
                            return Err(config_error("sweep start and end frequency are equal"));
                        }
                        for f in [*start_freq, *end_freq] {
                            if f <= 0.0 || f >= nyquist {
                                return Err(config_error(format!(
                                    "sweep frequency {} Hz outside (0, {})",
                                    f, nyquist
                                )));
                            }
                        }
                        if *slope_tolerance <= 0.0 {
                            return Err(config_error("slope_tolerance must be positive"));
                        }
                    }
                    SyncScheme::Silence { level, min_samples } => {
                        if *level <= 0 || *min_samples == 0 {
                            return Err(config_error("silence sync needs a positive level and duration"));
                        }
                    }
                    SyncScheme::Marker { .. } => {
                        return Err(config_error("MFSK requires sweep or silence synchronization"))
                    }
                }
            }
        }

        // FSK never transmits the out-of-band tone, MFSK does
        let highest = match self.scheme {
            Scheme::Fsk => self.tone_count() - 1,
            Scheme::Mfsk => self.end_tone(),
        };
        for tone in 0..=highest {
            let f = self.frequency(tone as f64);
            if f <= 0.0 || f >= nyquist {
                return Err(config_error(format!(
                    "tone {} maps to {:.1} Hz, outside (0, {})",
                    tone, f, nyquist
                )));
            }
        }

        match self.smoothing {
            Smoothing::ContinuousPhase { kernel_divisor } => {
                if kernel_divisor == 0 || spt / kernel_divisor == 0 {
                    return Err(config_error("smoothing kernel would be empty"));
                }
            }
            Smoothing::ClickSuppression { fade_divisor, .. } => {
                if fade_divisor > spt {
                    return Err(config_error("fade_divisor exceeds samples per tone"));
                }
            }
        }

        Ok(())
    }
}

/// One tone decision made by a demodulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedTone {
    /// Data symbol in `0..2^tone_bits`
    Data(u8),
    /// The out-of-band end-of-transmission tone
    End,
    /// Anything else; means the receiver lost synchronization
    Invalid(i32),
}

impl DecodedTone {
    /// Classify a rounded tone index
    pub fn from_index(index: i32, tone_bits: u8) -> Self {
        let count = 1i32 << tone_bits;
        if (0..count).contains(&index) {
            DecodedTone::Data(index as u8)
        } else if index == count {
            DecodedTone::End
        } else {
            DecodedTone::Invalid(index)
        }
    }
}

/// How a receiver knows a packet is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketEnd {
    /// When the bits announced by the packet header have arrived
    Length,
    /// When the end tone is heard
    EndTone,
}

/// Streaming demodulation strategy, chosen once from the configuration.
///
/// Cursors are absolute sample positions in the [`RingBuffer`]. Callers make
/// sure the cursor (minus [`Demodulator::lookbehind`]) has not been
/// overwritten before calling in.
pub trait Demodulator: Send {
    /// Search buffered audio from `cursor` for the start of a transmission.
    ///
    /// Returns `true` with the cursor placed on the first data tone, or
    /// `false` with the cursor at the oldest position still worth keeping.
    fn acquire(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<bool>;

    /// Decide the tone at `cursor` if enough audio has arrived, advancing the
    /// cursor past it.
    fn next_tone(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<Option<DecodedTone>>;

    fn packet_end(&self) -> PacketEnd;

    /// Tone repeated after a packet that the receiver should skip over
    fn trailer_tone(&self) -> DecodedTone;

    /// Samples before the cursor that `next_tone` still reads
    fn lookbehind(&self) -> usize;

    /// Samples to retain when no sync was found
    fn sync_span(&self) -> usize;

    /// Forget acquisition progress after a packet or a desync
    fn reset(&mut self);
}
