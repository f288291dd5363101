//! Tone synthesis
//!
//! Turns data tones into 16-bit PCM, framed by the configured sync
//! preamble and trailer.

use crate::common::{ModulationConfig, Scheme, Smoothing, SyncScheme};
use crate::tones::bytes_to_tones;
use crate::{ModemError, Result};
use std::f64::consts::PI;
use tonelink_core::{buffer::to_i16_samples, filter::convolve_same};
use tracing::debug;

/// Normalized raised-cosine smoothing kernel of `width` taps
pub fn raised_cosine_kernel(width: usize) -> Vec<f64> {
    if width < 3 {
        return vec![1.0];
    }
    let raw: Vec<f64> = (0..width)
        .map(|i| {
            let x = -PI + 2.0 * PI * i as f64 / (width - 1) as f64;
            x.cos() + 1.0
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|y| y / total).collect()
}

#[derive(Debug, Clone)]
pub struct ToneModulator {
    config: ModulationConfig,
}

impl ToneModulator {
    pub fn new(config: ModulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModulationConfig {
        &self.config
    }

    /// FSK preamble bits: alternating training bits, then the start marker.
    /// Empty for the other sync schemes.
    pub fn preamble_tones(&self) -> Result<Vec<u8>> {
        match &self.config.sync {
            SyncScheme::Marker {
                marker,
                training_bits,
            } => {
                let mut tones: Vec<u8> = (0..*training_bits).map(|i| (i % 2 == 0) as u8).collect();
                tones.extend(bytes_to_tones(marker.as_bytes(), 1, false)?);
                Ok(tones)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Tones sent after the data: idle mark bits for FSK, end tones for MFSK
    pub fn trailer_tones(&self) -> Vec<u32> {
        let tone = match self.config.scheme {
            Scheme::Fsk => 1,
            Scheme::Mfsk => self.config.end_tone(),
        };
        vec![tone; self.config.end_tones]
    }

    /// Number of samples [`ToneModulator::modulate`] produces for
    /// `data_tones` data tones
    pub fn transmission_len(&self, data_tones: usize) -> usize {
        let spt = self.config.samples_per_tone();
        let preamble = match &self.config.sync {
            SyncScheme::Marker {
                marker,
                training_bits,
            } => (training_bits + marker.len() * 8) * spt,
            SyncScheme::Sweep { samples, .. } => *samples,
            SyncScheme::Silence { min_samples, .. } => min_samples + spt,
        };
        preamble + (data_tones + self.config.end_tones) * spt
    }

    /// Synthesize a full transmission carrying `data_tones`.
    pub fn modulate(&self, data_tones: &[u8]) -> Result<Vec<i16>> {
        let limit = self.config.tone_count();
        if let Some(&bad) = data_tones.iter().find(|&&t| t as u32 >= limit) {
            return Err(ModemError::InvalidTone {
                tone: bad as i32,
                limit,
            });
        }

        let mut tones: Vec<u32> = self
            .preamble_tones()?
            .into_iter()
            .map(u32::from)
            .collect();
        tones.extend(data_tones.iter().map(|&t| t as u32));
        tones.extend(self.trailer_tones());

        let (lead, sweep) = match self.config.sync {
            SyncScheme::Sweep {
                start_freq,
                end_freq,
                samples,
                ..
            } => (0, linear_track(start_freq, end_freq, samples)),
            SyncScheme::Silence { min_samples, .. } => {
                (min_samples + self.config.samples_per_tone(), Vec::new())
            }
            SyncScheme::Marker { .. } => (0, Vec::new()),
        };

        let waveform = match self.config.smoothing {
            Smoothing::ContinuousPhase { kernel_divisor } => {
                let mut track = sweep;
                for &tone in &tones {
                    let f = self.config.frequency(tone as f64);
                    track.extend(std::iter::repeat(f).take(self.config.samples_per_tone()));
                }
                let kernel =
                    raised_cosine_kernel(self.config.samples_per_tone() / kernel_divisor.max(1));
                let smoothed = convolve_same(&track, &kernel);
                self.synthesize(&smoothed)
            }
            Smoothing::ClickSuppression {
                stop_at_zero_crossing,
                fade_divisor,
            } => {
                let mut wave = self.synthesize(&sweep);
                for &tone in &tones {
                    wave.extend(self.burst(
                        self.config.frequency(tone as f64),
                        stop_at_zero_crossing,
                        fade_divisor,
                    ));
                }
                wave
            }
        };

        let mut out = vec![0i16; lead];
        out.extend(to_i16_samples(&waveform));
        debug!(
            tones = tones.len(),
            samples = out.len(),
            "modulated transmission"
        );
        Ok(out)
    }

    /// Phase-continuous sine following a per-sample frequency track
    fn synthesize(&self, track: &[f64]) -> Vec<f64> {
        let step = 2.0 * PI / self.config.sample_rate as f64;
        let mut phase = 0.0;
        track
            .iter()
            .map(|&f| {
                phase = (phase + step * f) % (2.0 * PI);
                self.config.amplitude * phase.sin()
            })
            .collect()
    }

    /// One independent tone burst with click suppression applied
    fn burst(&self, frequency: f64, stop_at_zero_crossing: bool, fade_divisor: usize) -> Vec<f64> {
        let spt = self.config.samples_per_tone();
        let step = 2.0 * PI * frequency / self.config.sample_rate as f64;
        let mut wave: Vec<f64> = (0..spt)
            .map(|n| self.config.amplitude * (step * n as f64).sin())
            .collect();

        if stop_at_zero_crossing {
            // Silence everything after the last rising zero crossing
            if let Some(i) = (0..spt.saturating_sub(1))
                .rev()
                .find(|&i| wave[i] < 0.0 && wave[i + 1] > 0.0)
            {
                wave[i + 1..].fill(0.0);
            }
        }

        if fade_divisor > 0 {
            let fade = spt / fade_divisor;
            for i in 0..fade {
                let ratio = i as f64 / fade as f64;
                wave[i] *= ratio;
                wave[spt - 1 - i] *= ratio;
            }
        }

        wave
    }
}

/// `samples` points evenly spaced from `start` to `end` inclusive
fn linear_track(start: f64, end: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..samples)
            .map(|i| start + (end - start) * i as f64 / (samples - 1) as f64)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonelink_core::fft::SpectrumAnalyzer;
    use tonelink_core::buffer::to_f64_samples;

    fn dominant(samples: &[i16], sample_rate: f64) -> f64 {
        let mut analyzer = SpectrumAnalyzer::new(samples.len(), sample_rate).unwrap();
        analyzer.peak_frequency(&to_f64_samples(samples)).unwrap()
    }

    #[test]
    fn test_kernel_normalized() {
        let kernel = raised_cosine_kernel(250);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(kernel[0].abs() < 1e-12);
        assert_eq!(raised_cosine_kernel(1), vec![1.0]);
    }

    #[test]
    fn test_mfsk_layout_and_tones() {
        let config = ModulationConfig::mfsk();
        let modulator = ToneModulator::new(config.clone()).unwrap();
        let tones = [0u8, 15, 7, 3];
        let samples = modulator.modulate(&tones).unwrap();

        let spt = config.samples_per_tone();
        assert_eq!(samples.len(), 48_000 + (tones.len() + 1) * spt);
        assert_eq!(samples.len(), modulator.transmission_len(tones.len()));

        let read = config.read_size();
        for (k, &tone) in tones.iter().chain(&[16u8]).enumerate() {
            let mid = 48_000 + k * spt + spt / 2;
            let f = dominant(&samples[mid - read..mid + read], 48_000.0);
            assert_eq!(config.tone_index(f).round() as i32, tone as i32, "tone {}", k);
        }
    }

    #[test]
    fn test_fsk_preamble_bits() {
        let modulator = ToneModulator::new(ModulationConfig::fsk()).unwrap();
        let preamble = modulator.preamble_tones().unwrap();
        assert_eq!(preamble.len(), 32 + 56);
        assert_eq!(&preamble[..4], &[1, 0, 1, 0]);
        // 'R' = 0x52
        assert_eq!(&preamble[32..40], &[0, 1, 0, 1, 0, 0, 1, 0]);
        assert_eq!(modulator.trailer_tones(), vec![1; 16]);
    }

    #[test]
    fn test_amplitude_bounded() {
        let config = ModulationConfig {
            amplitude: 0.5,
            ..ModulationConfig::fsk()
        };
        let samples = ToneModulator::new(config).unwrap().modulate(&[1, 0, 1, 1]).unwrap();
        assert!(samples.iter().all(|s| s.unsigned_abs() <= 16_384));
        assert!(samples.iter().any(|s| s.unsigned_abs() > 15_000));
    }

    #[test]
    fn test_click_suppression_edges() {
        let config = ModulationConfig {
            smoothing: Smoothing::ClickSuppression {
                stop_at_zero_crossing: true,
                fade_divisor: 8,
            },
            sync: SyncScheme::Silence {
                level: 500,
                min_samples: 2000,
            },
            ..ModulationConfig::mfsk()
        };
        let modulator = ToneModulator::new(config.clone()).unwrap();
        let samples = modulator.modulate(&[5, 10]).unwrap();

        let lead = 2000 + config.samples_per_tone();
        assert_eq!(samples.len(), modulator.transmission_len(2));
        assert!(samples[..lead].iter().all(|&s| s == 0));
        // each burst starts faded in and ends silent
        for k in 0..3 {
            let start = lead + k * config.samples_per_tone();
            let end = start + config.samples_per_tone();
            assert_eq!(samples[start], 0);
            assert_eq!(samples[end - 1], 0);
        }
    }

    #[test]
    fn test_rejects_out_of_range_tone() {
        let modulator = ToneModulator::new(ModulationConfig::mfsk()).unwrap();
        assert!(matches!(
            modulator.modulate(&[16]),
            Err(ModemError::InvalidTone { tone: 16, limit: 16 })
        ));
    }

    #[test]
    fn test_linear_track_endpoints() {
        let track = linear_track(500.0, 6000.0, 48_000);
        assert_eq!(track[0], 500.0);
        assert!((track[47_999] - 6000.0).abs() < 1e-9);
    }
}
