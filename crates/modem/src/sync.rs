//! Start-of-transmission detection
//!
//! Three detectors, one per sync scheme: a streaming bit-pattern matcher
//! for FSK start markers, a sweep locator that fits a line through the
//! dominant frequency of consecutive windows, and a silence gap detector.

use crate::common::{ModulationConfig, SyncScheme};
use crate::error::config_error;
use crate::Result;
use std::collections::VecDeque;
use tonelink_core::{buffer::to_f64_samples, fft::SpectrumAnalyzer};
use tracing::debug;

/// Streaming single-pattern matcher over a bit stream.
///
/// Uses a prefix failure table so a partial match that overlaps the
/// start of the pattern is never lost. Constant work per bit, amortized.
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
    pattern: Vec<u8>,
    failure: Vec<usize>,
    matched: usize,
}

impl MarkerMatcher {
    pub fn new(pattern: Vec<u8>) -> Result<Self> {
        if pattern.is_empty() {
            return Err(config_error("marker pattern is empty"));
        }

        let mut failure = vec![0; pattern.len()];
        let mut k = 0;
        for i in 1..pattern.len() {
            while k > 0 && pattern[i] != pattern[k] {
                k = failure[k - 1];
            }
            if pattern[i] == pattern[k] {
                k += 1;
            }
            failure[i] = k;
        }

        Ok(Self {
            pattern,
            failure,
            matched: 0,
        })
    }

    /// Feed one symbol; `true` when it completes the pattern.
    pub fn push(&mut self, symbol: u8) -> bool {
        while self.matched > 0 && self.pattern[self.matched] != symbol {
            self.matched = self.failure[self.matched - 1];
        }
        if self.pattern[self.matched] == symbol {
            self.matched += 1;
        }
        if self.matched == self.pattern.len() {
            self.matched = 0;
            return true;
        }
        false
    }

    /// Index just past the first occurrence of the pattern in `symbols`
    pub fn find(&mut self, symbols: &[u8]) -> Option<usize> {
        symbols
            .iter()
            .position(|&s| self.push(s))
            .map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Symbols of the pattern matched so far
    pub fn progress(&self) -> usize {
        self.matched
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }
}

/// Locates a linear frequency sweep and predicts the first data tone.
#[derive(Debug)]
pub struct SweepDetector {
    analyzer: SpectrumAnalyzer,
    window: usize,
    required: usize,
    end_freq: f64,
    expected_slope: f64,
    slope_tolerance: f64,
    /// Half a tone plus calibration, added to the fitted sweep end
    midpoint_offset: f64,
}

impl SweepDetector {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        let SyncScheme::Sweep {
            start_freq,
            end_freq,
            samples,
            split,
            slope_tolerance,
            calibration_offset,
        } = config.sync
        else {
            return Err(config_error("sweep detector needs sweep synchronization"));
        };

        let window = samples / split.max(1);
        Ok(Self {
            analyzer: SpectrumAnalyzer::new(window, config.sample_rate as f64)?,
            window,
            required: (split as f64 * 0.9).ceil() as usize,
            end_freq,
            expected_slope: samples as f64 / (end_freq - start_freq),
            slope_tolerance,
            midpoint_offset: config.samples_per_tone() as f64 / 2.0 + calibration_offset as f64,
        })
    }

    /// Samples per analysis window
    pub fn window(&self) -> usize {
        self.window
    }

    /// Index in `samples` of the first data tone's midpoint, if a sweep
    /// with the expected slope is present.
    ///
    /// The returned index may lie beyond the end of `samples` when the
    /// sweep has only just finished.
    pub fn find_first_tone_midpoint(&mut self, samples: &[i16]) -> Result<Option<usize>> {
        let samples = to_f64_samples(samples);
        let mut points: VecDeque<(f64, f64)> = VecDeque::with_capacity(self.required + 1);

        let mut start = 0;
        while start + self.window <= samples.len() {
            let frequency = self
                .analyzer
                .peak_frequency(&samples[start..start + self.window])?;
            let centre = (start + self.window / 2) as f64;
            points.push_back((frequency, centre));
            start += self.window;

            if points.len() < self.required {
                continue;
            }

            if let Some((slope, intercept)) = fit_line(&points) {
                if (slope - self.expected_slope).abs() <= self.slope_tolerance {
                    let sweep_end = slope * self.end_freq + intercept;
                    let midpoint = (sweep_end + self.midpoint_offset).max(0.0) as usize;
                    debug!(slope, sweep_end, midpoint, "sweep found");
                    return Ok(Some(midpoint));
                }
            }
            points.pop_front();
        }

        Ok(None)
    }
}

/// Least-squares fit of `y = slope * x + intercept`. `None` when all `x`
/// coincide.
fn fit_line(points: &VecDeque<(f64, f64)>) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if n < 2.0 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), &(x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    if sxx < 1e-9 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Finds the end of a quiet gap of at least `min_samples`.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    level: i16,
    min_samples: usize,
}

impl SilenceDetector {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        match config.sync {
            SyncScheme::Silence { level, min_samples } => Ok(Self { level, min_samples }),
            _ => Err(config_error("silence detector needs silence synchronization")),
        }
    }

    /// Index of the first loud sample after a long enough silence
    pub fn find_end_of_silence(&self, samples: &[i16]) -> Option<usize> {
        let mut quiet = 0usize;
        for (i, &s) in samples.iter().enumerate() {
            if s.unsigned_abs() < self.level.unsigned_abs() {
                quiet += 1;
            } else if quiet >= self.min_samples {
                return Some(i);
            } else {
                quiet = 0;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulator::ToneModulator;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_marker_found_after_pattern() {
        let mut matcher = MarkerMatcher::new(vec![1, 0, 1, 1]).unwrap();
        assert_eq!(matcher.find(&[0, 0, 1, 0, 1, 1, 0]), Some(6));
    }

    #[test]
    fn test_marker_overlapping_prefix() {
        // "1 1 0" with a stray leading 1: a naive reset-to-zero matcher misses it
        let mut matcher = MarkerMatcher::new(vec![1, 1, 0]).unwrap();
        assert_eq!(matcher.find(&[1, 1, 1, 0]), Some(4));

        let mut matcher = MarkerMatcher::new(vec![1, 0, 1, 0, 0]).unwrap();
        assert_eq!(matcher.find(&[1, 0, 1, 0, 1, 0, 0]), Some(7));
    }

    #[test]
    fn test_marker_streaming_across_calls() {
        let mut matcher = MarkerMatcher::new(vec![0, 1, 1, 0]).unwrap();
        assert_eq!(matcher.find(&[1, 0, 1]), None);
        assert_eq!(matcher.progress(), 2);
        assert_eq!(matcher.find(&[1, 0, 1]), Some(2));
        assert!(MarkerMatcher::new(vec![]).is_err());
    }

    #[test]
    fn test_marker_absent() {
        let mut matcher = MarkerMatcher::new(vec![1, 1, 1, 1]).unwrap();
        assert_eq!(matcher.find(&[1, 1, 1, 0, 1, 1, 0, 1]), None);
    }

    fn sweep_signal(offset: usize, seed: u64) -> (ModulationConfig, Vec<i16>) {
        let config = ModulationConfig::mfsk();
        let modulator = ToneModulator::new(config.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut samples: Vec<i16> = (0..offset).map(|_| rng.gen_range(-3000..=3000)).collect();
        samples.extend(modulator.modulate(&[3, 9, 0, 15, 7, 1, 12, 4]).unwrap());
        samples.extend((0..4000).map(|_| rng.gen_range(-3000..=3000)));
        (config, samples)
    }

    #[test]
    fn test_sweep_midpoint_within_one_tone() {
        for (offset, seed) in [(0, 1), (12_345, 2), (30_000, 3)] {
            let (config, samples) = sweep_signal(offset, seed);
            let mut detector = SweepDetector::new(&config).unwrap();
            let midpoint = detector
                .find_first_tone_midpoint(&samples)
                .unwrap()
                .expect("sweep not found");

            let expected = offset + 48_000 + config.samples_per_tone() / 2;
            let error = midpoint as i64 - expected as i64;
            assert!(
                error.unsigned_abs() < config.samples_per_tone() as u64,
                "offset {}: midpoint {} expected {}",
                offset,
                midpoint,
                expected
            );
        }
    }

    #[test]
    fn test_sweep_absent_in_silence_and_noise() {
        let config = ModulationConfig::mfsk();
        let mut detector = SweepDetector::new(&config).unwrap();
        assert_eq!(detector.find_first_tone_midpoint(&vec![0; 96_000]).unwrap(), None);

        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<i16> = (0..96_000).map(|_| rng.gen_range(-8000..=8000)).collect();
        assert_eq!(detector.find_first_tone_midpoint(&noise).unwrap(), None);
    }

    #[test]
    fn test_fit_line_exact() {
        let points: VecDeque<(f64, f64)> = (0..10).map(|i| (i as f64, 3.0 * i as f64 + 2.0)).collect();
        let (slope, intercept) = fit_line(&points).unwrap();
        assert!((slope - 3.0).abs() < 1e-12);
        assert!((intercept - 2.0).abs() < 1e-9);

        let flat: VecDeque<(f64, f64)> = (0..10).map(|i| (0.0, i as f64)).collect();
        assert!(fit_line(&flat).is_none());
    }

    #[test]
    fn test_silence_end_detected() {
        let config = ModulationConfig {
            sync: SyncScheme::Silence {
                level: 500,
                min_samples: 100,
            },
            ..ModulationConfig::mfsk()
        };
        let detector = SilenceDetector::new(&config).unwrap();

        let mut samples = vec![9000i16; 50];
        samples.extend(vec![0i16; 40]);
        samples.extend(vec![9000i16; 5]);
        samples.extend(vec![-20i16; 150]);
        samples.extend(vec![-9000i16; 10]);
        assert_eq!(detector.find_end_of_silence(&samples), Some(50 + 40 + 5 + 150));

        assert_eq!(detector.find_end_of_silence(&vec![0; 10_000]), None);
    }
}
