//! Real-input FFT spectrum analysis

use crate::{CoreError, Result};
use realfft::{num_complex::Complex, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Magnitude spectrum and dominant-frequency estimation over fixed-size
/// windows of real samples.
pub struct SpectrumAnalyzer {
    size: usize,
    sample_rate: f64,
    fft: Arc<dyn RealToComplex<f64>>,
    input: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Plan a forward transform of `size` samples
    pub fn new(size: usize, sample_rate: f64) -> Result<Self> {
        if size < 2 {
            return Err(CoreError::FftError {
                msg: format!("FFT size must be at least 2, got {}", size),
            });
        }

        if sample_rate <= 0.0 {
            return Err(CoreError::InvalidSampleRate { rate: sample_rate });
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(size);
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let magnitudes = vec![0.0; spectrum.len()];

        Ok(Self {
            size,
            sample_rate,
            fft,
            input,
            spectrum,
            scratch,
            magnitudes,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Frequency resolution in Hz per bin
    pub fn frequency_resolution(&self) -> f64 {
        self.sample_rate / self.size as f64
    }

    pub fn bin_to_frequency(&self, bin: f64) -> f64 {
        bin * self.frequency_resolution()
    }

    /// Magnitude of each non-negative frequency bin, scaled so the largest
    /// bin is 1.0. An all-zero window yields all zeros.
    pub fn magnitude_spectrum(&mut self, samples: &[f64]) -> Result<&[f64]> {
        if samples.len() != self.size {
            return Err(CoreError::BufferSizeMismatch {
                expected: self.size,
                actual: samples.len(),
            });
        }

        self.input.copy_from_slice(samples);
        self.fft
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| CoreError::FftError {
                msg: format!("forward transform failed: {:?}", e),
            })?;

        for (mag, bin) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            *mag = bin.norm();
        }

        let peak = self.magnitudes.iter().cloned().fold(0.0, f64::max);
        if peak > 0.0 {
            self.magnitudes.iter_mut().for_each(|m| *m /= peak);
        }

        Ok(&self.magnitudes)
    }

    /// Dominant frequency of the window in Hz.
    ///
    /// The strongest bin is refined with a parabolic fit over its two
    /// neighbours. Silence reports 0 Hz.
    pub fn peak_frequency(&mut self, samples: &[f64]) -> Result<f64> {
        let resolution = self.frequency_resolution();
        let magnitudes = self.magnitude_spectrum(samples)?;

        let (peak_bin, peak) = magnitudes
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &m)| if m > best.1 { (i, m) } else { best });

        if peak == 0.0 {
            return Ok(0.0);
        }

        let mut bin = peak_bin as f64;
        if peak_bin > 0 && peak_bin + 1 < magnitudes.len() {
            let (a, b, c) = (
                magnitudes[peak_bin - 1],
                magnitudes[peak_bin],
                magnitudes[peak_bin + 1],
            );
            let denominator = a - 2.0 * b + c;
            if denominator.abs() > f64::EPSILON {
                bin += (0.5 * (a - c) / denominator).clamp(-0.5, 0.5);
            }
        }

        Ok(bin * resolution)
    }
}
