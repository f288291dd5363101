//! Digital filter implementations

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Generic filter trait
pub trait Filter<T: Copy> {
    /// Process a single sample
    fn process_sample(&mut self, input: T) -> T;

    /// Process a buffer of samples
    fn process_buffer(&mut self, input: &[T], output: &mut [T]) -> Result<()> {
        if input.len() != output.len() {
            return Err(CoreError::BufferSizeMismatch {
                expected: input.len(),
                actual: output.len(),
            });
        }

        for (out, sample) in output.iter_mut().zip(input) {
            *out = self.process_sample(*sample);
        }

        Ok(())
    }

    /// Reset the filter state
    fn reset(&mut self);
}

/// Symmetric window used for FIR design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Hann,
    Hamming,
    Blackman,
}

impl WindowKind {
    /// Window coefficient `i` of an `n`-point symmetric window
    pub fn value(self, i: usize, n: usize) -> f64 {
        if n < 2 {
            return 1.0;
        }
        let phase = 2.0 * PI * i as f64 / (n - 1) as f64;
        match self {
            WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
            WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowKind::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
        }
    }

    /// Multiply `signal` by this window in place
    pub fn apply(self, signal: &mut [f64]) {
        let n = signal.len();
        for (i, sample) in signal.iter_mut().enumerate() {
            *sample *= self.value(i, n);
        }
    }
}

/// Finite Impulse Response (FIR) filter
#[derive(Debug, Clone)]
pub struct FirFilter {
    coefficients: Vec<f64>,
    delay_line: Vec<f64>,
    index: usize,
}

impl FirFilter {
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(CoreError::InvalidFilterParameters {
                msg: "FIR filter needs at least one tap".into(),
            });
        }
        Ok(Self {
            delay_line: vec![0.0; coefficients.len()],
            coefficients,
            index: 0,
        })
    }

    /// Windowed-sinc low-pass filter scaled to unity gain at DC
    pub fn lowpass(
        cutoff_freq: f64,
        sample_rate: f64,
        num_taps: usize,
        window: WindowKind,
    ) -> Result<Self> {
        if sample_rate <= 0.0 {
            return Err(CoreError::InvalidSampleRate { rate: sample_rate });
        }

        if cutoff_freq <= 0.0 || cutoff_freq >= sample_rate / 2.0 {
            return Err(CoreError::InvalidFilterParameters {
                msg: format!("cutoff {} Hz outside (0, {}) Hz", cutoff_freq, sample_rate / 2.0),
            });
        }

        if num_taps == 0 {
            return Err(CoreError::InvalidFilterParameters {
                msg: "low-pass needs at least one tap".into(),
            });
        }

        let normalized_cutoff = 2.0 * cutoff_freq / sample_rate;
        let center = (num_taps - 1) as f64 / 2.0;

        let mut coefficients: Vec<f64> = (0..num_taps)
            .map(|i| {
                let n = i as f64 - center;
                let sinc = if n == 0.0 {
                    normalized_cutoff
                } else {
                    (PI * normalized_cutoff * n).sin() / (PI * n)
                };
                sinc * window.value(i, num_taps)
            })
            .collect();

        let dc_gain: f64 = coefficients.iter().sum();
        if dc_gain.abs() < f64::EPSILON {
            return Err(CoreError::InvalidFilterParameters {
                msg: "Low-pass design has zero DC gain".to_string(),
            });
        }
        coefficients.iter_mut().for_each(|c| *c /= dc_gain);

        Self::new(coefficients)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Group delay in samples of this linear-phase filter
    pub fn delay(&self) -> usize {
        (self.coefficients.len() - 1) / 2
    }
}

impl Filter<f64> for FirFilter {
    fn process_sample(&mut self, input: f64) -> f64 {
        self.delay_line[self.index] = input;

        let len = self.delay_line.len();
        let mut output = 0.0;
        for (i, &coeff) in self.coefficients.iter().enumerate() {
            let delay_index = (self.index + len - i) % len;
            output += coeff * self.delay_line[delay_index];
        }

        self.index = (self.index + 1) % len;

        output
    }

    fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.index = 0;
    }
}

/// Direct form I recursive filter, normalised by `a[0]`
#[derive(Debug, Clone)]
pub struct IirFilter {
    b: Vec<f64>,
    a: Vec<f64>,
    inputs: Vec<f64>,
    outputs: Vec<f64>,
}

impl IirFilter {
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self> {
        if b.is_empty() {
            return Err(CoreError::InvalidFilterParameters {
                msg: "recursive filter needs feedforward coefficients".into(),
            });
        }
        match a.first() {
            Some(&a0) if a0 != 0.0 => Ok(Self {
                inputs: vec![0.0; b.len()],
                outputs: vec![0.0; a.len()],
                b,
                a,
            }),
            leading => Err(CoreError::InvalidFilterParameters {
                msg: format!("leading feedback coefficient must be non-zero, got {:?}", leading),
            }),
        }
    }
}

impl Filter<f64> for IirFilter {
    fn process_sample(&mut self, input: f64) -> f64 {
        self.inputs.rotate_right(1);
        self.inputs[0] = input;

        let feedforward: f64 = self.b.iter().zip(&self.inputs).map(|(b, x)| b * x).sum();
        // outputs[0] is y[n-1] until the shift below
        let feedback: f64 = self.a.iter().skip(1).zip(&self.outputs).map(|(a, y)| a * y).sum();
        let output = (feedforward - feedback) / self.a[0];

        self.outputs.rotate_right(1);
        self.outputs[0] = output;
        output
    }

    fn reset(&mut self) {
        self.inputs.fill(0.0);
        self.outputs.fill(0.0);
    }
}

/// Discrete convolution trimmed to the length of `signal`, keeping the
/// centre `signal.len()` samples of the full result.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return signal.to_vec();
    }

    let offset = (kernel.len() - 1) / 2;
    let last = signal.len() as isize - 1;

    (0..signal.len())
        .map(|n| {
            // full-convolution index of this output sample
            let full = (n + offset) as isize;
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, &h)| {
                    let i = full - k as isize;
                    (0..=last).contains(&i).then(|| h * signal[i as usize])
                })
                .sum::<f64>()
        })
        .collect()
}
