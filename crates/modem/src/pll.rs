//! Digital PLL clock recovery for binary tone streams
//!
//! Recovers one sampling instant per tone from a noisy binary signal. Each
//! transition nudges the phase accumulator towards the nearest symbol
//! boundary through a first-order IIR loop filter; a second filter tracks
//! the timing jitter that drives the lock detector.

use crate::Result;
use tonelink_core::filter::{Filter, IirFilter};

// First-order Bessel low-pass, 64 Hz nominal, for the loop
const LOOP_B: [f64; 2] = [0.144668495309, 0.144668495309];
const LOOP_A: [f64; 2] = [1.0, -0.710663009381];

// First-order Bessel low-pass, 40 Hz nominal, for the lock estimate
const LOCK_B: [f64; 2] = [0.0951079834025, 0.0951079834025];
const LOCK_A: [f64; 2] = [1.0, -0.809784033195];

const LOCKED_GAIN: f64 = 0.012;
const UNLOCKED_GAIN: f64 = 0.048;

/// Force a correction after this many tone periods without a transition
const MAX_BITS_WITHOUT_TRANSITION: f64 = 127.0;

/// Two-threshold detector: on at or below `minimum`, off at or above
/// `maximum`, unchanged in between.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    minimum: f64,
    maximum: f64,
    active: bool,
}

impl Hysteresis {
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum,
            maximum,
            active: false,
        }
    }

    pub fn check(&mut self, value: f64) -> bool {
        if value <= self.minimum {
            self.active = true;
        } else if value >= self.maximum {
            self.active = false;
        }
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}

#[derive(Debug, Clone)]
pub struct DigitalPll {
    samples_per_symbol: f64,
    limit: f64,
    lock: Hysteresis,
    loop_filter: IirFilter,
    lock_filter: IirFilter,
    last: bool,
    count: f64,
    jitter: f64,
    bits: f64,
}

impl DigitalPll {
    pub fn new(sample_rate: f64, symbol_rate: f64) -> Result<Self> {
        let samples_per_symbol = sample_rate / symbol_rate;
        Ok(Self {
            samples_per_symbol,
            limit: samples_per_symbol / 2.0,
            lock: Hysteresis::new(samples_per_symbol * 0.025, samples_per_symbol * 0.15),
            loop_filter: IirFilter::new(LOOP_B.to_vec(), LOOP_A.to_vec())?,
            lock_filter: IirFilter::new(LOCK_B.to_vec(), LOCK_A.to_vec())?,
            last: false,
            count: 0.0,
            jitter: 10.0,
            bits: 1.0,
        })
    }

    /// Feed one binary sample. Returns `true` when the current sample falls
    /// on a recovered symbol centre.
    pub fn update(&mut self, input: bool) -> bool {
        let mut sample = false;

        if input != self.last || self.bits > MAX_BITS_WITHOUT_TRANSITION {
            self.last = input;

            if self.count > self.limit {
                self.count -= self.samples_per_symbol;
            }

            let offset = self.count / self.bits;
            let correction = self.loop_filter.process_sample(offset);
            self.jitter = self.lock_filter.process_sample(offset.abs());
            let locked = self.lock.check(self.jitter);

            let gain = if locked { LOCKED_GAIN } else { UNLOCKED_GAIN };
            self.count -= correction * self.samples_per_symbol * gain;

            self.bits = 1.0;
        } else if self.count > self.limit {
            sample = true;
            self.count -= self.samples_per_symbol;
            self.bits += 1.0;
        }

        self.count += 1.0;
        sample
    }

    pub fn locked(&self) -> bool {
        self.lock.is_active()
    }

    /// Filtered magnitude of recent timing offsets, in samples
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn samples_per_symbol(&self) -> f64 {
        self.samples_per_symbol
    }

    pub fn reset(&mut self) {
        self.lock.reset();
        self.loop_filter.reset();
        self.lock_filter.reset();
        self.last = false;
        self.count = 0.0;
        self.jitter = 10.0;
        self.bits = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Alternating square wave at `sps` samples per symbol with each edge
    /// moved by up to `jitter` samples.
    fn jittered_square(periods: usize, sps: usize, jitter: i64, seed: u64) -> Vec<bool> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(periods * sps);
        let mut level = false;
        let mut carry: i64 = 0;
        for _ in 0..periods {
            let shift = if jitter > 0 { rng.gen_range(-jitter..=jitter) } else { 0 };
            let len = (sps as i64 + shift - carry).max(1);
            carry = shift;
            out.extend(std::iter::repeat(level).take(len as usize));
            level = !level;
        }
        out
    }

    #[test]
    fn test_hysteresis() {
        let mut h = Hysteresis::new(1.0, 3.0);
        assert!(!h.check(2.0));
        assert!(h.check(0.5));
        assert!(h.check(2.0));
        assert!(h.check(2.9));
        assert!(!h.check(3.0));
        assert!(!h.check(1.5));
    }

    #[test]
    fn test_one_sample_per_symbol() {
        let mut pll = DigitalPll::new(48000.0, 1920.0).unwrap();
        let signal = jittered_square(400, 25, 0, 1);
        let samples = signal.iter().filter(|&&bit| pll.update(bit)).count();
        assert!((398..=402).contains(&samples), "got {} samples", samples);
    }

    #[test]
    fn test_locks_on_clean_signal() {
        let mut pll = DigitalPll::new(48000.0, 1920.0).unwrap();
        let signal = jittered_square(200, 25, 0, 2);
        let lock_at = signal
            .iter()
            .enumerate()
            .find_map(|(i, &bit)| {
                pll.update(bit);
                pll.locked().then_some(i)
            })
            .expect("never locked");
        assert!(lock_at < 100 * 25, "locked after {} samples", lock_at);
    }

    #[test]
    fn test_stays_locked_with_jitter() {
        let mut pll = DigitalPll::new(48000.0, 1920.0).unwrap();

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..2000 {
            pll.update(rng.gen_bool(0.5));
        }

        let signal = jittered_square(1000, 25, 2, 3);
        let mut lock_at = None;
        let mut unlocks = 0;
        for (i, &bit) in signal.iter().enumerate() {
            pll.update(bit);
            match (lock_at, pll.locked()) {
                (None, true) => lock_at = Some(i),
                (Some(_), false) => unlocks += 1,
                _ => {}
            }
        }

        let lock_at = lock_at.expect("never locked");
        assert!(lock_at < 200 * 25, "locked after {} samples", lock_at);
        assert_eq!(unlocks, 0);
    }

    #[test]
    fn test_samples_centred_in_symbols() {
        let mut pll = DigitalPll::new(48000.0, 1920.0).unwrap();
        let signal = jittered_square(400, 25, 0, 4);
        let instants: Vec<usize> = signal
            .iter()
            .enumerate()
            .filter_map(|(i, &bit)| pll.update(bit).then_some(i))
            .collect();

        // After settling, every decision lands away from the symbol edges
        for &i in instants.iter().skip(200) {
            let phase = i % 25;
            assert!((4..=21).contains(&phase), "sample at phase {}", phase);
        }
    }
}
