//! Binary FSK demodulation
//!
//! Receive chain per sample: sign, XOR with the sign half a tone earlier
//! (comb filter), map to ±1, windowed-sinc low-pass, sign again, then the
//! digital PLL picks one bit per tone.

use crate::common::{DecodedTone, Demodulator, ModulationConfig, PacketEnd, SyncScheme};
use crate::error::config_error;
use crate::pll::DigitalPll;
use crate::sync::MarkerMatcher;
use crate::tones::bytes_to_tones;
use crate::Result;
use std::collections::VecDeque;
use tonelink_core::buffer::RingBuffer;
use tonelink_core::filter::{Filter, FirFilter};
use tracing::debug;

/// Samples pulled from the ring buffer per read
const READ_CHUNK: u64 = 4096;

/// XOR of the current sign bit with the one `delay` samples earlier.
/// High while the carrier period is close to twice the delay.
#[derive(Debug, Clone)]
pub struct CombFilter {
    history: VecDeque<bool>,
    delay: usize,
}

impl CombFilter {
    pub fn new(delay: usize) -> Self {
        Self {
            history: VecDeque::from(vec![false; delay]),
            delay,
        }
    }

    pub fn process(&mut self, positive: bool) -> bool {
        if self.delay == 0 {
            return false;
        }
        self.history.push_back(positive);
        let delayed = self.history.pop_front().unwrap_or(false);
        positive ^ delayed
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|b| *b = false);
    }
}

#[derive(Debug, Clone)]
pub struct FskDemodulator {
    comb: CombFilter,
    lowpass: FirFilter,
    pll: DigitalPll,
}

impl FskDemodulator {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        let sample_rate = config.sample_rate as f64;
        Ok(Self {
            comb: CombFilter::new(config.samples_per_tone() / 2),
            lowpass: FirFilter::lowpass(
                config.lowpass.cutoff,
                sample_rate,
                config.lowpass.taps,
                config.lowpass.window,
            )?,
            pll: DigitalPll::new(sample_rate, config.tones_per_second as f64)?,
        })
    }

    /// Feed one PCM sample; yields a bit when the PLL marks a tone centre.
    pub fn process_sample(&mut self, sample: i16) -> Option<u8> {
        let xored = self.comb.process(sample > 0);
        let level = self.lowpass.process_sample(if xored { 1.0 } else { -1.0 });
        let bit = level > 0.0;
        self.pll.update(bit).then_some(bit as u8)
    }

    /// Demodulate a whole recording into bits
    pub fn demodulate(&mut self, samples: &[i16]) -> Vec<u8> {
        samples
            .iter()
            .filter_map(|&s| self.process_sample(s))
            .collect()
    }

    pub fn pll(&self) -> &DigitalPll {
        &self.pll
    }

    pub fn reset(&mut self) {
        self.comb.reset();
        self.lowpass.reset();
        self.pll.reset();
    }
}

/// Streaming FSK receiver: finds the start marker in the demodulated bit
/// stream, then hands out one bit per tone.
#[derive(Debug, Clone)]
pub struct FskReceiver {
    demodulator: FskDemodulator,
    matcher: MarkerMatcher,
    sync_span: usize,
}

impl FskReceiver {
    pub fn new(config: &ModulationConfig) -> Result<Self> {
        let SyncScheme::Marker { marker, .. } = &config.sync else {
            return Err(config_error("FSK receiver needs marker synchronization"));
        };

        Ok(Self {
            demodulator: FskDemodulator::new(config)?,
            matcher: MarkerMatcher::new(bytes_to_tones(marker.as_bytes(), 1, false)?)?,
            sync_span: config.sync_span(),
        })
    }

    pub fn demodulator(&self) -> &FskDemodulator {
        &self.demodulator
    }

    /// Run samples from `cursor` up to the write position through the
    /// chain until `on_bit` returns true.
    fn feed_until(
        &mut self,
        ring: &RingBuffer,
        cursor: &mut u64,
        mut on_bit: impl FnMut(&mut Self, u8) -> bool,
    ) -> Result<bool> {
        let end = ring.write_position();
        while *cursor < end {
            let len = (end - *cursor).min(READ_CHUNK) as usize;
            let chunk = ring.read_vec(*cursor, len)?;
            for (i, &sample) in chunk.iter().enumerate() {
                if let Some(bit) = self.demodulator.process_sample(sample) {
                    if on_bit(self, bit) {
                        *cursor += i as u64 + 1;
                        return Ok(true);
                    }
                }
            }
            *cursor += len as u64;
        }
        Ok(false)
    }
}

impl Demodulator for FskReceiver {
    fn acquire(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<bool> {
        let found = self.feed_until(ring, cursor, |rx, bit| rx.matcher.push(bit))?;
        if found {
            debug!(
                position = *cursor,
                locked = self.demodulator.pll().locked(),
                "start marker found"
            );
        }
        Ok(found)
    }

    fn next_tone(&mut self, ring: &RingBuffer, cursor: &mut u64) -> Result<Option<DecodedTone>> {
        let mut decoded = None;
        self.feed_until(ring, cursor, |_, bit| {
            decoded = Some(DecodedTone::Data(bit));
            true
        })?;
        Ok(decoded)
    }

    fn packet_end(&self) -> PacketEnd {
        PacketEnd::Length
    }

    fn trailer_tone(&self) -> DecodedTone {
        DecodedTone::Data(1)
    }

    fn lookbehind(&self) -> usize {
        0
    }

    fn sync_span(&self) -> usize {
        self.sync_span
    }

    fn reset(&mut self) {
        self.matcher.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulator::ToneModulator;
    use crate::tones::tones_to_bytes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn transmission(payload: &[u8]) -> Vec<i16> {
        let modulator = ToneModulator::new(ModulationConfig::fsk()).unwrap();
        let tones = bytes_to_tones(payload, 1, false).unwrap();
        modulator.modulate(&tones).unwrap()
    }

    fn find_payload(bits: &[u8], len: usize) -> Option<Vec<u8>> {
        let marker = bytes_to_tones(b"RAPHBIN", 1, false).unwrap();
        let start = MarkerMatcher::new(marker).unwrap().find(bits)?;
        let end = (start + len * 8).min(bits.len());
        tones_to_bytes(&bits[start..end], 1, false).ok()
    }

    #[test]
    fn test_comb_filter_delay() {
        let mut comb = CombFilter::new(2);
        let out: Vec<bool> = [true, true, false, true, false]
            .iter()
            .map(|&b| comb.process(b))
            .collect();
        // compares with input two steps back (initially false)
        assert_eq!(out, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_clean_signal_decodes() {
        let mut samples = vec![0i16; 1000];
        samples.extend(transmission(b"hello, modem"));
        samples.extend(vec![0i16; 1000]);

        let mut demodulator = FskDemodulator::new(&ModulationConfig::fsk()).unwrap();
        let bits = demodulator.demodulate(&samples);
        assert_eq!(find_payload(&bits, 12).unwrap(), b"hello, modem");
        assert!(demodulator.pll().locked());
    }

    #[test]
    fn test_noisy_signal_decodes() {
        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0, 3000.0).unwrap();
        let samples: Vec<i16> = transmission(b"noisy")
            .into_iter()
            .map(|s| (s as f64 + noise.sample(&mut rng)).clamp(-32768.0, 32767.0) as i16)
            .collect();

        let mut demodulator = FskDemodulator::new(&ModulationConfig::fsk()).unwrap();
        let bits = demodulator.demodulate(&samples);
        assert_eq!(find_payload(&bits, 5).unwrap(), b"noisy");
    }

    #[test]
    fn test_receiver_streams_bits_after_marker() {
        let config = ModulationConfig::fsk();
        let mut receiver = FskReceiver::new(&config).unwrap();
        let mut ring = RingBuffer::new(1 << 16).unwrap();
        let mut cursor = 0u64;

        let payload = b"ok";
        let signal = transmission(payload);
        let (first, second) = signal.split_at(signal.len() / 3);

        ring.push(&vec![0i16; 500]);
        ring.push(first);
        // the marker is not complete in the first third
        assert!(!receiver.acquire(&ring, &mut cursor).unwrap());
        assert_eq!(cursor, ring.write_position());

        ring.push(second);
        assert!(receiver.acquire(&ring, &mut cursor).unwrap());

        let mut bits = Vec::new();
        while bits.len() < 16 {
            match receiver.next_tone(&ring, &mut cursor).unwrap() {
                Some(DecodedTone::Data(bit)) => bits.push(bit),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(tones_to_bytes(&bits, 1, false).unwrap(), payload);
        assert_eq!(receiver.trailer_tone(), DecodedTone::Data(1));
    }
}
