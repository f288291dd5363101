//! Transmitter: payload bytes to PCM audio

use rand::Rng;
use tonelink_frame::packet::PacketCodec;
use tonelink_modem::modulator::ToneModulator;
use tonelink_modem::tones::bytes_to_tones;
use tracing::info;

use crate::config::{Profile, TransmitConfig};
use crate::error::TransmitError;

pub struct Transmitter {
    modulator: ToneModulator,
    codec: PacketCodec,
    noise: TransmitConfig,
}

impl Transmitter {
    pub fn new(profile: &Profile) -> Result<Self, TransmitError> {
        Ok(Self {
            modulator: ToneModulator::new(profile.modulation.clone())?,
            codec: PacketCodec::new(profile.packet.clone())?,
            noise: profile.transmit.clone(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.modulator.config().sample_rate
    }

    /// Packet, tones and audio for `payload`, without wake-up noise
    pub fn modulate(&self, payload: &[u8]) -> Result<Vec<i16>, TransmitError> {
        let config = self.modulator.config();
        let packet = self.codec.pack(payload)?;
        let tones = bytes_to_tones(&packet, config.tone_bits, config.use_gray)?;
        let samples = self.modulator.modulate(&tones)?;

        info!(
            payload = payload.len(),
            packet = packet.len(),
            tones = tones.len(),
            seconds = samples.len() as f64 / config.sample_rate as f64,
            "modulated packet"
        );
        Ok(samples)
    }

    /// Full transmission with wake-up noise on both sides
    pub fn transmit(&self, payload: &[u8]) -> Result<Vec<i16>, TransmitError> {
        self.transmit_with_rng(payload, &mut rand::thread_rng())
    }

    pub fn transmit_with_rng<R: Rng>(
        &self,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<Vec<i16>, TransmitError> {
        let signal = self.modulate(payload)?;

        let mut samples = Vec::with_capacity(signal.len() + 2 * self.noise.noise_samples);
        samples.extend(self.noise_burst(rng));
        samples.extend(signal);
        samples.extend(self.noise_burst(rng));
        Ok(samples)
    }

    fn noise_burst<R: Rng>(&self, rng: &mut R) -> Vec<i16> {
        let level = self.noise.noise_level;
        if level <= 0.0 {
            return vec![0; self.noise.noise_samples];
        }
        (0..self.noise.noise_samples)
            .map(|_| rng.gen_range(-level..=level) as i16)
            .collect()
    }
}
