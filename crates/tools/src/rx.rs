//! Batch receiver: decode one packet from a complete recording

use tonelink_frame::packet::PacketCodec;
use tonelink_modem::common::{ModulationConfig, Scheme, SyncScheme};
use tonelink_modem::fsk::FskDemodulator;
use tonelink_modem::mfsk::MfskDemodulator;
use tonelink_modem::sync::{MarkerMatcher, SilenceDetector, SweepDetector};
use tonelink_modem::tones::{bytes_to_tones, tones_to_bytes};
use tracing::{debug, info};

use crate::config::Profile;
use crate::error::ReceiveError;

pub struct Receiver {
    config: ModulationConfig,
    codec: PacketCodec,
}

impl Receiver {
    pub fn new(profile: &Profile) -> Result<Self, ReceiveError> {
        profile.modulation.validate()?;
        Ok(Self {
            config: profile.modulation.clone(),
            codec: PacketCodec::new(profile.packet.clone())?,
        })
    }

    /// Decode the first packet in `samples`
    pub fn receive(&self, samples: &[i16]) -> Result<Vec<u8>, ReceiveError> {
        let tones = match self.config.scheme {
            Scheme::Fsk => self.fsk_tones(samples)?,
            Scheme::Mfsk => self.mfsk_tones(samples)?,
        };

        let bytes = tones_to_bytes(&tones, self.config.tone_bits, self.config.use_gray)?;
        debug!(tones = tones.len(), bytes = bytes.len(), "unpacking");
        let payload = self.codec.unpack(&bytes)?;
        info!(bytes = payload.len(), "decoded packet");
        Ok(payload)
    }

    /// Bits following the start marker
    fn fsk_tones(&self, samples: &[i16]) -> Result<Vec<u8>, ReceiveError> {
        let SyncScheme::Marker { marker, .. } = &self.config.sync else {
            return Err(ReceiveError::NoStartMarker);
        };

        let bits = FskDemodulator::new(&self.config)?.demodulate(samples);
        let mut matcher = MarkerMatcher::new(bytes_to_tones(marker.as_bytes(), 1, false)?)?;
        let start = matcher.find(&bits).ok_or(ReceiveError::NoStartMarker)?;
        debug!(bits = bits.len(), start, "start marker found");
        Ok(bits[start..].to_vec())
    }

    /// Data tones from the first midpoint up to the end tone
    fn mfsk_tones(&self, samples: &[i16]) -> Result<Vec<u8>, ReceiveError> {
        let midpoint = match self.config.sync {
            SyncScheme::Sweep { .. } => {
                SweepDetector::new(&self.config)?.find_first_tone_midpoint(samples)?
            }
            SyncScheme::Silence { .. } => SilenceDetector::new(&self.config)?
                .find_end_of_silence(samples)
                .map(|i| i + self.config.samples_per_tone() / 2),
            SyncScheme::Marker { .. } => None,
        }
        .ok_or(ReceiveError::NoStartMarker)?;

        Ok(MfskDemodulator::new(&self.config)?.tones_from(samples, midpoint)?)
    }
}
