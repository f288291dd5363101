//! Tonelink Modem - Tone modulation and demodulation
//!
//! This crate turns data tones into audio and back again, for two
//! schemes: binary FSK with a PLL receiver and multi-tone FSK with an
//! FFT receiver.

pub mod common;
pub mod error;
pub mod fsk;
pub mod mfsk;
pub mod modulator;
pub mod pll;
pub mod sync;
pub mod tones;

pub use error::{ModemError, Result};

use common::{Demodulator, ModulationConfig, Scheme};

/// Build the streaming demodulator matching `config.scheme`.
pub fn demodulator_for(config: &ModulationConfig) -> Result<Box<dyn Demodulator>> {
    config.validate()?;
    Ok(match config.scheme {
        Scheme::Fsk => Box::new(fsk::FskReceiver::new(config)?),
        Scheme::Mfsk => Box::new(mfsk::MfskReceiver::new(config)?),
    })
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        common::{
            DecodedTone, Demodulator, ModulationConfig, PacketEnd, Scheme, Smoothing, SyncScheme,
        },
        demodulator_for,
        error::{ModemError, Result},
        fsk::{FskDemodulator, FskReceiver},
        mfsk::{MfskDemodulator, MfskReceiver},
        modulator::ToneModulator,
        pll::DigitalPll,
        sync::{MarkerMatcher, SilenceDetector, SweepDetector},
        tones::{bytes_to_tones, from_gray, to_gray, tones_to_bytes},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demodulator_for_scheme() {
        let fsk = demodulator_for(&ModulationConfig::fsk()).unwrap();
        assert_eq!(fsk.packet_end(), common::PacketEnd::Length);
        assert_eq!(fsk.lookbehind(), 0);

        let mfsk = demodulator_for(&ModulationConfig::mfsk()).unwrap();
        assert_eq!(mfsk.packet_end(), common::PacketEnd::EndTone);
        assert_eq!(mfsk.lookbehind(), ModulationConfig::mfsk().read_size());
    }
}
