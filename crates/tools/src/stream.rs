//! Streaming receiver
//!
//! [`StreamProcessor`] owns the ring buffer and all decoder state. The
//! capture side pushes samples, the processing side calls
//! [`StreamProcessor::process`] on a fixed cadence and gets back whatever
//! happened since the last call. Nothing in here returns an error: bad
//! audio only ever produces events and a return to waiting.

use tonelink_core::buffer::RingBuffer;
use tonelink_frame::packet::{PacketCodec, PacketHeader};
use tonelink_frame::FrameError;
use tonelink_modem::common::{DecodedTone, Demodulator, PacketEnd};
use tonelink_modem::tones::tones_to_bytes;
use tonelink_modem::{demodulator_for, ModemError};
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::error::ProfileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Looking for the start of a transmission
    Waiting,
    /// Collecting the tones of a packet
    Receiving,
    /// Skipping idle tones after an FSK packet
    IgnoringTrailingEndTones,
}

#[derive(Debug)]
pub enum StreamEvent {
    Packet(Vec<u8>),
    /// A packet was received but failed its checks
    Corrupt(FrameError),
    /// A tone outside the tone map; the packet was dropped
    Desynchronized { tone: i32 },
    /// Audio was overwritten before it was processed
    Overrun { lost: u64 },
    Fault(ModemError),
}

pub struct StreamProcessor {
    ring: RingBuffer,
    demodulator: Box<dyn Demodulator>,
    codec: PacketCodec,
    tone_bits: u8,
    use_gray: bool,
    state: ReceiverState,
    /// Absolute sample position the demodulator continues from
    cursor: u64,
    tones: Vec<u8>,
    /// Tones in the whole packet, known once the header is in
    expected_tones: Option<usize>,
}

impl StreamProcessor {
    pub fn new(profile: &Profile) -> Result<Self, ProfileError> {
        profile.validate()?;
        Ok(Self {
            ring: RingBuffer::new(profile.stream.buffer_capacity).map_err(ModemError::from)?,
            demodulator: demodulator_for(&profile.modulation)?,
            codec: PacketCodec::new(profile.packet.clone())?,
            tone_bits: profile.modulation.tone_bits,
            use_gray: profile.modulation.use_gray,
            state: ReceiverState::Waiting,
            cursor: 0,
            tones: Vec::new(),
            expected_tones: None,
        })
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Samples that can be pushed before unprocessed audio is overwritten
    pub fn headroom(&self) -> usize {
        self.ring.capacity() - self.ring.unconsumed()
    }

    /// Append captured audio. Returns the number of unprocessed samples
    /// that were overwritten.
    pub fn push_samples(&mut self, samples: &[i16]) -> usize {
        self.ring.push(samples)
    }

    /// Run the state machine over everything buffered so far.
    pub fn process(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.check_overrun(&mut events);

        loop {
            match self.step(&mut events) {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    warn!(error = %e, "demodulation failed, resynchronizing");
                    events.push(StreamEvent::Fault(e));
                    self.reset_to_waiting();
                    break;
                }
            }
        }

        self.ring.consume_to(self.retained_from());
        events
    }

    /// Oldest absolute position the demodulator may still read. While
    /// waiting, the cursor itself marks the audio worth keeping.
    fn retained_from(&self) -> u64 {
        match self.state {
            ReceiverState::Waiting => self.cursor,
            _ => self
                .cursor
                .saturating_sub(self.demodulator.lookbehind() as u64),
        }
    }

    fn check_overrun(&mut self, events: &mut Vec<StreamEvent>) {
        let needed = self.retained_from();
        let oldest = self.ring.oldest_available();
        if needed >= oldest {
            return;
        }

        let lost = oldest - needed;
        warn!(lost, state = ?self.state, "ring buffer overrun");
        events.push(StreamEvent::Overrun { lost });
        if self.state != ReceiverState::Waiting {
            self.reset_to_waiting();
        }
        self.cursor = oldest;
    }

    /// Advance by one acquisition or one tone. `false` when more audio is
    /// needed.
    fn step(&mut self, events: &mut Vec<StreamEvent>) -> Result<bool, ModemError> {
        match self.state {
            ReceiverState::Waiting => {
                if !self.demodulator.acquire(&self.ring, &mut self.cursor)? {
                    return Ok(false);
                }
                debug!(cursor = self.cursor, "transmission start");
                self.tones.clear();
                self.expected_tones = None;
                self.state = ReceiverState::Receiving;
            }
            ReceiverState::Receiving => {
                let Some(tone) = self.demodulator.next_tone(&self.ring, &mut self.cursor)? else {
                    return Ok(false);
                };
                match tone {
                    DecodedTone::Data(t) => {
                        self.tones.push(t);
                        self.after_data_tone(events)?;
                    }
                    DecodedTone::End => self.finish_packet(events)?,
                    DecodedTone::Invalid(t) => {
                        warn!(tone = t, received = self.tones.len(), "tone out of range");
                        events.push(StreamEvent::Desynchronized { tone: t });
                        self.reset_to_waiting();
                    }
                }
            }
            ReceiverState::IgnoringTrailingEndTones => {
                let Some(tone) = self.demodulator.next_tone(&self.ring, &mut self.cursor)? else {
                    return Ok(false);
                };
                if tone != self.demodulator.trailer_tone() {
                    debug!(cursor = self.cursor, "trailer over");
                    self.reset_to_waiting();
                }
            }
        }
        Ok(true)
    }

    fn after_data_tone(&mut self, events: &mut Vec<StreamEvent>) -> Result<(), ModemError> {
        let bits = self.tone_bits as usize;

        if self.tones.len() == PacketHeader::SIZE * 8 / bits {
            let header = tones_to_bytes(&self.tones, self.tone_bits, self.use_gray)?;
            match self.codec.get_size(&header) {
                Ok(size) => {
                    debug!(size, "packet header");
                    self.expected_tones = Some((PacketHeader::SIZE + size) * 8 / bits);
                }
                Err(e) => {
                    warn!(error = %e, "discarding packet");
                    events.push(StreamEvent::Corrupt(e));
                    self.reset_to_waiting();
                    return Ok(());
                }
            }
        }

        let Some(expected) = self.expected_tones else {
            return Ok(());
        };
        match self.demodulator.packet_end() {
            PacketEnd::Length if self.tones.len() >= expected => self.finish_packet(events),
            // end tone misread as data: the packet is already complete
            PacketEnd::EndTone if self.tones.len() > expected => self.finish_packet(events),
            _ => Ok(()),
        }
    }

    fn finish_packet(&mut self, events: &mut Vec<StreamEvent>) -> Result<(), ModemError> {
        let bytes = tones_to_bytes(&self.tones, self.tone_bits, self.use_gray)?;
        match self.codec.unpack(&bytes) {
            Ok(payload) => {
                info!(bytes = payload.len(), "packet received");
                events.push(StreamEvent::Packet(payload));
            }
            Err(e) => {
                warn!(error = %e, tones = self.tones.len(), "discarding packet");
                events.push(StreamEvent::Corrupt(e));
            }
        }

        match self.demodulator.packet_end() {
            PacketEnd::Length => {
                self.tones.clear();
                self.expected_tones = None;
                self.state = ReceiverState::IgnoringTrailingEndTones;
            }
            PacketEnd::EndTone => self.reset_to_waiting(),
        }
        Ok(())
    }

    fn reset_to_waiting(&mut self) {
        self.state = ReceiverState::Waiting;
        self.tones.clear();
        self.expected_tones = None;
        self.demodulator.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::Transmitter;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tonelink_modem::common::ModulationConfig;
    use tonelink_modem::modulator::ToneModulator;
    use tonelink_modem::tones::bytes_to_tones;

    /// Feed in capture-sized chunks, processing after each one
    fn feed(processor: &mut StreamProcessor, samples: &[i16]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for chunk in samples.chunks(2048) {
            processor.push_samples(chunk);
            events.extend(processor.process());
        }
        events
    }

    fn packets(events: &[StreamEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Packet(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn noise(len: usize, seed: u64) -> Vec<i16> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-3000..=3000)).collect()
    }

    #[test]
    fn test_fsk_back_to_back_packets() {
        let profile = Profile::fsk();
        let tx = Transmitter::new(&profile).unwrap();
        let mut rng = StdRng::seed_from_u64(10);

        let mut audio = tx.transmit_with_rng(b"first packet", &mut rng).unwrap();
        audio.extend(tx.transmit_with_rng(b"second", &mut rng).unwrap());

        let mut processor = StreamProcessor::new(&profile).unwrap();
        let events = feed(&mut processor, &audio);
        assert_eq!(packets(&events), vec![b"first packet".to_vec(), b"second".to_vec()]);
        assert_eq!(processor.state(), ReceiverState::Waiting);
    }

    #[test]
    fn test_mfsk_stream_test_123() {
        let profile = Profile::mfsk();
        let tx = Transmitter::new(&profile).unwrap();
        let audio = tx
            .transmit_with_rng(b"test 123", &mut StdRng::seed_from_u64(11))
            .unwrap();

        let mut processor = StreamProcessor::new(&profile).unwrap();
        let events = feed(&mut processor, &audio);
        assert_eq!(packets(&events), vec![b"test 123".to_vec()]);
        assert_eq!(events.len(), 1);
        assert_eq!(processor.state(), ReceiverState::Waiting);
    }

    #[test]
    fn test_silence_stays_waiting() {
        for profile in [Profile::fsk(), Profile::mfsk()] {
            let mut processor = StreamProcessor::new(&profile).unwrap();
            let events = feed(&mut processor, &vec![0i16; 200_000]);
            assert!(events.is_empty());
            assert_eq!(processor.state(), ReceiverState::Waiting);
            assert!(processor.ring().unconsumed() <= profile.modulation.sync_span());
        }
    }

    #[test]
    fn test_checksum_mismatch_reported() {
        let profile = Profile::fsk();
        let codec = PacketCodec::new(profile.packet.clone()).unwrap();
        let mut packet = codec.pack(b"flipped").unwrap();
        packet[6] ^= 0x10;

        let modulator = ToneModulator::new(profile.modulation.clone()).unwrap();
        let mut audio = noise(5000, 1);
        audio.extend(modulator.modulate(&bytes_to_tones(&packet, 1, false).unwrap()).unwrap());
        audio.extend(noise(5000, 2));

        let mut processor = StreamProcessor::new(&profile).unwrap();
        let events = feed(&mut processor, &audio);
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Corrupt(FrameError::ChecksumMismatch { .. })]
        ));
        assert_eq!(processor.state(), ReceiverState::Waiting);
    }

    #[test]
    fn test_oversized_header_dropped_early() {
        let profile = Profile::mfsk();
        let mut packet = vec![0x13, 0x88, 0, 0]; // claims 5000 bytes
        packet.extend_from_slice(&[0xaa; 6]);

        let modulator = ToneModulator::new(profile.modulation.clone()).unwrap();
        let audio = modulator.modulate(&bytes_to_tones(&packet, 4, false).unwrap()).unwrap();

        let mut processor = StreamProcessor::new(&profile).unwrap();
        let events = feed(&mut processor, &audio);
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Corrupt(FrameError::TooLarge { size: 5000, .. })]
        ));
    }

    #[test]
    fn test_out_of_range_tone_desynchronizes() {
        let profile = Profile::mfsk();
        // same sweep, wider tone spacing: tone 15 lands on index 18
        let wide = ModulationConfig {
            freq_spacing: 440.0,
            ..profile.modulation.clone()
        };
        let audio = ToneModulator::new(wide).unwrap().modulate(&[0, 15, 3]).unwrap();

        let mut processor = StreamProcessor::new(&profile).unwrap();
        let events = feed(&mut processor, &audio);
        assert!(matches!(events.as_slice(), [StreamEvent::Desynchronized { tone: 18 }]));
        assert_eq!(processor.state(), ReceiverState::Waiting);
    }

    #[test]
    fn test_overrun_resets_receiver() {
        let mut profile = Profile::mfsk();
        profile.stream.buffer_capacity = 64 * 1024;
        profile.stream.processing_interval_ms = 100;

        let codec = PacketCodec::new(profile.packet.clone()).unwrap();
        let packet = codec.pack(&[0x42; 100]).unwrap();
        let modulator = ToneModulator::new(profile.modulation.clone()).unwrap();
        let audio = modulator
            .modulate(&bytes_to_tones(&packet, 4, false).unwrap())
            .unwrap();

        let mut processor = StreamProcessor::new(&profile).unwrap();
        // sweep and a few tones, then the consumer stalls
        feed(&mut processor, &audio[..56_000]);
        assert_eq!(processor.state(), ReceiverState::Receiving);

        let lost = processor.push_samples(&noise(100_000, 3));
        assert!(lost > 0);
        let events = processor.process();
        assert!(matches!(events.first(), Some(StreamEvent::Overrun { .. })));
        assert_eq!(processor.state(), ReceiverState::Waiting);
    }
}
