//! Real-time receive pipeline
//!
//! A capture task feeds fixed-size chunks into a bounded queue; the
//! processing loop drains it on the profile's interval and runs the
//! [`StreamProcessor`]. In real-time mode the capture side never waits: a
//! full queue drops the newest chunk. A consumer that falls behind loses
//! the oldest audio to ring buffer overwrite, reported as an overrun.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::stream::{StreamEvent, StreamProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    /// Pace capture at the sample rate and drop chunks on a full queue.
    /// Otherwise the capture side waits for room and nothing is dropped.
    pub realtime: bool,
}

/// Counts gathered over one listening session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenReport {
    pub packets: usize,
    pub corrupt: usize,
    pub desyncs: usize,
    pub faults: usize,
    pub overruns: usize,
    pub lost_samples: u64,
    pub dropped_chunks: usize,
}

impl ListenReport {
    fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Packet(_) => self.packets += 1,
            StreamEvent::Corrupt(_) => self.corrupt += 1,
            StreamEvent::Desynchronized { .. } => self.desyncs += 1,
            StreamEvent::Fault(_) => self.faults += 1,
            StreamEvent::Overrun { lost } => {
                self.overruns += 1;
                self.lost_samples += lost;
            }
        }
    }
}

/// Play `audio` through the streaming receiver as if it were being
/// captured, calling `on_event` for everything the receiver reports.
pub async fn listen<F>(
    profile: &Profile,
    audio: Vec<i16>,
    options: ListenOptions,
    mut on_event: F,
) -> Result<ListenReport>
where
    F: FnMut(&StreamEvent),
{
    let mut processor = StreamProcessor::new(profile).context("Invalid profile")?;
    let stream = &profile.stream;
    let (tx, mut rx) = mpsc::channel::<Vec<i16>>(stream.queue_depth);

    let chunk_samples = stream.chunk_samples;
    let chunk_period =
        Duration::from_secs_f64(chunk_samples as f64 / profile.modulation.sample_rate as f64);
    let realtime = options.realtime;

    let capture = tokio::spawn(async move {
        let mut pace = interval(chunk_period);
        let mut dropped = 0usize;

        for chunk in audio.chunks(chunk_samples) {
            if realtime {
                pace.tick().await;
                match tx.try_send(chunk.to_vec()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        warn!(dropped, "capture queue full, chunk dropped");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            } else if tx.send(chunk.to_vec()).await.is_err() {
                break;
            }
        }
        dropped
    });

    let mut report = ListenReport::default();
    let mut ticker = interval(Duration::from_millis(stream.processing_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut finished = false;
        let mut received = 0usize;
        loop {
            match rx.try_recv() {
                Ok(chunk) => {
                    if processor.headroom() < chunk.len() {
                        for event in processor.process() {
                            report.record(&event);
                            on_event(&event);
                        }
                    }
                    processor.push_samples(&chunk);
                    received += chunk.len();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }

        for event in processor.process() {
            report.record(&event);
            on_event(&event);
        }
        debug!(received, state = ?processor.state(), "processing tick");

        if finished {
            break;
        }
    }

    report.dropped_chunks = capture.await.context("Capture task failed")?;
    info!(?report, "listening finished");
    Ok(report)
}
