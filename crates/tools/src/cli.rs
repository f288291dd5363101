//! Command line arguments and the commands behind them

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::common::{read_wav, resolve_profile, save_config, write_wav};
use crate::config::Profile;
use crate::listen::{listen, ListenOptions};
use crate::rx::Receiver;
use crate::stream::StreamEvent;
use crate::tx::Transmitter;

/// Which link settings to use
#[derive(Parser, Debug, Clone)]
pub struct ProfileArgs {
    /// Profile file (JSON or TOML)
    #[arg(long, global = true)]
    pub profile: Option<PathBuf>,

    /// Built-in profile when no file is given: fsk or mfsk
    #[arg(long, global = true, default_value = "mfsk")]
    pub preset: String,

    /// Compress payloads, overriding the profile
    #[arg(long, global = true)]
    pub compress: bool,
}

impl ProfileArgs {
    pub fn resolve(&self) -> Result<Profile> {
        let mut profile = resolve_profile(self.profile.as_deref(), &self.preset)?;
        if self.compress {
            profile.packet.compress = true;
        }
        Ok(profile)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct TxArgs {
    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Text to transmit
    #[arg(short, long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File whose bytes to transmit
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Leave out the wake-up noise
    #[arg(long)]
    pub no_noise: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RxArgs {
    /// Input WAV file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the payload here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListenArgs {
    /// WAV file replayed as live capture
    #[arg(short, long)]
    pub input: PathBuf,

    /// Replay at the sample rate, dropping chunks the receiver cannot take
    #[arg(long)]
    pub realtime: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {
    /// Also write the resolved profile to this file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

pub fn run_tx(profile: &Profile, args: &TxArgs) -> Result<()> {
    let payload = match (&args.text, &args.file) {
        (Some(text), _) => text.as_bytes().to_vec(),
        (None, Some(path)) => {
            std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?
        }
        (None, None) => anyhow::bail!("Either --text or --file must be specified"),
    };

    let transmitter = Transmitter::new(profile).context("Cannot build transmitter")?;
    let samples = if args.no_noise {
        transmitter.modulate(&payload)?
    } else {
        transmitter.transmit(&payload)?
    };

    write_wav(&args.output, &samples, transmitter.sample_rate())?;
    println!(
        "Transmission complete: {} bytes in {:.1} s written to {:?}",
        payload.len(),
        samples.len() as f64 / transmitter.sample_rate() as f64,
        args.output
    );
    Ok(())
}

fn load_audio(profile: &Profile, path: &PathBuf) -> Result<Vec<i16>> {
    let (samples, rate) = read_wav(path)?;
    if rate != profile.modulation.sample_rate {
        anyhow::bail!(
            "{:?} is sampled at {} Hz, profile expects {} Hz",
            path,
            rate,
            profile.modulation.sample_rate
        );
    }
    Ok(samples)
}

fn emit_payload(payload: &[u8], output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, payload).with_context(|| format!("Failed to write {:?}", path))?;
            println!("Decoded {} bytes written to {:?}", payload.len(), path);
        }
        None => println!("{}", String::from_utf8_lossy(payload)),
    }
    Ok(())
}

pub fn run_rx(profile: &Profile, args: &RxArgs) -> Result<()> {
    let samples = load_audio(profile, &args.input)?;
    let receiver = Receiver::new(profile).context("Cannot build receiver")?;
    let payload = receiver
        .receive(&samples)
        .with_context(|| format!("No packet decoded from {:?}", args.input))?;
    emit_payload(&payload, args.output.as_ref())
}

pub async fn run_listen(profile: &Profile, args: &ListenArgs) -> Result<()> {
    let samples = load_audio(profile, &args.input)?;
    let options = ListenOptions {
        realtime: args.realtime,
    };

    let report = listen(profile, samples, options, |event| match event {
        StreamEvent::Packet(payload) => println!("{}", String::from_utf8_lossy(payload)),
        StreamEvent::Corrupt(e) => eprintln!("corrupt packet: {}", e),
        other => info!(?other, "receiver event"),
    })
    .await?;

    println!(
        "{} packet(s), {} corrupt, {} desync(s), {} overrun(s), {} dropped chunk(s)",
        report.packets, report.corrupt, report.desyncs, report.overruns, report.dropped_chunks
    );
    Ok(())
}

pub fn run_info(profile: &Profile, args: &InfoArgs) -> Result<()> {
    println!("{}", profile.summary()?);
    if let Some(path) = &args.save {
        save_config(profile, path)?;
        println!("Profile written to {:?}", path);
    }
    Ok(())
}
