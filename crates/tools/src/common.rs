//! Shared helpers for the tools: logging, profile files and WAV I/O

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::config::Profile;

/// Install the global subscriber. `debug` wins over `verbose`.
pub fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Parse a configuration document, trying JSON first and then TOML
pub fn parse_config<T: for<'a> Deserialize<'a>>(content: &str) -> Result<T> {
    if let Ok(config) = serde_json::from_str(content) {
        return Ok(config);
    }

    match toml::from_str(content) {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("Failed to parse config file: {}", e),
    }
}

/// Load configuration from file
pub fn load_config<T: for<'a> Deserialize<'a>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    parse_config(&content)
}

/// Save configuration to file; JSON for `.json`, TOML otherwise
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

/// Profile from a file if given, else the named preset. Always validated.
pub fn resolve_profile(path: Option<&Path>, preset: &str) -> Result<Profile> {
    let profile = match path {
        Some(path) => load_config(path)?,
        None => Profile::preset(preset)
            .with_context(|| format!("Unknown profile preset: {}", preset))?,
    };
    profile.validate().context("Invalid profile")?;
    Ok(profile)
}

/// Write mono 16-bit PCM
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!("Wrote {} samples to {:?}", samples.len(), path);
    Ok(())
}

/// Read mono 16-bit PCM, returning the samples and the file's sample rate
pub fn read_wav(path: &Path) -> Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {:?}", path))?;

    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int
    {
        anyhow::bail!(
            "{:?} is not mono 16-bit PCM ({} channels, {} bits)",
            path,
            spec.channels,
            spec.bits_per_sample
        );
    }

    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read audio samples")?;

    info!("Read {} samples from {:?}", samples.len(), path);
    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_and_toml() {
        let json = serde_json::to_string(&Profile::fsk()).unwrap();
        let from_json: Profile = parse_config(&json).unwrap();
        assert_eq!(from_json, Profile::fsk());

        let toml_text = toml::to_string_pretty(&Profile::fsk()).unwrap();
        let from_toml: Profile = parse_config(&toml_text).unwrap();
        assert_eq!(from_toml, Profile::fsk());

        assert!(parse_config::<Profile>("not [valid").is_err());
    }

    #[test]
    fn test_wav_roundtrip() {
        let path = std::env::temp_dir().join(format!("tonelink-wav-{}.wav", std::process::id()));
        let samples: Vec<i16> = (0..1000).map(|i| ((i * 37) % 2000 - 1000) as i16).collect();

        write_wav(&path, &samples, 48_000).unwrap();
        let (read, rate) = read_wav(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(rate, 48_000);
        assert_eq!(read, samples);
    }

    #[test]
    fn test_resolve_profile() {
        assert!(resolve_profile(None, "fsk").is_ok());
        assert!(resolve_profile(None, "nope").is_err());
    }
}
