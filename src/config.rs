use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::backend::BackendKind;
use crate::synth::MAX_SPLITS;

/// Top-level configuration, loaded from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub devices: DeviceConfig,

    /// Which render-loop model drives the audio device.
    #[serde(default)]
    pub backend: BackendKind,

    /// Number of layered voice-groups (1 or 2).
    #[serde(default = "default_splits")]
    pub splits: usize,

    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Preferred sample rate; the device may negotiate a different one.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    /// MIDI input port, by index or name substring. Ignored when `listen`
    /// is set.
    #[serde(default)]
    pub midiin: Option<String>,

    /// UDP port to receive single-byte note events on, instead of MIDI.
    #[serde(default)]
    pub listen: Option<u16>,
}

fn default_splits() -> usize {
    2
}

fn default_channels() -> usize {
    2
}

fn default_sample_rate() -> u32 {
    48000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.splits == 0 || self.splits > MAX_SPLITS {
            return Err(anyhow!("splits must be between 1 and {MAX_SPLITS}"));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(anyhow!("channels must be 1 or 2"));
        }
        if self.devices.midiin.is_none() && self.devices.listen.is_none() {
            return Err(anyhow!(
                "configure either devices.midiin or devices.listen"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("devices:\n  midiin: \"0\"\n").unwrap();
        config.validate().unwrap();
        assert_eq!(config.splits, 2);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.backend, BackendKind::Stream);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
devices:
  listen: 9000
backend: polling
splits: 1
channels: 2
sample_rate: 44100
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backend, BackendKind::Polling);
        assert_eq!(config.devices.listen, Some(9000));
        assert_eq!(config.splits, 1);
    }

    #[test]
    fn test_rejects_bad_splits() {
        let yaml = "devices:\n  midiin: \"0\"\nsplits: 3\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_source() {
        let config: Config = serde_yaml::from_str("splits: 1\n").unwrap();
        assert!(config.validate().is_err());
    }
}
