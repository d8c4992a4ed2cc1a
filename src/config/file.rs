//! Configuration file management for babble.
//!
//! Configuration lives in a TOML file in the user's config directory. A
//! missing file is not an error: defaults apply so the recorder works out of
//! the box.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Which drive signal feeds the visual waveform.
///
/// Selectable at any time from the recorder; never affects capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaveformMode {
    /// Shape the wave from the time-domain amplitude mean
    #[default]
    Amplitude,
    /// Shape the wave from the scaled frequency-domain mean
    Frequency,
}

impl WaveformMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Amplitude => Self::Frequency,
            Self::Frequency => Self::Amplitude,
        }
    }
}

impl std::fmt::Display for WaveformMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amplitude => write!(f, "amplitude"),
            Self::Frequency => write!(f, "frequency"),
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use: "default", a numeric index, or a device name
    /// from `babble list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Requested sample rate in Hz (the device rate wins if they differ)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Recorder behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Seconds counted down before recording starts
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u8,
    /// Filename suggested when saving a recording
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
    /// Waveform mode selected at startup
    #[serde(default)]
    pub waveform_mode: WaveformMode,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            output_filename: default_output_filename(),
            waveform_mode: WaveformMode::default(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_countdown_secs() -> u8 {
    3
}

fn default_output_filename() -> String {
    crate::recording::artifact::DEFAULT_FILENAME.to_string()
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BabbleConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl BabbleConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)?;
        let config: BabbleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

/// Retrieves the path to the config file, creating the directory if needed.
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    let config_path = home.join(".config").join("babble").join("babble.toml");

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BabbleConfig::default();
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.recorder.countdown_secs, 3);
        assert_eq!(config.recorder.output_filename, "audio.wav");
        assert_eq!(config.recorder.waveform_mode, WaveformMode::Amplitude);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: BabbleConfig = toml::from_str(
            r#"
            [audio]
            device = "2"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.device, "2");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.recorder.countdown_secs, 3);
    }

    #[test]
    fn test_waveform_mode_round_trip() {
        let config: BabbleConfig = toml::from_str(
            r#"
            [recorder]
            waveform_mode = "frequency"
            "#,
        )
        .unwrap();
        assert_eq!(config.recorder.waveform_mode, WaveformMode::Frequency);

        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("frequency"));
    }

    #[test]
    fn test_mode_toggle() {
        assert_eq!(WaveformMode::Amplitude.toggled(), WaveformMode::Frequency);
        assert_eq!(WaveformMode::Frequency.toggled(), WaveformMode::Amplitude);
    }
}
