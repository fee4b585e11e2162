use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BeatError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl AppConfig {
    /// Parses a configuration from a JSON document. Missing sections fall
    /// back to their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(BeatError::Config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.tracker.validate()
    }
}

/// Configuration specific to the audio stream handed to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatError::InvalidConfig("sample rate must be positive"));
        }
        if self.block_size == 0 {
            return Err(BeatError::InvalidConfig("block size must be positive"));
        }
        if self.input_channels == 0 {
            return Err(BeatError::InvalidConfig(
                "at least one input channel is required",
            ));
        }
        Ok(())
    }
}

/// Tuning knobs for the beat tracker itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Tempo assumed at prepare time, before the host reports one.
    pub fallback_bpm: f64,
    /// Slowest host tempo the tracker follows. Slower tempos are treated like
    /// a missing tempo: the beat length is kept and no beats are reported.
    pub min_bpm: f64,
    /// Slowest tempo the beat storage is reserved for. Tempo changes above
    /// this never reallocate on the audio thread.
    pub reserve_min_bpm: f64,
    /// Number of snapshot buffers circulating between the audio thread and
    /// the consumer.
    pub snapshot_slots: usize,
}

/// Fewest slots that still let the producer overwrite a pending snapshot
/// while the consumer holds one and another sits in the published ring.
pub const MIN_SNAPSHOT_SLOTS: usize = 3;

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fallback_bpm: 120.0,
            min_bpm: 20.0,
            reserve_min_bpm: 40.0,
            snapshot_slots: MIN_SNAPSHOT_SLOTS,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fallback_bpm.is_finite() && self.fallback_bpm > 0.0) {
            return Err(BeatError::InvalidConfig("fallback bpm must be positive"));
        }
        if !(self.reserve_min_bpm.is_finite() && self.reserve_min_bpm > 0.0) {
            return Err(BeatError::InvalidConfig(
                "reserved minimum bpm must be positive",
            ));
        }
        if !(self.min_bpm.is_finite() && self.min_bpm > 0.0) {
            return Err(BeatError::InvalidConfig("minimum bpm must be positive"));
        }
        if self.fallback_bpm < self.min_bpm {
            return Err(BeatError::InvalidConfig(
                "fallback bpm is below the minimum bpm",
            ));
        }
        if self.snapshot_slots < MIN_SNAPSHOT_SLOTS {
            return Err(BeatError::InvalidConfig(
                "at least three snapshot slots are required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.tracker.fallback_bpm, 120.0);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config = AppConfig::from_json(r#"{ "tracker": { "snapshot_slots": 5 } }"#).unwrap();
        assert_eq!(config.tracker.snapshot_slots, 5);
        assert_eq!(config.tracker.reserve_min_bpm, 40.0);
        assert_eq!(config.audio.block_size, 512);
    }

    #[test]
    fn rejects_too_few_slots() {
        let err = AppConfig::from_json(r#"{ "tracker": { "snapshot_slots": 2 } }"#).unwrap_err();
        assert!(matches!(err, BeatError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_fallback_below_minimum_tempo() {
        let err = AppConfig::from_json(r#"{ "tracker": { "min_bpm": 150 } }"#).unwrap_err();
        assert!(matches!(err, BeatError::InvalidConfig(_)));
        let err = AppConfig::from_json(r#"{ "tracker": { "min_bpm": 0 } }"#).unwrap_err();
        assert!(matches!(err, BeatError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = AppConfig::from_json("{ audio: ").unwrap_err();
        assert!(matches!(err, BeatError::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load("/nonexistent/beatsnap.json").unwrap_err();
        assert!(matches!(err, BeatError::Io(_)));
    }
}
