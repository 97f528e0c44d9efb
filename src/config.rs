//! Engine configuration.
//!
//! Every field has a working default; a TOML file only needs the keys it
//! wants to change:
//!
//! ```toml
//! control_rate = 120.0
//!
//! [envelope]
//! attack = 0.02
//! release = 1.2
//! ```

use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::synth::oscillator::MAX_POLYPHONY;
use crate::{DEFAULT_SAMPLE_RATE, MIN_TIME};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Rate the render callback runs at, unless the backend reports another.
    pub sample_rate: f32,
    /// Envelope and filter-automation tick rate in Hz.
    pub control_rate: f64,
    /// Sequencer scheduling tick rate in Hz.
    pub sequencer_rate: f64,
    /// Simultaneous notes per oscillator. Capped at [`MAX_POLYPHONY`].
    pub max_polyphony: usize,
    pub envelope: EnvelopeSettings,
    pub automation: AutomationSettings,
}

/// Initial ADSR values for newly spawned envelope nodes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

/// Cutoff range swept by filter automation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationSettings {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            control_rate: 60.0,
            sequencer_rate: 200.0,
            max_polyphony: MAX_POLYPHONY,
            envelope: EnvelopeSettings::default(),
            automation: AutomationSettings::default(),
        }
    }
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            attack: 0.1,
            decay: 0.1,
            sustain: 0.5,
            release: 0.5,
        }
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            min_hz: 200.0,
            max_hz: 8_000.0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self.sanitized()
    }

    pub fn with_control_rate(mut self, hz: f64) -> Self {
        self.control_rate = hz;
        self.sanitized()
    }

    pub fn with_sequencer_rate(mut self, hz: f64) -> Self {
        self.sequencer_rate = hz;
        self.sanitized()
    }

    pub fn with_envelope(mut self, envelope: EnvelopeSettings) -> Self {
        self.envelope = envelope;
        self.sanitized()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        Ok(config.sanitized())
    }

    #[cfg(feature = "serde")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded engine config");
        Ok(config)
    }

    #[cfg(not(feature = "serde"))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Err(ConfigError::FeatureDisabled {
            path: path.as_ref().display().to_string(),
        })
    }

    /// Pull out-of-range values back into something the engine can run.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            self.sample_rate = defaults.sample_rate;
        }
        if !(self.control_rate.is_finite() && self.control_rate > 0.0) {
            self.control_rate = defaults.control_rate;
        }
        if !(self.sequencer_rate.is_finite() && self.sequencer_rate > 0.0) {
            self.sequencer_rate = defaults.sequencer_rate;
        }
        self.max_polyphony = self.max_polyphony.clamp(1, MAX_POLYPHONY);

        let env = &mut self.envelope;
        env.attack = env.attack.max(MIN_TIME);
        env.decay = env.decay.max(MIN_TIME);
        env.sustain = env.sustain.clamp(0.0, 1.0);
        env.release = env.release.max(MIN_TIME);

        let auto = &mut self.automation;
        auto.min_hz = auto.min_hz.clamp(20.0, 20_000.0);
        auto.max_hz = auto.max_hz.clamp(auto.min_hz, 20_000.0);
        self
    }

    /// Seconds between envelope/automation ticks.
    pub fn control_period(&self) -> f64 {
        1.0 / self.control_rate
    }

    /// Seconds between sequencer ticks.
    pub fn sequencer_period(&self) -> f64 {
        1.0 / self.sequencer_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_rates() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.control_rate, 60.0);
        assert_eq!(config.sequencer_rate, 200.0);
        assert_eq!(config.envelope.sustain, 0.5);
    }

    #[test]
    fn sanitize_floors_times_and_rates() {
        let config = EngineConfig::default()
            .with_control_rate(-5.0)
            .with_envelope(EnvelopeSettings {
                attack: 0.0,
                decay: -1.0,
                sustain: 3.0,
                release: 0.0,
            });

        assert_eq!(config.control_rate, 60.0);
        assert_eq!(config.envelope.attack, MIN_TIME);
        assert_eq!(config.envelope.decay, MIN_TIME);
        assert_eq!(config.envelope.sustain, 1.0);
        assert_eq!(config.envelope.release, MIN_TIME);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn toml_overrides_only_given_keys() {
        let config = EngineConfig::from_toml_str(
            r#"
            control_rate = 120.0

            [envelope]
            release = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(config.control_rate, 120.0);
        assert_eq!(config.sequencer_rate, 200.0);
        assert_eq!(config.envelope.release, 1.5);
        assert_eq!(config.envelope.attack, 0.1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "sequencer_rate = 400.0\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.sequencer_rate, 400.0);
    }

    #[cfg(not(feature = "serde"))]
    #[test]
    fn load_without_serde_names_the_feature() {
        let err = EngineConfig::load("engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FeatureDisabled { .. }));
        assert!(err.to_string().contains("serde"));
    }
}
