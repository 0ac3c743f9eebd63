//! # Run Settings
//!
//! Explicit configuration for one score-to-MIDI run. A `RunSettings` value is
//! constructed once (usually from YAML) and passed by reference to every component
//! that needs it: the execution builder, the `ExecutionManager` and the MIDI emitter.
//! There is no global settings state; changing settings means building new
//! components from the new value.
//!
//! ## YAML Format
//! ```yaml
//! ppq: 96
//! default_tempo: 60
//! default_dynamics: mf
//! max_steps: 100000
//! dynamics:
//!   p: 45
//!   f: 90
//! instruments:
//!   gangsa: { channel: 0, program: 0 }
//!   jegogan: { channel: 1, program: 1 }
//! ```
//!
//! Every field is optional and falls back to [`RunSettings::default`].

use crate::error::FlowError;
use crate::execution::{MAX_TEMPO, MIN_TEMPO};
use crate::score::Position;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// MIDI routing for one instrument position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct InstrumentSettings {
    pub channel: u8,
    #[serde(default)]
    pub program: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// MIDI ticks per beat
    pub ppq: u16,
    /// Tempo (BPM) in effect before the first tempo directive
    pub default_tempo: i32,
    /// Dynamics abbreviation in effect before the first dynamics directive
    pub default_dynamics: String,
    /// Ceiling on beats visited in a single traversal
    pub max_steps: usize,
    /// Dynamics abbreviation -> MIDI velocity
    pub dynamics: BTreeMap<String, i32>,
    /// One MIDI track per instrument position, in key order
    pub instruments: BTreeMap<Position, InstrumentSettings>,
}

impl Default for RunSettings {
    fn default() -> Self {
        let dynamics = [
            ("ppp", 15),
            ("pp", 30),
            ("p", 45),
            ("mp", 60),
            ("mf", 75),
            ("f", 90),
            ("ff", 105),
            ("fff", 120),
        ]
        .into_iter()
        .map(|(abbr, vel)| (abbr.to_string(), vel))
        .collect();

        Self {
            ppq: 96,
            default_tempo: 60,
            default_dynamics: "mf".to_string(),
            max_steps: 100_000,
            dynamics,
            instruments: BTreeMap::new(),
        }
    }
}

impl RunSettings {
    /// Parse settings from YAML and validate them.
    pub fn from_yaml(content: &str) -> Result<Self, FlowError> {
        let settings: RunSettings = serde_yaml::from_str(content)
            .map_err(|e| FlowError::SettingsError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::SettingsError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.ppq == 0 || self.ppq > 0x7fff {
            return Err(FlowError::SettingsError(format!(
                "ppq must be between 1 and 32767, got {}",
                self.ppq
            )));
        }
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&self.default_tempo) {
            return Err(FlowError::SettingsError(format!(
                "default_tempo must be between {} and {}, got {}",
                MIN_TEMPO, MAX_TEMPO, self.default_tempo
            )));
        }
        if self.max_steps == 0 {
            return Err(FlowError::SettingsError("max_steps must be positive".to_string()));
        }
        if let Some((abbr, vel)) = self.dynamics.iter().find(|(_, v)| !(0..=127).contains(*v)) {
            return Err(FlowError::SettingsError(format!(
                "velocity for dynamics '{}' must be 0-127, got {}",
                abbr, vel
            )));
        }
        if self.velocity_for(&self.default_dynamics).is_none() {
            return Err(FlowError::SettingsError(format!(
                "default_dynamics '{}' is not in the dynamics table",
                self.default_dynamics
            )));
        }
        for (position, instrument) in &self.instruments {
            if instrument.channel > 15 {
                return Err(FlowError::SettingsError(format!(
                    "channel for '{}' must be 0-15, got {}",
                    position, instrument.channel
                )));
            }
            if instrument.program > 127 {
                return Err(FlowError::SettingsError(format!(
                    "program for '{}' must be 0-127, got {}",
                    position, instrument.program
                )));
            }
        }
        Ok(())
    }

    /// Look up the velocity for a dynamics abbreviation such as `mf`.
    pub fn velocity_for(&self, abbreviation: &str) -> Option<i32> {
        self.dynamics.get(abbreviation).copied()
    }

    /// Velocity in effect before any dynamics directive.
    pub fn default_velocity(&self) -> i32 {
        self.velocity_for(&self.default_dynamics).unwrap_or(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = RunSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.default_velocity(), 75);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = RunSettings::from_yaml("default_tempo: 80\n").unwrap();
        assert_eq!(settings.default_tempo, 80);
        assert_eq!(settings.ppq, 96);
        assert_eq!(settings.velocity_for("ff"), Some(105));
    }

    #[test]
    fn test_instruments_are_ordered() {
        let yaml = r#"
instruments:
  reyong: { channel: 2, program: 3 }
  gangsa: { channel: 0 }
"#;
        let settings = RunSettings::from_yaml(yaml).unwrap();
        let names: Vec<&str> = settings.instruments.keys().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["gangsa", "reyong"]);
        assert_eq!(settings.instruments[&Position::from("gangsa")].program, 0);
    }

    #[test]
    fn test_unknown_default_dynamics() {
        let result = RunSettings::from_yaml("default_dynamics: sfz\n");
        assert!(matches!(result, Err(FlowError::SettingsError(msg)) if msg.contains("sfz")));
    }

    #[test]
    fn test_bad_channel() {
        let yaml = "instruments:\n  gangsa: { channel: 16 }\n";
        assert!(RunSettings::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_default_tempo_bounds() {
        assert!(RunSettings::from_yaml("default_tempo: 3\n").is_err());
        assert!(RunSettings::from_yaml("default_tempo: 4\n").is_ok());
        assert!(RunSettings::from_yaml("default_tempo: 1001\n").is_err());
    }

    #[test]
    fn test_zero_ppq() {
        assert!(RunSettings::from_yaml("ppq: 0\n").is_err());
    }
}
