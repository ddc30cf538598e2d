//! Engine configuration.
//!
//! Every field has a default. A config can be read from JSON, where
//! missing fields keep their defaults, and a few settings can be
//! overridden from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `REVEILLE_EXACT_ALARMS` | `wake.exact_permitted` |
//! | `REVEILLE_NOTE_MS` | `sequencer.note_duration_ms` |
//! | `REVEILLE_LOOP_GAP_MS` | `sequencer.loop_gap_ms` |

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::{SequencerConfig, SynthConfig};
use crate::challenge::ChallengeConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Whether platform policy grants exact wake-ups.
    pub exact_permitted: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            exact_permitted: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sequencer: SequencerConfig,
    pub synth: SynthConfig,
    pub challenges: ChallengeConfig,
    pub wake: WakeConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(exact) = parse_var(&var, "REVEILLE_EXACT_ALARMS", parse_bool)? {
            self.wake.exact_permitted = exact;
        }
        if let Some(ms) = parse_var(&var, "REVEILLE_NOTE_MS", |v| v.parse().ok())? {
            self.sequencer.note_duration_ms = ms;
        }
        if let Some(ms) = parse_var(&var, "REVEILLE_LOOP_GAP_MS", |v| v.parse().ok())? {
            self.sequencer.loop_gap_ms = ms;
        }
        Ok(())
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match var(key) {
        None => Ok(None),
        Some(value) => parse(value.trim())
            .map(Some)
            .ok_or_else(|| Error::Other(format!("Invalid value for {key}: {value:?}"))),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sequencer.note_duration_ms, 500);
        assert_eq!(config.sequencer.loop_gap_ms, 2_000);
        assert_eq!(config.sequencer.preview_ceiling_ms, 10_000);
        assert_eq!(config.synth.sample_rate, 44_100);
        assert_eq!(config.challenges.shake.required, 10);
        assert_eq!(config.challenges.steps.required, 20);
        assert_eq!(config.challenges.memory.pairs, 6);
        assert!(config.wake.exact_permitted);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "sequencer": { "loop_gap_ms": 500 }, "challenges": { "scan_expected": "BATHROOM" } }"#,
        )
        .unwrap();

        assert_eq!(config.sequencer.loop_gap_ms, 500);
        assert_eq!(config.sequencer.note_duration_ms, 500);
        assert_eq!(config.challenges.scan_expected.as_deref(), Some("BATHROOM"));
        assert_eq!(config.challenges.arithmetic.max_operand, 99);
    }

    #[test_case("0", false; "zero")]
    #[test_case("no", false; "no")]
    #[test_case("TRUE", true; "upper true")]
    #[test_case(" on ", true; "padded on")]
    fn exact_alarm_override(value: &str, expected: bool) {
        let vars = HashMap::from([("REVEILLE_EXACT_ALARMS", value.to_string())]);
        let mut config = EngineConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.wake.exact_permitted, expected);
    }

    #[test]
    fn numeric_overrides() {
        let vars = HashMap::from([
            ("REVEILLE_NOTE_MS", "250".to_string()),
            ("REVEILLE_LOOP_GAP_MS", "1000".to_string()),
        ]);
        let mut config = EngineConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.sequencer.note_duration_ms, 250);
        assert_eq!(config.sequencer.loop_gap_ms, 1_000);
    }

    #[test]
    fn bad_override_is_an_error() {
        let mut config = EngineConfig::default();
        let result = config.apply_env(|k| (k == "REVEILLE_NOTE_MS").then(|| "fast".to_string()));
        assert!(matches!(result, Err(Error::Other(_))));
    }
}
