//! TOML-based application configuration.
//!
//! Stores the tunable rule constants:
//! - EXP formula and level curve
//! - Daily streak threshold
//! - Meditation session rules and mission keywords
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::meditation::Technique;

/// Upper bound for `base_exp` and `streak_bonus_cap`; keeps the largest
/// mission reward well inside `u32`.
pub const MAX_REWARD_SETTING: u32 = 10_000;
/// Upper bound for `exp_per_level`.
pub const MAX_EXP_PER_LEVEL: u64 = 1_000_000;

/// EXP and level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// EXP per difficulty point.
    #[serde(default = "default_base_exp")]
    pub base_exp: u32,
    /// Bonus EXP per day of current streak.
    #[serde(default = "default_streak_bonus_per_day")]
    pub streak_bonus_per_day: u32,
    #[serde(default = "default_streak_bonus_cap")]
    pub streak_bonus_cap: u32,
    /// EXP needed to clear level N is `N * exp_per_level`.
    #[serde(default = "default_exp_per_level")]
    pub exp_per_level: u64,
}

/// Daily mission streak settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Fraction of today's missions that must be done for the day to count.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

/// Meditation session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeditationConfig {
    /// Manual stops shorter than this are discarded.
    #[serde(default = "default_min_session_secs")]
    pub min_session_secs: u64,
    #[serde(default = "default_minutes")]
    pub default_minutes: u32,
    #[serde(default)]
    pub default_technique: Technique,
    /// Title keywords marking a daily mission as a meditation mission.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Seconds of meditation per EXP point.
    #[serde(default = "default_secs_per_exp")]
    pub secs_per_exp: u64,
    #[serde(default = "default_min_exp")]
    pub min_exp: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub streak: StreakConfig,
    #[serde(default)]
    pub meditation: MeditationConfig,
}

fn default_base_exp() -> u32 {
    20
}
fn default_streak_bonus_per_day() -> u32 {
    2
}
fn default_streak_bonus_cap() -> u32 {
    20
}
fn default_exp_per_level() -> u64 {
    100
}
fn default_threshold() -> f64 {
    0.8
}
fn default_min_session_secs() -> u64 {
    10
}
fn default_minutes() -> u32 {
    5
}
fn default_keywords() -> Vec<String> {
    vec!["meditation".into(), "명상".into()]
}
fn default_secs_per_exp() -> u64 {
    12
}
fn default_min_exp() -> u64 {
    5
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            base_exp: default_base_exp(),
            streak_bonus_per_day: default_streak_bonus_per_day(),
            streak_bonus_cap: default_streak_bonus_cap(),
            exp_per_level: default_exp_per_level(),
        }
    }
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

impl Default for MeditationConfig {
    fn default() -> Self {
        Self {
            min_session_secs: default_min_session_secs(),
            default_minutes: default_minutes(),
            default_technique: Technique::default(),
            keywords: default_keywords(),
            secs_per_exp: default_secs_per_exp(),
            min_exp: default_min_exp(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Array(_) => {
                        // Comma-separated lists are accepted as well as JSON arrays.
                        if value.trim_start().starts_with('[') {
                            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                        } else {
                            serde_json::Value::Array(
                                value
                                    .split(',')
                                    .map(|s| serde_json::Value::String(s.trim().to_string()))
                                    .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
                                    .collect(),
                            )
                        }
                    }
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Location of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or breaks a range rule. The config is left unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check range rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if !(self.streak.threshold > 0.0 && self.streak.threshold <= 1.0) {
            return Err(invalid("streak.threshold", "must be in (0, 1]"));
        }
        if self.progression.base_exp > MAX_REWARD_SETTING {
            return Err(invalid("progression.base_exp", "must be at most 10000"));
        }
        if self.progression.streak_bonus_cap > MAX_REWARD_SETTING {
            return Err(invalid("progression.streak_bonus_cap", "must be at most 10000"));
        }
        if !(1..=MAX_EXP_PER_LEVEL).contains(&self.progression.exp_per_level) {
            return Err(invalid("progression.exp_per_level", "must be in 1..=1000000"));
        }
        if self.meditation.secs_per_exp == 0 {
            return Err(invalid("meditation.secs_per_exp", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.progression.base_exp, 20);
        assert_eq!(cfg.progression.streak_bonus_per_day, 2);
        assert_eq!(cfg.progression.streak_bonus_cap, 20);
        assert_eq!(cfg.progression.exp_per_level, 100);
        assert_eq!(cfg.streak.threshold, 0.8);
        assert_eq!(cfg.meditation.min_session_secs, 10);
        assert_eq!(cfg.meditation.default_minutes, 5);
        assert_eq!(cfg.meditation.default_technique, Technique::Breath);
        assert_eq!(cfg.meditation.secs_per_exp, 12);
        assert_eq!(cfg.meditation.min_exp, 5);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[streak]\nthreshold = 0.5\n").unwrap();
        assert_eq!(parsed.streak.threshold, 0.5);
        assert_eq!(parsed.progression, ProgressionConfig::default());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("progression.base_exp").as_deref(), Some("20"));
        assert_eq!(cfg.get("streak.threshold").as_deref(), Some("0.8"));
        assert_eq!(cfg.get("meditation.default_technique").as_deref(), Some("breath"));
        assert!(cfg.get("progression.missing_key").is_none());
    }

    #[test]
    fn set_updates_number_and_float() {
        let mut cfg = Config::default();
        cfg.set("progression.base_exp", "25").unwrap();
        cfg.set("streak.threshold", "0.75").unwrap();
        assert_eq!(cfg.progression.base_exp, 25);
        assert_eq!(cfg.streak.threshold, 0.75);
    }

    #[test]
    fn set_accepts_comma_separated_keywords() {
        let mut cfg = Config::default();
        cfg.set("meditation.keywords", "meditate, zazen").unwrap();
        assert_eq!(cfg.meditation.keywords, vec!["meditate", "zazen"]);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.set("progression.nonexistent", "1").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn set_rejects_invalid_technique() {
        let mut cfg = Config::default();
        assert!(cfg.set("meditation.default_technique", "juggling").is_err());
        assert_eq!(cfg.meditation.default_technique, Technique::Breath);
    }

    #[test]
    fn set_rejects_out_of_range_threshold() {
        let mut cfg = Config::default();
        assert!(cfg.set("streak.threshold", "1.5").is_err());
        assert_eq!(cfg.streak.threshold, 0.8);
    }

    #[test]
    fn set_rejects_rewards_that_would_overflow() {
        let mut cfg = Config::default();
        assert!(cfg.set("progression.base_exp", "4294967295").is_err());
        assert!(cfg.set("progression.streak_bonus_cap", "4294967295").is_err());
        assert!(cfg.set("progression.exp_per_level", "18446744073709551615").is_err());
        assert!(cfg.set("progression.exp_per_level", "0").is_err());
        assert_eq!(cfg.progression, ProgressionConfig::default());

        cfg.set("progression.base_exp", "10000").unwrap();
        cfg.set("progression.streak_bonus_cap", "10000").unwrap();
        assert_eq!(cfg.progression.mission_exp(5, u32::MAX), 60_000);
    }

    #[test]
    fn load_rejects_file_with_overflowing_reward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[progression]\nbase_exp = 4294967295\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.set("meditation.min_session_secs", "30").unwrap();
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.meditation.min_session_secs, 30);
    }
}
