//! Fraud policy configuration.
//!
//! Loaded once at process start and validated before any detector or scorer
//! is built, so a bad policy is reported at startup and never at scoring time.

use crate::core::burst::BurstWindow;
use crate::core::hash::PERCEPTUAL_HASH_BITS;
use crate::core::photo::PhotoPolicy;
use crate::core::scoring::{LevelBand, RiskLevel, SignalKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const APP_DIR_NAME: &str = "rafflrs";
pub const DATABASE_FILE: &str = "rafflrs.db";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No weight configured for signal '{signal}'")]
    MissingWeight { signal: SignalKind },

    #[error("Weight {weight} for signal '{signal}' is outside 0..=100")]
    WeightOutOfRange { signal: SignalKind, weight: u32 },

    #[error("Risk level bands are invalid: {message}")]
    InvalidLevels { message: String },

    #[error(
        "Weight of 'duplicate-exact' ({weight}) must reach the high band ({high_from}) on its own"
    )]
    ExactMatchBelowHigh { weight: u32, high_from: u8 },

    #[error("Near match threshold must be greater than zero")]
    ZeroNearThreshold,

    #[error("Near match threshold {threshold} exceeds the {max}-bit perceptual hash")]
    NearThresholdTooLarge { threshold: u32, max: u32 },

    #[error("Photo policy is invalid: {message}")]
    InvalidPhotoPolicy { message: String },

    #[error("Burst window '{name}' must have a non-zero length and limit")]
    InvalidBurstWindow { name: &'static str },

    #[error("Could not determine the data directory")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudConfig {
    /// Points per signal.
    pub weights: BTreeMap<SignalKind, u32>,
    /// Level bands, ascending by `min_score`.
    pub levels: Vec<LevelBand>,
    /// Exclusive Hamming distance bound for a near duplicate.
    pub near_match_threshold: u32,
    /// Per-identity velocity window.
    pub burst: BurstWindow,
    /// Campaign-wide velocity window.
    pub global_burst: BurstWindow,
    #[serde(default)]
    pub photo: PhotoPolicy,
}

impl Default for FraudConfig {
    fn default() -> Self {
        let weights = BTreeMap::from([
            (SignalKind::DuplicateExact, 80),
            (SignalKind::DuplicateNear, 40),
            (SignalKind::RepeatPhoto, 20),
            (SignalKind::Burst, 15),
            (SignalKind::GlobalBurst, 15),
            (SignalKind::DuplicateIdentity, 40),
            (SignalKind::DuplicatePhone, 40),
            (SignalKind::PhotoQuality, 30),
            (SignalKind::ExifAnomaly, 5),
            (SignalKind::InvalidPhone, 25),
            (SignalKind::InvalidName, 10),
            (SignalKind::InvalidUsername, 5),
        ]);

        Self {
            weights,
            levels: vec![
                LevelBand {
                    level: RiskLevel::Low,
                    min_score: 0,
                },
                LevelBand {
                    level: RiskLevel::Medium,
                    min_score: 31,
                },
                LevelBand {
                    level: RiskLevel::High,
                    min_score: 71,
                },
            ],
            near_match_threshold: 6,
            burst: BurstWindow {
                window_secs: 60,
                limit: 5,
            },
            global_burst: BurstWindow {
                window_secs: 60,
                limit: 31,
            },
            photo: PhotoPolicy::default(),
        }
    }
}

impl FraudConfig {
    /// Read and validate a JSON policy file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: FraudConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::info!("Loaded fraud policy from {}", path.display());
        Ok(config)
    }

    /// Load `path` when it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No policy at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn weight(&self, signal: SignalKind) -> u32 {
        self.weights.get(&signal).copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for signal in SignalKind::ALL {
            match self.weights.get(&signal) {
                None => return Err(ConfigError::MissingWeight { signal }),
                Some(&weight) if weight > 100 => {
                    return Err(ConfigError::WeightOutOfRange { signal, weight });
                }
                Some(_) => {}
            }
        }

        self.validate_levels()?;

        let high_from = self
            .levels
            .iter()
            .find(|band| band.level == RiskLevel::High)
            .map(|band| band.min_score)
            .ok_or_else(|| ConfigError::InvalidLevels {
                message: "no band for level 'high'".to_string(),
            })?;
        let weight = self.weight(SignalKind::DuplicateExact);
        if weight < u32::from(high_from) {
            return Err(ConfigError::ExactMatchBelowHigh { weight, high_from });
        }

        if self.near_match_threshold == 0 {
            return Err(ConfigError::ZeroNearThreshold);
        }
        if self.near_match_threshold > PERCEPTUAL_HASH_BITS {
            return Err(ConfigError::NearThresholdTooLarge {
                threshold: self.near_match_threshold,
                max: PERCEPTUAL_HASH_BITS,
            });
        }
        for (name, window) in [("burst", self.burst), ("global_burst", self.global_burst)] {
            if window.window_secs == 0 || window.limit == 0 {
                return Err(ConfigError::InvalidBurstWindow { name });
            }
        }

        if !self.photo.min_sharpness.is_finite() || self.photo.min_sharpness < 0.0 {
            return Err(ConfigError::InvalidPhotoPolicy {
                message: format!("min_sharpness {}", self.photo.min_sharpness),
            });
        }

        Ok(())
    }

    fn validate_levels(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidLevels {
            message: message.to_string(),
        };

        let first = self.levels.first().ok_or_else(|| invalid("no bands"))?;
        if first.min_score != 0 {
            return Err(invalid("the first band must start at 0"));
        }
        for pair in self.levels.windows(2) {
            if pair[1].min_score <= pair[0].min_score {
                return Err(invalid("min_score must be strictly increasing"));
            }
            if pair[1].level <= pair[0].level {
                return Err(invalid("levels must be listed low to high without repeats"));
            }
        }
        if self.levels.iter().any(|band| band.min_score > 100) {
            return Err(invalid("min_score must be at most 100"));
        }
        Ok(())
    }
}

/// `<data dir>/rafflrs`, created on demand.
pub fn app_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_dir()
        .ok_or(ConfigError::NoDataDir)?
        .join(APP_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir()?.join(DATABASE_FILE))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir()?.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        FraudConfig::default().validate().unwrap();
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut config = FraudConfig::default();
        config.weights.insert(SignalKind::InvalidPhone, 30);
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = FraudConfig::load(&path).unwrap();
        assert_eq!(loaded.weight(SignalKind::InvalidPhone), 30);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_weights_use_signal_names() {
        let json = serde_json::to_value(FraudConfig::default()).unwrap();
        assert_eq!(json["weights"]["duplicate-exact"], 80);
        assert_eq!(json["levels"][2]["level"], "high");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = FraudConfig::load_or_default(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, FraudConfig::default());
    }

    #[test]
    fn test_missing_weight_is_rejected() {
        let mut config = FraudConfig::default();
        config.weights.remove(&SignalKind::Burst);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingWeight {
                signal: SignalKind::Burst
            })
        ));
    }

    #[test]
    fn test_non_monotonic_levels_are_rejected() {
        let mut config = FraudConfig::default();
        config.levels[2].min_score = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLevels { .. })
        ));

        let mut config = FraudConfig::default();
        config.levels[0].min_score = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLevels { .. })
        ));
    }

    #[test]
    fn test_zero_burst_window_is_rejected() {
        let mut config = FraudConfig::default();
        config.burst.window_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBurstWindow { name: "burst" })
        ));
    }

    #[test]
    fn test_exact_weight_must_reach_high() {
        let mut config = FraudConfig::default();
        config.weights.insert(SignalKind::DuplicateExact, 50);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ExactMatchBelowHigh { weight: 50, high_from: 71 })
        ));
    }

    #[test]
    fn test_invalid_file_fails_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"weights": {}}"#).unwrap();
        assert!(matches!(FraudConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_near_threshold_is_bounded_by_hash_length() {
        let mut config = FraudConfig::default();
        config.near_match_threshold = PERCEPTUAL_HASH_BITS;
        config.validate().unwrap();

        config.near_match_threshold = PERCEPTUAL_HASH_BITS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NearThresholdTooLarge { threshold: 65, max: 64 })
        ));

        config.near_match_threshold = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NearThresholdTooLarge { .. })
        ));
    }

    #[test]
    fn test_photo_policy_defaults_when_absent() {
        let mut json = serde_json::to_value(FraudConfig::default()).unwrap();
        json.as_object_mut().unwrap().remove("photo");
        let config: FraudConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.photo, PhotoPolicy::default());
        assert_eq!(config.photo.min_width, 1024);
    }

    #[test]
    fn test_negative_sharpness_is_rejected() {
        let mut config = FraudConfig::default();
        config.photo.min_sharpness = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPhotoPolicy { .. })
        ));
    }
}
