//! Progression configuration with documented constants
//!
//! Tunables are collected here with explanations of what they control.
//! Values load from a TOML file; any field left out keeps its default.

use crate::core::error::{ProgressionError, Result};
use crate::progression::ledger::MAX_CURRENCY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the progression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    // === STORAGE ===
    /// Directory holding one JSON record per participant
    pub data_dir: PathBuf,

    // === RANDOMNESS ===
    /// Seed for role assignment and on-hit rolls
    ///
    /// `None` seeds from OS entropy. Set it for reproducible runs; two
    /// stores built with the same seed assign the same sequence of roles.
    pub seed: Option<u64>,

    // === DASH ===
    /// Minimum time between two successful dashes (milliseconds)
    pub dash_cooldown_ms: u64,

    /// Floor applied to the vertical component of a dash impulse
    ///
    /// Keeps a dash started while looking down from driving the
    /// participant into the ground.
    pub dash_min_vertical: f32,

    // === UPGRADES ===
    /// Currency debited per ability upgrade
    ///
    /// Checked and debited in the same record mutation as the level
    /// increment. 0 makes upgrades free.
    pub upgrade_cost: u8,

    // === VITALITY ===
    /// Max vitality before any healthkitty bonus
    pub base_max_vitality: f64,

    // === ON-HIT DEBUFF ===
    /// Duration of the rabies debuff in host ticks (20 ticks = 1 second)
    pub rabies_debuff_ticks: u32,

    /// Amplifier of the rabies debuff (0-based, 2 = level III)
    pub rabies_debuff_amplifier: u8,

    // === DAMAGE ===
    /// Cancel all fall damage taken by participants
    pub cancel_fall_damage: bool,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/players"),
            seed: None,
            dash_cooldown_ms: 5_000,
            dash_min_vertical: 0.2,
            upgrade_cost: 1,
            base_max_vitality: 20.0,
            rabies_debuff_ticks: 40,
            rabies_debuff_amplifier: 2,
            cancel_fall_damage: true,
        }
    }
}

impl ProgressionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ProgressionError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.dash_cooldown_ms == 0 {
            return Err(ProgressionError::Config(
                "dash_cooldown_ms must be positive".into(),
            ));
        }

        if !(self.dash_min_vertical > 0.0 && self.dash_min_vertical <= 1.0) {
            return Err(ProgressionError::Config(format!(
                "dash_min_vertical ({}) must be in (0, 1]",
                self.dash_min_vertical
            )));
        }

        // A cost above the cap could never be paid
        if self.upgrade_cost > MAX_CURRENCY {
            return Err(ProgressionError::Config(format!(
                "upgrade_cost ({}) exceeds max currency ({})",
                self.upgrade_cost, MAX_CURRENCY
            )));
        }

        if self.base_max_vitality <= 0.0 {
            return Err(ProgressionError::Config(
                "base_max_vitality must be positive".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProgressionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProgressionConfig::from_toml_str(
            r#"
            seed = 7
            upgrade_cost = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.upgrade_cost, 0);
        assert_eq!(config.dash_cooldown_ms, 5_000);
        assert!(config.cancel_fall_damage);
    }

    #[test]
    fn test_rejects_unpayable_upgrade_cost() {
        let result = ProgressionConfig::from_toml_str("upgrade_cost = 6");
        assert!(matches!(result, Err(ProgressionError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_cooldown() {
        let config = ProgressionConfig {
            dash_cooldown_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(ProgressionConfig::from_toml_str("seed = [").is_err());
    }
}
