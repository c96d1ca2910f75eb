//! Static ability definitions - the global catalog every participant references
//!
//! Abilities are a closed set. String keys coming from menus, commands or
//! durable records are validated here and unknown keys are rejected as
//! `Unavailable` instead of silently reading as level 0.

use crate::core::error::{ProgressionError, Result};
use crate::core::types::Role;
use crate::progression::participant::Participant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an unlockable ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKey {
    Claws,
    Rabies,
    ProtectiveFur,
    Purring,
    HealthKitty,
    Zoom,
}

impl AbilityKey {
    pub const ALL: [AbilityKey; 6] = [
        Self::Claws,
        Self::Rabies,
        Self::ProtectiveFur,
        Self::Purring,
        Self::HealthKitty,
        Self::Zoom,
    ];

    /// Key used in commands and durable records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claws => "claws",
            Self::Rabies => "rabies",
            Self::ProtectiveFur => "protectivefur",
            Self::Purring => "purring",
            Self::HealthKitty => "healthkitty",
            Self::Zoom => "zoom",
        }
    }

    pub fn definition(&self) -> &'static AbilityDefinition {
        // Catalog rows are declared in enum order
        &ABILITY_CATALOG[*self as usize]
    }
}

impl fmt::Display for AbilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbilityKey {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| ProgressionError::Unavailable(format!("unknown ability '{}'", s)))
    }
}

/// Definition of an ability
#[derive(Debug, Clone)]
pub struct AbilityDefinition {
    pub key: AbilityKey,
    pub name: &'static str,
    pub role: Role,
    pub cap: u8,
    pub description: &'static str,
}

/// Global ability catalog - static definitions
pub static ABILITY_CATALOG: &[AbilityDefinition] = &[
    // Aggressive
    AbilityDefinition {
        key: AbilityKey::Claws,
        name: "Claws",
        role: Role::Aggressive,
        cap: 2,
        description: "Permanent strength boost",
    },
    AbilityDefinition {
        key: AbilityKey::Rabies,
        name: "Rabies",
        role: Role::Aggressive,
        cap: 5,
        description: "Chance to wither on hit, +5% per level",
    },
    AbilityDefinition {
        key: AbilityKey::ProtectiveFur,
        name: "Protective Fur",
        role: Role::Aggressive,
        cap: 3,
        description: "Damage reduction, +10% per level",
    },
    // Passive
    AbilityDefinition {
        key: AbilityKey::Purring,
        name: "Purring",
        role: Role::Passive,
        cap: 2,
        description: "Permanent regeneration",
    },
    AbilityDefinition {
        key: AbilityKey::HealthKitty,
        name: "Health Kitty",
        role: Role::Passive,
        cap: 5,
        description: "+2 max vitality per level",
    },
    AbilityDefinition {
        key: AbilityKey::Zoom,
        name: "Zoom",
        role: Role::Passive,
        cap: 3,
        description: "Dash forward, +4 blocks per level",
    },
];

/// Level cap of `key` for a participant of `role`
pub fn cap(role: Role, key: AbilityKey) -> Result<u8> {
    let def = key.definition();
    if def.role != role {
        return Err(ProgressionError::role_mismatch(key.as_str(), role));
    }
    Ok(def.cap)
}

/// Numeric magnitude of `key` at `level` (levels above the cap count as the cap)
///
/// | ability | magnitude |
/// |---|---|
/// | claws, purring | effect amplifier, `level - 1` |
/// | rabies | on-hit chance in percent |
/// | protectivefur | damage reduction fraction |
/// | healthkitty | max vitality bonus |
/// | zoom | dash distance in blocks |
pub fn effect(key: AbilityKey, level: u8) -> f64 {
    let level = f64::from(level.min(key.definition().cap));
    match key {
        AbilityKey::Claws | AbilityKey::Purring => (level - 1.0).max(0.0),
        AbilityKey::Rabies => (level * 5.0).min(25.0),
        AbilityKey::ProtectiveFur => (level * 0.10).min(0.30),
        AbilityKey::HealthKitty => 2.0 * level,
        AbilityKey::Zoom => (4.0 * level).min(12.0),
    }
}

/// Check that `key` can still be raised for this participant, returning its cap
pub fn ensure_upgradable(participant: &Participant, key: AbilityKey) -> Result<u8> {
    let cap = cap(participant.role, key)?;
    if participant.level(key) >= cap {
        return Err(ProgressionError::AlreadyMaxed {
            ability: key.as_str(),
            cap,
        });
    }
    Ok(cap)
}

/// Raise `key` by one level
///
/// Fails without touching the participant when the ability belongs to the
/// other role or is already at its cap.
pub fn try_level_up(participant: &mut Participant, key: AbilityKey) -> Result<u8> {
    ensure_upgradable(participant, key)?;
    let level = participant.abilities.entry(key).or_insert(0);
    *level += 1;
    Ok(*level)
}

/// One row of the upgrade menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeOption {
    pub key: AbilityKey,
    pub name: &'static str,
    pub level: u8,
    pub cap: u8,
}

impl UpgradeOption {
    pub fn is_maxed(&self) -> bool {
        self.level >= self.cap
    }
}

/// Abilities selectable for the participant's role, in catalog order
pub fn upgrade_options(participant: &Participant) -> Vec<UpgradeOption> {
    ABILITY_CATALOG
        .iter()
        .filter(|def| def.role == participant.role)
        .map(|def| UpgradeOption {
            key: def.key,
            name: def.name,
            level: participant.level(def.key).min(def.cap),
            cap: def.cap,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ParticipantId;

    fn participant(role: Role) -> Participant {
        Participant::new(ParticipantId::new(), role)
    }

    #[test]
    fn test_catalog_rows_match_enum_order() {
        for key in AbilityKey::ALL {
            assert_eq!(key.definition().key, key);
        }
        assert_eq!(ABILITY_CATALOG.len(), AbilityKey::ALL.len());
    }

    #[test]
    fn test_caps_per_role() {
        assert_eq!(cap(Role::Aggressive, AbilityKey::Claws).unwrap(), 2);
        assert_eq!(cap(Role::Aggressive, AbilityKey::Rabies).unwrap(), 5);
        assert_eq!(cap(Role::Aggressive, AbilityKey::ProtectiveFur).unwrap(), 3);
        assert_eq!(cap(Role::Passive, AbilityKey::Purring).unwrap(), 2);
        assert_eq!(cap(Role::Passive, AbilityKey::HealthKitty).unwrap(), 5);
        assert_eq!(cap(Role::Passive, AbilityKey::Zoom).unwrap(), 3);
        assert!(matches!(
            cap(Role::Aggressive, AbilityKey::Zoom),
            Err(ProgressionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_effect_table() {
        assert_eq!(effect(AbilityKey::Claws, 1), 0.0);
        assert_eq!(effect(AbilityKey::Claws, 2), 1.0);
        assert_eq!(effect(AbilityKey::Rabies, 3), 15.0);
        assert_eq!(effect(AbilityKey::Rabies, 5), 25.0);
        assert!((effect(AbilityKey::ProtectiveFur, 3) - 0.30).abs() < 1e-9);
        assert_eq!(effect(AbilityKey::HealthKitty, 5), 10.0);
        assert_eq!(effect(AbilityKey::Zoom, 2), 8.0);
        assert_eq!(effect(AbilityKey::Zoom, 9), 12.0);
    }

    #[test]
    fn test_effect_is_monotonic() {
        for key in AbilityKey::ALL {
            let cap = key.definition().cap;
            for level in 0..cap {
                assert!(effect(key, level) <= effect(key, level + 1), "{} at {}", key, level);
            }
        }
    }

    #[test]
    fn test_parse_known_and_unknown_keys() {
        assert_eq!("protectivefur".parse::<AbilityKey>().unwrap(), AbilityKey::ProtectiveFur);
        assert_eq!(" Zoom ".parse::<AbilityKey>().unwrap(), AbilityKey::Zoom);
        assert!(matches!(
            "fireball".parse::<AbilityKey>(),
            Err(ProgressionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_level_up_until_maxed() {
        let mut p = participant(Role::Passive);
        assert_eq!(try_level_up(&mut p, AbilityKey::Purring).unwrap(), 1);
        assert_eq!(try_level_up(&mut p, AbilityKey::Purring).unwrap(), 2);
        assert!(matches!(
            try_level_up(&mut p, AbilityKey::Purring),
            Err(ProgressionError::AlreadyMaxed { cap: 2, .. })
        ));
        assert_eq!(p.level(AbilityKey::Purring), 2);
    }

    #[test]
    fn test_level_up_wrong_role_does_not_mutate() {
        let mut p = participant(Role::Passive);
        let before = p.clone();
        assert!(matches!(
            try_level_up(&mut p, AbilityKey::Claws),
            Err(ProgressionError::Unavailable(_))
        ));
        assert_eq!(p, before);
    }

    #[test]
    fn test_upgrade_options_follow_role() {
        let mut p = participant(Role::Aggressive);
        p.abilities.insert(AbilityKey::Claws, 2);
        let options = upgrade_options(&p);
        let keys: Vec<_> = options.iter().map(|o| o.key).collect();
        assert_eq!(
            keys,
            vec![AbilityKey::Claws, AbilityKey::Rabies, AbilityKey::ProtectiveFur]
        );
        assert!(options[0].is_maxed());
        assert!(!options[1].is_maxed());
    }
}
