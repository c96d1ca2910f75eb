//! Per-participant progression record and its durable form

use crate::core::types::{Millis, ParticipantId, Role};
use crate::progression::catalog::AbilityKey;
use crate::progression::ledger::{MAX_CURRENCY, STARTING_CURRENCY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ability key -> unlocked level
pub type AbilityLevels = BTreeMap<AbilityKey, u8>;

/// Authoritative progression state for one participant
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: Role,
    /// Blood points, always within `0..=MAX_CURRENCY`
    pub currency: u8,
    pub abilities: AbilityLevels,
    pub dash_combo_enabled: bool,
    /// Session-local, never persisted
    pub last_dash: Option<Millis>,
}

impl Participant {
    /// Fresh record for a first-contact participant
    pub fn new(id: ParticipantId, role: Role) -> Self {
        Self {
            id,
            role,
            currency: STARTING_CURRENCY,
            abilities: AbilityLevels::new(),
            dash_combo_enabled: true,
            last_dash: None,
        }
    }

    /// Stored level, regardless of role
    pub fn level(&self, key: AbilityKey) -> u8 {
        self.abilities.get(&key).copied().unwrap_or(0)
    }

    /// Level that counts for effects: 0 for the other role's abilities,
    /// clamped to the cap otherwise
    pub fn effective_level(&self, key: AbilityKey) -> u8 {
        let def = key.definition();
        if def.role != self.role {
            return 0;
        }
        self.level(key).min(def.cap)
    }

    /// Durable view of this record
    pub fn to_stored(&self) -> StoredParticipant {
        StoredParticipant {
            role: self.role,
            currency: i64::from(self.currency),
            dash_combo_enabled: self.dash_combo_enabled,
            abilities: self
                .abilities
                .iter()
                .map(|(key, level)| (key.as_str().to_string(), i64::from(*level)))
                .collect(),
        }
    }

    /// Rebuild a record from its durable form
    ///
    /// Out-of-range values make the whole record invalid. Ability keys the
    /// catalog does not know are dropped and reported in `ignored`.
    pub fn from_stored(id: ParticipantId, stored: StoredParticipant) -> Result<Restored, String> {
        if stored.currency < 0 || stored.currency > i64::from(MAX_CURRENCY) {
            return Err(format!(
                "currency {} outside 0..={}",
                stored.currency, MAX_CURRENCY
            ));
        }

        let mut abilities = AbilityLevels::new();
        let mut ignored = Vec::new();
        for (raw_key, level) in stored.abilities {
            let Ok(key) = raw_key.parse::<AbilityKey>() else {
                ignored.push(raw_key);
                continue;
            };
            let cap = key.definition().cap;
            if level < 0 || level > i64::from(cap) {
                return Err(format!("{} level {} outside 0..={}", key, level, cap));
            }
            if level > 0 {
                abilities.insert(key, level as u8);
            }
        }

        Ok(Restored {
            participant: Self {
                id,
                role: stored.role,
                currency: stored.currency as u8,
                abilities,
                dash_combo_enabled: stored.dash_combo_enabled,
                last_dash: None,
            },
            ignored,
        })
    }
}

/// Result of [`Participant::from_stored`]
#[derive(Debug)]
pub struct Restored {
    pub participant: Participant,
    /// Unknown ability keys found in the record
    pub ignored: Vec<String>,
}

/// Durable record layout
///
/// Integers are wide so that out-of-range values written by hand still
/// parse and can be reported instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredParticipant {
    pub role: Role,
    #[serde(rename = "bloodpoints")]
    pub currency: i64,
    #[serde(rename = "zoomcombo")]
    pub dash_combo_enabled: bool,
    pub abilities: BTreeMap<String, i64>,
}

impl Default for StoredParticipant {
    fn default() -> Self {
        Self {
            role: Role::Passive,
            currency: i64::from(STARTING_CURRENCY),
            dash_combo_enabled: true,
            abilities: BTreeMap::new(),
        }
    }
}
