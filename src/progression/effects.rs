//! Effect applier - derives standing status effects from unlocked abilities
//!
//! Application is a diff: compute the desired set from (role, levels), read
//! what the host currently has for the managed kinds, and only push the
//! difference. Applying twice with no state change in between does nothing
//! the second time, so effects never stack.
//!
//! Only standing effects live here. Protective fur and rabies act per event
//! (damage taken / damage dealt) and are resolved by the service.

use crate::core::error::Result;
use crate::core::types::Role;
use crate::host::{EffectKind, Host, StatusEffect};
use crate::progression::catalog::{self, AbilityKey};
use crate::progression::participant::Participant;
use std::collections::BTreeMap;

/// Vitality values closer than this are treated as equal
const VITALITY_EPSILON: f64 = 1e-6;

/// What a participant's live state should look like
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredEffects {
    pub effects: BTreeMap<EffectKind, StatusEffect>,
    pub max_vitality: f64,
}

/// Changes pushed to the host by one [`EffectApplier::apply`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectDelta {
    pub removed: Vec<EffectKind>,
    pub added: Vec<StatusEffect>,
    pub max_vitality: Option<f64>,
    /// New current vitality when it had to shrink to the new max
    pub clamped_vitality: Option<f64>,
}

impl EffectDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.added.is_empty()
            && self.max_vitality.is_none()
            && self.clamped_vitality.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectApplier {
    base_max_vitality: f64,
}

impl EffectApplier {
    pub fn new(base_max_vitality: f64) -> Self {
        Self { base_max_vitality }
    }

    /// Standing effects and max vitality for the participant's current state
    pub fn desired(&self, participant: &Participant) -> DesiredEffects {
        let mut effects = BTreeMap::new();
        let mut max_vitality = self.base_max_vitality;

        match participant.role {
            Role::Passive => {
                let purring = participant.effective_level(AbilityKey::Purring);
                if purring > 0 {
                    let amplifier = catalog::effect(AbilityKey::Purring, purring) as u8;
                    effects.insert(
                        EffectKind::Regeneration,
                        StatusEffect::standing(EffectKind::Regeneration, amplifier),
                    );
                }
                let health = participant.effective_level(AbilityKey::HealthKitty);
                max_vitality += catalog::effect(AbilityKey::HealthKitty, health);
            }
            Role::Aggressive => {
                let claws = participant.effective_level(AbilityKey::Claws);
                if claws > 0 {
                    let amplifier = catalog::effect(AbilityKey::Claws, claws) as u8;
                    effects.insert(
                        EffectKind::Strength,
                        StatusEffect::standing(EffectKind::Strength, amplifier),
                    );
                }
            }
        }

        DesiredEffects {
            effects,
            max_vitality,
        }
    }

    /// Bring the host's live state in line with [`Self::desired`]
    ///
    /// Managed kinds absent from the desired set (including a lingering
    /// on-hit debuff) are removed.
    pub fn apply(&self, host: &dyn Host, participant: &Participant) -> Result<EffectDelta> {
        let id = participant.id;
        let desired = self.desired(participant);
        let current: BTreeMap<EffectKind, StatusEffect> = host
            .status_effects(id)?
            .into_iter()
            .filter(|e| EffectKind::MANAGED.contains(&e.kind))
            .map(|e| (e.kind, e))
            .collect();

        let mut delta = EffectDelta::default();
        for kind in EffectKind::MANAGED {
            match (current.get(&kind), desired.effects.get(&kind)) {
                (Some(have), Some(want)) if have == want => {}
                (have, Some(want)) => {
                    if have.is_some() {
                        host.remove_status_effect(id, kind)?;
                        delta.removed.push(kind);
                    }
                    host.add_status_effect(id, *want)?;
                    delta.added.push(*want);
                }
                (Some(_), None) => {
                    host.remove_status_effect(id, kind)?;
                    delta.removed.push(kind);
                }
                (None, None) => {}
            }
        }

        let max_vitality = host.max_vitality(id)?;
        if (max_vitality - desired.max_vitality).abs() > VITALITY_EPSILON {
            host.set_max_vitality(id, desired.max_vitality)?;
            delta.max_vitality = Some(desired.max_vitality);
        }
        if host.vitality(id)? > desired.max_vitality + VITALITY_EPSILON {
            host.set_vitality(id, desired.max_vitality)?;
            delta.clamped_vitality = Some(desired.max_vitality);
        }

        if !delta.is_empty() {
            tracing::debug!(participant = %id, ?delta, "Applied ability effects");
        }
        Ok(delta)
    }
}
