//! In-process host keeping live entity state in memory
//!
//! Used by the headless driver and the test suites. Records every impulse
//! and every effect addition so callers can inspect what the engine did.

use crate::core::error::{ProgressionError, Result};
use crate::core::types::ParticipantId;
use crate::host::{EffectKind, Host, StatusEffect};
use ahash::AHashMap;
use glam::Vec3;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default max vitality of a freshly connected entity
pub const DEFAULT_MAX_VITALITY: f64 = 20.0;

/// Live state of one connected entity
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntity {
    pub effects: BTreeMap<EffectKind, StatusEffect>,
    pub max_vitality: f64,
    pub vitality: f64,
    pub impulses: Vec<Vec3>,
}

impl Default for LiveEntity {
    fn default() -> Self {
        Self {
            effects: BTreeMap::new(),
            max_vitality: DEFAULT_MAX_VITALITY,
            vitality: DEFAULT_MAX_VITALITY,
            impulses: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHost {
    entities: Mutex<AHashMap<ParticipantId, LiveEntity>>,
    effect_adds: AtomicUsize,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `id` a live handle (fresh entity if not already online)
    pub fn connect(&self, id: ParticipantId) {
        self.lock().entry(id).or_default();
    }

    /// Drop the live handle of `id`
    pub fn disconnect(&self, id: ParticipantId) {
        self.lock().remove(&id);
    }

    /// Snapshot of the live entity
    pub fn entity(&self, id: ParticipantId) -> Option<LiveEntity> {
        self.lock().get(&id).cloned()
    }

    pub fn impulses(&self, id: ParticipantId) -> Vec<Vec3> {
        self.lock()
            .get(&id)
            .map(|e| e.impulses.clone())
            .unwrap_or_default()
    }

    /// Total `add_status_effect` calls across all entities
    pub fn effect_add_count(&self) -> usize {
        self.effect_adds.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<ParticipantId, LiveEntity>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entity<R>(&self, id: ParticipantId, f: impl FnOnce(&mut LiveEntity) -> R) -> Result<R> {
        let mut entities = self.lock();
        let entity = entities.get_mut(&id).ok_or(ProgressionError::NotFound(id))?;
        Ok(f(entity))
    }
}

impl Host for InMemoryHost {
    fn is_online(&self, id: ParticipantId) -> bool {
        self.lock().contains_key(&id)
    }

    fn status_effects(&self, id: ParticipantId) -> Result<Vec<StatusEffect>> {
        self.with_entity(id, |e| e.effects.values().copied().collect())
    }

    fn add_status_effect(&self, id: ParticipantId, effect: StatusEffect) -> Result<()> {
        self.with_entity(id, |e| {
            e.effects.insert(effect.kind, effect);
        })?;
        self.effect_adds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_status_effect(&self, id: ParticipantId, kind: EffectKind) -> Result<()> {
        self.with_entity(id, |e| {
            e.effects.remove(&kind);
        })
    }

    fn max_vitality(&self, id: ParticipantId) -> Result<f64> {
        self.with_entity(id, |e| e.max_vitality)
    }

    fn set_max_vitality(&self, id: ParticipantId, value: f64) -> Result<()> {
        self.with_entity(id, |e| e.max_vitality = value)
    }

    fn vitality(&self, id: ParticipantId) -> Result<f64> {
        self.with_entity(id, |e| e.vitality)
    }

    fn set_vitality(&self, id: ParticipantId, value: f64) -> Result<()> {
        self.with_entity(id, |e| e.vitality = value.clamp(0.0, e.max_vitality))
    }

    fn apply_impulse(&self, id: ParticipantId, impulse: Vec3) -> Result<()> {
        self.with_entity(id, |e| e.impulses.push(impulse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_calls_fail_not_found() {
        let host = InMemoryHost::new();
        let id = ParticipantId::new();
        assert!(!host.is_online(id));
        assert!(matches!(
            host.apply_impulse(id, Vec3::X),
            Err(ProgressionError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_replaces_same_kind() {
        let host = InMemoryHost::new();
        let id = ParticipantId::new();
        host.connect(id);
        host.add_status_effect(id, StatusEffect::standing(EffectKind::Strength, 0))
            .unwrap();
        host.add_status_effect(id, StatusEffect::standing(EffectKind::Strength, 1))
            .unwrap();
        let effects = host.status_effects(id).unwrap();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].amplifier, 1);
        assert_eq!(host.effect_add_count(), 2);
    }

    #[test]
    fn test_vitality_clamped_to_max() {
        let host = InMemoryHost::new();
        let id = ParticipantId::new();
        host.connect(id);
        host.set_vitality(id, 99.0).unwrap();
        assert_eq!(host.vitality(id).unwrap(), DEFAULT_MAX_VITALITY);
        host.disconnect(id);
        assert!(host.entity(id).is_none());
    }
}
