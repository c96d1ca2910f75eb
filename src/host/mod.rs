//! Host boundary - what the engine needs from the game runtime
//!
//! The host owns live entities: their status effects, vitality and motion.
//! Every call is keyed by participant id and fails with `NotFound` when the
//! participant has no live handle (offline).

pub mod memory;

use crate::core::error::Result;
use crate::core::types::ParticipantId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryHost;

/// Status effects this engine manages on live entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Regeneration,
    Strength,
    Wither,
}

impl EffectKind {
    /// Every kind the engine may add, cleared or replaced on each apply
    pub const MANAGED: [EffectKind; 3] = [Self::Regeneration, Self::Strength, Self::Wither];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectDuration {
    Infinite,
    /// Host ticks (20 per second)
    Ticks(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: EffectKind,
    /// 0-based amplifier (0 = level I)
    pub amplifier: u8,
    pub duration: EffectDuration,
    pub ambient: bool,
    pub particles: bool,
}

impl StatusEffect {
    /// Standing effect granted by an unlocked ability
    pub fn standing(kind: EffectKind, amplifier: u8) -> Self {
        Self {
            kind,
            amplifier,
            duration: EffectDuration::Infinite,
            ambient: true,
            particles: false,
        }
    }

    /// Short effect applied by an on-hit roll
    pub fn timed(kind: EffectKind, amplifier: u8, ticks: u32) -> Self {
        Self {
            kind,
            amplifier,
            duration: EffectDuration::Ticks(ticks),
            ambient: true,
            particles: false,
        }
    }
}

/// Source of incoming damage, as reported by the pre-mitigation hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageCause {
    Fall,
    Attack,
    Other,
}

pub trait Host: Send + Sync {
    fn is_online(&self, id: ParticipantId) -> bool;

    fn status_effects(&self, id: ParticipantId) -> Result<Vec<StatusEffect>>;

    /// Add an effect, replacing any effect of the same kind
    fn add_status_effect(&self, id: ParticipantId, effect: StatusEffect) -> Result<()>;

    fn remove_status_effect(&self, id: ParticipantId, kind: EffectKind) -> Result<()>;

    fn max_vitality(&self, id: ParticipantId) -> Result<f64>;

    fn set_max_vitality(&self, id: ParticipantId, value: f64) -> Result<()>;

    fn vitality(&self, id: ParticipantId) -> Result<f64>;

    fn set_vitality(&self, id: ParticipantId, value: f64) -> Result<()>;

    fn apply_impulse(&self, id: ParticipantId, impulse: Vec3) -> Result<()>;
}
