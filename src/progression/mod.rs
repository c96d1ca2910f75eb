//! Progression engine: roles, blood points, ability levels, effects and dash
//!
//! Leaf-first: `ledger` and `catalog` are pure, `store` owns the records,
//! `effects` and `dash` turn records into host commands, and `service` wires
//! everything to host events.

pub mod backend;
pub mod catalog;
pub mod dash;
pub mod effects;
pub mod ledger;
pub mod participant;
pub mod service;
pub mod store;

pub use backend::{DurableBackend, JsonDirBackend, MemoryBackend};
pub use catalog::{AbilityDefinition, AbilityKey, UpgradeOption, ABILITY_CATALOG};
pub use dash::{is_combo_gesture, DashController, DashImpulse, DashState};
pub use effects::{DesiredEffects, EffectApplier, EffectDelta};
pub use ledger::{MAX_CURRENCY, STARTING_CURRENCY};
pub use participant::{AbilityLevels, Participant, StoredParticipant};
pub use service::{KillCredit, ProgressionService};
pub use store::{LoadReport, ProgressionStore};
