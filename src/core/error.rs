use crate::core::types::{ParticipantId, Role};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("Ability unavailable: {0}")]
    Unavailable(String),

    #[error("Ability {ability} already at max level {cap}")]
    AlreadyMaxed { ability: &'static str, cap: u8 },

    #[error("Value {value} outside allowed range 0..={max}")]
    OutOfRange { value: i64, max: u8 },

    #[error("Dash on cooldown: {remaining_ms}ms remaining")]
    OnCooldown { remaining_ms: u64 },

    #[error("Dash ability locked (zoom level 0)")]
    AbilityLocked,

    #[error("Participant not found: {0}")]
    NotFound(ParticipantId),

    #[error("Pair operation needs two distinct participants, got {0} twice")]
    SameParticipant(ParticipantId),

    #[error("Not enough currency: have {balance}, need {cost}")]
    InsufficientCurrency { balance: u8, cost: u8 },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl ProgressionError {
    /// Ability key is known but does not belong to `role`
    pub fn role_mismatch(ability: &str, role: Role) -> Self {
        Self::Unavailable(format!("{} is not a {} ability", ability, role))
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;
