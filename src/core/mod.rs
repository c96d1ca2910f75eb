pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProgressionConfig;
pub use error::{ProgressionError, Result};
pub use types::{Millis, ParticipantId, Role};
