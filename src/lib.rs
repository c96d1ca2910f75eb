//! CATSMP Progression - per-participant role, blood point and ability engine

pub mod core;
pub mod host;
pub mod progression;

pub use crate::core::error::{ProgressionError, Result};
