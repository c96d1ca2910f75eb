//! Resource ledger - bounded counter operations over blood points
//!
//! Every function here keeps `0 <= currency <= MAX_CURRENCY`. They are pure
//! and meant to run inside a store mutation.

use crate::core::error::{ProgressionError, Result};

/// Upper bound on a participant's currency
pub const MAX_CURRENCY: u8 = 5;

/// Currency a brand-new participant starts with
pub const STARTING_CURRENCY: u8 = 3;

/// Add one unit, saturating at the cap
pub fn grant(current: u8) -> u8 {
    current.saturating_add(1).min(MAX_CURRENCY)
}

/// Remove one unit if there is one
///
/// Returns the new balance and whether anything was actually spent.
/// Callers must check the flag before treating the unit as consumed.
pub fn spend(current: u8) -> (u8, bool) {
    if current > 0 {
        (current - 1, true)
    } else {
        (current, false)
    }
}

/// Spend `cost` units at once, all or nothing
pub fn spend_many(current: u8, cost: u8) -> (u8, bool) {
    if current >= cost {
        (current - cost, true)
    } else {
        (current, false)
    }
}

/// Administrative override, bypasses the earn/spend flow
pub fn set_exact(amount: i64) -> Result<u8> {
    if amount < 0 || amount > i64::from(MAX_CURRENCY) {
        return Err(ProgressionError::OutOfRange {
            value: amount,
            max: MAX_CURRENCY,
        });
    }
    Ok(amount as u8)
}

/// Apply `amount` grants in a row (admin add)
pub fn grant_n(current: u8, amount: i64) -> Result<u8> {
    if amount < 0 {
        return Err(ProgressionError::OutOfRange {
            value: amount,
            max: MAX_CURRENCY,
        });
    }
    let room = i64::from(MAX_CURRENCY - current.min(MAX_CURRENCY));
    Ok(current.min(MAX_CURRENCY) + amount.min(room) as u8)
}

/// Apply `amount` debits in a row, flooring at zero (admin remove)
pub fn debit_n(current: u8, amount: i64) -> Result<u8> {
    if amount < 0 {
        return Err(ProgressionError::OutOfRange {
            value: amount,
            max: MAX_CURRENCY,
        });
    }
    Ok(current - amount.min(i64::from(current)) as u8)
}
