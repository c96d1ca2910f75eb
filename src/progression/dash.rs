//! Dash controller - the one active, cooldown-gated ability
//!
//! Per participant the controller is either Ready or Cooling. The Cooling ->
//! Ready edge is never scheduled: it is derived from the last dash timestamp
//! each time someone asks.

use crate::core::error::{ProgressionError, Result};
use crate::core::types::Millis;
use crate::progression::catalog::{self, AbilityKey};
use crate::progression::participant::Participant;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashState {
    Ready,
    Cooling { remaining_ms: u64 },
}

/// Movement produced by a successful dash
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashImpulse {
    pub distance: f64,
    pub impulse: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct DashController {
    cooldown_ms: u64,
    min_vertical: f32,
}

impl DashController {
    pub fn new(cooldown_ms: u64, min_vertical: f32) -> Self {
        Self {
            cooldown_ms,
            min_vertical,
        }
    }

    pub fn state(&self, participant: &Participant, now: Millis) -> DashState {
        match participant.last_dash {
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                if elapsed < self.cooldown_ms {
                    DashState::Cooling {
                        remaining_ms: self.cooldown_ms - elapsed,
                    }
                } else {
                    DashState::Ready
                }
            }
            None => DashState::Ready,
        }
    }

    /// Try to dash towards `facing`
    ///
    /// Checks the zoom level first, then the cooldown. Only a successful
    /// dash stamps `last_dash`.
    pub fn invoke(
        &self,
        participant: &mut Participant,
        facing: Vec3,
        now: Millis,
    ) -> Result<DashImpulse> {
        let level = participant.effective_level(AbilityKey::Zoom);
        if level == 0 {
            return Err(ProgressionError::AbilityLocked);
        }
        if let DashState::Cooling { remaining_ms } = self.state(participant, now) {
            return Err(ProgressionError::OnCooldown { remaining_ms });
        }

        let distance = catalog::effect(AbilityKey::Zoom, level);
        participant.last_dash = Some(now);

        let mut impulse = facing.normalize_or_zero() * distance as f32;
        impulse.y = impulse.y.max(self.min_vertical);
        Ok(DashImpulse { distance, impulse })
    }
}

/// Crouch-after-jump: crouch just started while still moving upward
pub fn is_combo_gesture(started_crouching: bool, velocity: Vec3) -> bool {
    started_crouching && velocity.y > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ParticipantId, Role};

    fn zoomer(level: u8) -> Participant {
        let mut p = Participant::new(ParticipantId::new(), Role::Passive);
        if level > 0 {
            p.abilities.insert(AbilityKey::Zoom, level);
        }
        p
    }

    fn controller() -> DashController {
        DashController::new(5_000, 0.2)
    }

    #[test]
    fn test_locked_without_zoom() {
        let mut p = zoomer(0);
        let result = controller().invoke(&mut p, Vec3::X, 10_000);
        assert!(matches!(result, Err(ProgressionError::AbilityLocked)));
        assert_eq!(p.last_dash, None);
    }

    #[test]
    fn test_locked_for_other_role() {
        let mut p = zoomer(3);
        p.role = Role::Aggressive;
        let result = controller().invoke(&mut p, Vec3::X, 10_000);
        assert!(matches!(result, Err(ProgressionError::AbilityLocked)));
    }

    #[test]
    fn test_cooldown_sequence() {
        let dash = controller();
        let mut p = zoomer(2);

        let first = dash.invoke(&mut p, Vec3::X, 10_000).unwrap();
        assert_eq!(first.distance, 8.0);

        let second = dash.invoke(&mut p, Vec3::X, 11_000);
        assert!(matches!(
            second,
            Err(ProgressionError::OnCooldown { remaining_ms: 4_000 })
        ));
        assert_eq!(p.last_dash, Some(10_000));

        assert!(dash.invoke(&mut p, Vec3::X, 15_001).is_ok());
        assert_eq!(p.last_dash, Some(15_001));
    }

    #[test]
    fn test_ready_exactly_at_cooldown() {
        let dash = controller();
        let mut p = zoomer(1);
        dash.invoke(&mut p, Vec3::Z, 0).unwrap();
        assert_eq!(dash.state(&p, 4_999), DashState::Cooling { remaining_ms: 1 });
        assert_eq!(dash.state(&p, 5_000), DashState::Ready);
    }

    #[test]
    fn test_impulse_is_scaled_and_lifted() {
        let dash = controller();
        let mut p = zoomer(3);
        let out = dash.invoke(&mut p, Vec3::new(3.0, -4.0, 0.0), 0).unwrap();
        assert_eq!(out.distance, 12.0);
        assert!((out.impulse.x - 7.2).abs() < 1e-4);
        assert!((out.impulse.y - 0.2).abs() < 1e-6);
        assert_eq!(out.impulse.z, 0.0);
    }

    #[test]
    fn test_upward_facing_keeps_vertical() {
        let dash = controller();
        let mut p = zoomer(1);
        let out = dash.invoke(&mut p, Vec3::Y, 0).unwrap();
        assert!((out.impulse.y - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_combo_gesture_detection() {
        assert!(is_combo_gesture(true, Vec3::new(0.0, 0.4, 0.0)));
        assert!(!is_combo_gesture(true, Vec3::new(0.0, -0.1, 0.0)));
        assert!(!is_combo_gesture(false, Vec3::new(0.0, 0.4, 0.0)));
    }
}
