//! Progression service - reacts to host events and serves menu/command callers
//!
//! Every handler touches the store through a single `mutate` (or
//! `mutate_pair` for kills), so each event is atomic with respect to the
//! records it changes. Host calls happen after the record lock is released.

use crate::core::clock::Clock;
use crate::core::config::ProgressionConfig;
use crate::core::error::{ProgressionError, Result};
use crate::core::types::{ParticipantId, Role};
use crate::host::{DamageCause, EffectKind, Host, StatusEffect};
use crate::progression::catalog::{self, AbilityKey, UpgradeOption};
use crate::progression::dash::{DashController, DashState};
use crate::progression::effects::{EffectApplier, EffectDelta};
use crate::progression::ledger;
use crate::progression::participant::Participant;
use crate::progression::store::ProgressionStore;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};

/// Re-apply attempts when the record changes while effects are being pushed
const EFFECT_SYNC_ATTEMPTS: usize = 3;

/// Balances after a kill was credited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillCredit {
    pub killer_balance: u8,
    pub victim_balance: u8,
    /// Victim had currency to give, so the killer was credited (up to the cap)
    pub transferred: bool,
}

pub struct ProgressionService {
    store: Arc<ProgressionStore>,
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    effects: EffectApplier,
    dash: DashController,
    config: ProgressionConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl ProgressionService {
    pub fn new(
        config: ProgressionConfig,
        store: Arc<ProgressionStore>,
        host: Arc<dyn Host>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => {
                // Separate stream from the store's role rolls
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(1);
                rng
            }
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            store,
            host,
            clock,
            effects: EffectApplier::new(config.base_max_vitality),
            dash: DashController::new(config.dash_cooldown_ms, config.dash_min_vertical),
            config,
            rng: Mutex::new(rng),
        })
    }

    pub fn store(&self) -> &ProgressionStore {
        &self.store
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    // === HOST EVENTS ===

    /// Connect (or reconnect): ensure a record, push effects, persist
    pub fn on_join(&self, id: ParticipantId) -> Result<Participant> {
        let participant = self.store.get(id)?;
        self.sync_effects(id)?;
        // A failed write is logged by the store and retried on the next mutation
        let _ = self.store.flush(id);
        tracing::info!(participant = %id, role = %participant.role, "Participant joined");
        Ok(participant)
    }

    /// Move one unit of currency from victim to killer
    ///
    /// The killer is only credited if the victim had something to lose. The
    /// victim is debited either way, floored at zero.
    pub fn on_kill_credit(
        &self,
        killer: ParticipantId,
        victim: ParticipantId,
    ) -> Result<KillCredit> {
        if killer == victim {
            let p = self.store.get(killer)?;
            tracing::debug!(participant = %killer, "Ignoring self-inflicted kill");
            return Ok(KillCredit {
                killer_balance: p.currency,
                victim_balance: p.currency,
                transferred: false,
            });
        }

        let credit = self.store.mutate_pair(killer, victim, |k, v| {
            let transferred = v.currency > 0;
            if transferred {
                k.currency = ledger::grant(k.currency);
            }
            v.currency = ledger::spend(v.currency).0;
            Ok(KillCredit {
                killer_balance: k.currency,
                victim_balance: v.currency,
                transferred,
            })
        })?;
        tracing::info!(
            killer = %killer,
            victim = %victim,
            killer_balance = credit.killer_balance,
            victim_balance = credit.victim_balance,
            "Kill credited"
        );
        Ok(credit)
    }

    /// Attacker landed a hit; may roll the rabies debuff onto the defender
    ///
    /// Never changes the damage amount.
    pub fn on_damage_dealt(
        &self,
        attacker: ParticipantId,
        defender: ParticipantId,
        base_damage: f64,
    ) -> Result<f64> {
        let Some(a) = self.store.peek(attacker) else {
            return Ok(base_damage);
        };
        let level = a.effective_level(AbilityKey::Rabies);
        if a.role != Role::Aggressive || level == 0 {
            return Ok(base_damage);
        }

        let chance = catalog::effect(AbilityKey::Rabies, level);
        let roll: u32 = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..100);
        if f64::from(roll) < chance {
            let debuff = StatusEffect::timed(
                EffectKind::Wither,
                self.config.rabies_debuff_amplifier,
                self.config.rabies_debuff_ticks,
            );
            match self.host.add_status_effect(defender, debuff) {
                Ok(()) => {
                    tracing::debug!(attacker = %attacker, defender = %defender, "Rabies debuff applied")
                }
                Err(e) => {
                    tracing::warn!(defender = %defender, "Rabies debuff not applied: {}", e)
                }
            }
        }
        Ok(base_damage)
    }

    /// Damage about to hit `id`, returns the mitigated amount
    pub fn on_damage_taken(&self, id: ParticipantId, base_damage: f64, cause: DamageCause) -> f64 {
        if cause == DamageCause::Fall && self.config.cancel_fall_damage {
            return 0.0;
        }
        let Some(p) = self.store.peek(id) else {
            return base_damage;
        };
        let level = p.effective_level(AbilityKey::ProtectiveFur);
        if p.role != Role::Aggressive || level == 0 {
            return base_damage;
        }
        base_damage * (1.0 - catalog::effect(AbilityKey::ProtectiveFur, level))
    }

    /// Combo gesture observed by the host; dashes if the participant opted in
    ///
    /// `Ok(None)` means the combo toggle is off and nothing happened.
    pub fn on_combo_gesture(&self, id: ParticipantId, facing: Vec3) -> Result<Option<f64>> {
        if !self.store.get(id)?.dash_combo_enabled {
            return Ok(None);
        }
        self.trigger_dash(id, facing).map(Some)
    }

    // === MENU / COMMAND OPERATIONS ===

    /// Buy one level of `key`, debiting `upgrade_cost` in the same mutation
    pub fn request_upgrade(&self, id: ParticipantId, key: AbilityKey) -> Result<u8> {
        self.require_online(id)?;
        let cost = self.config.upgrade_cost;
        let level = self.store.mutate(id, |p| {
            catalog::ensure_upgradable(p, key)?;
            let (balance, paid) = ledger::spend_many(p.currency, cost);
            if !paid {
                return Err(ProgressionError::InsufficientCurrency {
                    balance: p.currency,
                    cost,
                });
            }
            p.currency = balance;
            catalog::try_level_up(p, key)
        })?;
        tracing::info!(participant = %id, ability = %key, level, "Ability upgraded");

        if let Err(e) = self.sync_effects(id) {
            tracing::warn!(participant = %id, "Upgrade stored but effects not applied: {}", e);
        }
        Ok(level)
    }

    /// [`Self::request_upgrade`] for a raw key from a menu click or command
    pub fn request_upgrade_named(&self, id: ParticipantId, key: &str) -> Result<u8> {
        let key: AbilityKey = key.parse()?;
        self.request_upgrade(id, key)
    }

    /// Flip the combo toggle, returning the new value
    pub fn toggle_combo(&self, id: ParticipantId) -> Result<bool> {
        self.store.mutate(id, |p| {
            p.dash_combo_enabled = !p.dash_combo_enabled;
            Ok(p.dash_combo_enabled)
        })
    }

    /// Dash towards `facing`, returning the distance covered
    ///
    /// If the host rejects the impulse the cooldown is handed back.
    pub fn trigger_dash(&self, id: ParticipantId, facing: Vec3) -> Result<f64> {
        self.require_online(id)?;
        let now = self.clock.now_ms();
        let (out, previous) = self.store.mutate(id, |p| {
            let previous = p.last_dash;
            Ok((self.dash.invoke(p, facing, now)?, previous))
        })?;
        if let Err(e) = self.host.apply_impulse(id, out.impulse) {
            // Leave a newer dash stamp alone
            let _ = self.store.mutate(id, |p| {
                if p.last_dash == Some(now) {
                    p.last_dash = previous;
                }
                Ok(())
            });
            return Err(e);
        }
        tracing::debug!(participant = %id, distance = out.distance, "Dash");
        Ok(out.distance)
    }

    pub fn dash_state(&self, id: ParticipantId) -> Result<DashState> {
        let p = self.store.get(id)?;
        Ok(self.dash.state(&p, self.clock.now_ms()))
    }

    pub fn upgrade_options(&self, id: ParticipantId) -> Result<Vec<UpgradeOption>> {
        Ok(catalog::upgrade_options(&self.store.get(id)?))
    }

    pub fn participant(&self, id: ParticipantId) -> Result<Participant> {
        self.store.get(id)
    }

    pub fn get_currency(&self, id: ParticipantId) -> Result<u8> {
        Ok(self.store.get(id)?.currency)
    }

    /// Spend one unit if available
    pub fn try_spend_currency(&self, id: ParticipantId) -> Result<bool> {
        self.store.mutate(id, |p| {
            let (balance, spent) = ledger::spend(p.currency);
            p.currency = balance;
            Ok(spent)
        })
    }

    // === ADMINISTRATIVE ===
    // Permission checks belong to the command layer.

    pub fn admin_grant(&self, id: ParticipantId, amount: i64) -> Result<u8> {
        self.require_online(id)?;
        self.admin_currency(id, |current| ledger::grant_n(current, amount))
    }

    pub fn admin_remove(&self, id: ParticipantId, amount: i64) -> Result<u8> {
        self.require_online(id)?;
        self.admin_currency(id, |current| ledger::debit_n(current, amount))
    }

    pub fn admin_set(&self, id: ParticipantId, amount: i64) -> Result<u8> {
        self.require_online(id)?;
        self.admin_currency(id, |_| ledger::set_exact(amount))
    }

    /// Override a participant's role and re-derive their effects
    ///
    /// Levels of the previous role stay stored but stop counting.
    pub fn set_role(&self, id: ParticipantId, role: Role) -> Result<Participant> {
        self.require_online(id)?;
        let participant = self.store.mutate(id, |p| {
            p.role = role;
            Ok(p.clone())
        })?;
        tracing::info!(participant = %id, role = %role, "Role overridden");
        self.sync_effects(id)?;
        Ok(participant)
    }

    /// Flush every resident record; call before the process exits
    pub fn shutdown(&self) -> Result<usize> {
        self.store.flush_all()
    }

    fn admin_currency(&self, id: ParticipantId, f: impl FnOnce(u8) -> Result<u8>) -> Result<u8> {
        let balance = self.store.mutate(id, |p| {
            p.currency = f(p.currency)?;
            Ok(p.currency)
        })?;
        tracing::info!(participant = %id, balance, "Currency adjusted by admin");
        Ok(balance)
    }

    /// Push effects for the latest record, retrying if it changed meanwhile
    fn sync_effects(&self, id: ParticipantId) -> Result<EffectDelta> {
        let mut delta = EffectDelta::default();
        for _ in 0..EFFECT_SYNC_ATTEMPTS {
            let (participant, revision) = self.store.snapshot(id)?;
            delta = self.effects.apply(self.host.as_ref(), &participant)?;
            if self.store.revision(id) == Some(revision) {
                break;
            }
        }
        Ok(delta)
    }

    fn require_online(&self, id: ParticipantId) -> Result<()> {
        if self.host.is_online(id) {
            Ok(())
        } else {
            Err(ProgressionError::NotFound(id))
        }
    }
}
