//! Progression store - the authoritative table of participant records
//!
//! Each resident record sits behind its own mutex, so events for different
//! participants run in parallel while events for the same participant are
//! serialized. Nothing outside the store holds a mutable alias to a record:
//! readers get clones, writers go through [`ProgressionStore::mutate`].
//!
//! Durable writes never happen under a record lock. A per-record flush gate
//! orders writes, and each write snapshots the latest state, so a slow write
//! can never overwrite a newer one.

use crate::core::error::{ProgressionError, Result};
use crate::core::types::{ParticipantId, Role};
use crate::progression::backend::DurableBackend;
use crate::progression::participant::{Participant, StoredParticipant};
use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

struct Slot {
    participant: Participant,
    /// Bumped whenever a persisted field changes
    revision: u64,
    /// Last revision known to be on durable storage
    flushed: u64,
}

struct Entry {
    slot: Mutex<Slot>,
    flush_gate: Mutex<()>,
}

impl Entry {
    fn new(participant: Participant, revision: u64) -> Self {
        Self {
            slot: Mutex::new(Slot {
                participant,
                revision,
                flushed: 0,
            }),
            flush_gate: Mutex::new(()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of [`ProgressionStore::load_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

pub struct ProgressionStore {
    entries: RwLock<AHashMap<ParticipantId, Arc<Entry>>>,
    backend: Arc<dyn DurableBackend>,
    rng: Mutex<ChaCha8Rng>,
    created: AtomicUsize,
}

impl ProgressionStore {
    /// Create an empty store over `backend`
    ///
    /// `seed` drives role assignment for first-contact participants.
    pub fn new(backend: Arc<dyn DurableBackend>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            entries: RwLock::new(AHashMap::new()),
            backend,
            rng: Mutex::new(rng),
            created: AtomicUsize::new(0),
        }
    }

    /// Populate the resident table from durable storage
    ///
    /// Bad entries are skipped one by one with a warning. Records that are
    /// already resident win over what is on disk.
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for (key, document) in self.backend.load_all()? {
            let Ok(id) = key.parse::<ParticipantId>() else {
                tracing::warn!(key = %key, "Skipping record with bad identifier");
                report.skipped += 1;
                continue;
            };
            match decode(id, &document) {
                Ok(participant) => {
                    self.write_entries()
                        .entry(id)
                        .or_insert_with(|| Arc::new(Entry::new(participant, 0)));
                    report.loaded += 1;
                }
                Err(reason) => {
                    tracing::warn!(participant = %id, "Skipping malformed record: {}", reason);
                    report.skipped += 1;
                }
            }
        }
        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped,
            "Loaded progression records"
        );
        Ok(report)
    }

    /// Resident record for `id`, created with defaults on first contact
    ///
    /// A record missing from memory is first looked up in durable storage.
    /// Defaulting (including the random role roll) happens at most once per id.
    pub fn get(&self, id: ParticipantId) -> Result<Participant> {
        let entry = self.entry(id)?;
        let participant = entry.lock_slot().participant.clone();
        Ok(participant)
    }

    /// Resident record for `id` without creating one
    pub fn peek(&self, id: ParticipantId) -> Option<Participant> {
        let entry = self.read_entries().get(&id).cloned()?;
        let participant = entry.lock_slot().participant.clone();
        Some(participant)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.read_entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident ids, sorted
    pub fn ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.read_entries().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of records created with defaults since startup
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Persisted-state revision of a resident record
    pub fn revision(&self, id: ParticipantId) -> Option<u64> {
        let entry = self.read_entries().get(&id).cloned()?;
        let revision = entry.lock_slot().revision;
        Some(revision)
    }

    /// Record and its revision, read under one lock
    pub fn snapshot(&self, id: ParticipantId) -> Result<(Participant, u64)> {
        let entry = self.entry(id)?;
        let slot = entry.lock_slot();
        Ok((slot.participant.clone(), slot.revision))
    }

    /// Apply `f` to the record for `id` and flush that record only
    ///
    /// `f` runs on a draft; if it fails the record is left untouched. A failed
    /// flush is logged and retried on the next mutation of the same record.
    pub fn mutate<R>(
        &self,
        id: ParticipantId,
        f: impl FnOnce(&mut Participant) -> Result<R>,
    ) -> Result<R> {
        let entry = self.entry(id)?;
        let result = {
            let mut slot = entry.lock_slot();
            let mut draft = slot.participant.clone();
            let result = f(&mut draft)?;
            commit(&mut slot, draft);
            result
        };
        // Failure is logged inside; the record stays dirty for the next attempt
        let _ = self.flush_entry(&entry, false);
        Ok(result)
    }

    /// Apply `f` to two distinct records atomically
    ///
    /// Locks are taken in id order so two pair mutations over the same ids
    /// can never deadlock.
    pub fn mutate_pair<R>(
        &self,
        a: ParticipantId,
        b: ParticipantId,
        f: impl FnOnce(&mut Participant, &mut Participant) -> Result<R>,
    ) -> Result<R> {
        if a == b {
            return Err(ProgressionError::SameParticipant(a));
        }
        let entry_a = self.entry(a)?;
        let entry_b = self.entry(b)?;

        let result = {
            let (first, second) = if a < b {
                (&entry_a, &entry_b)
            } else {
                (&entry_b, &entry_a)
            };
            let mut first_guard = first.lock_slot();
            let mut second_guard = second.lock_slot();
            let (slot_a, slot_b) = if a < b {
                (&mut *first_guard, &mut *second_guard)
            } else {
                (&mut *second_guard, &mut *first_guard)
            };

            let mut draft_a = slot_a.participant.clone();
            let mut draft_b = slot_b.participant.clone();
            let result = f(&mut draft_a, &mut draft_b)?;
            commit(slot_a, draft_a);
            commit(slot_b, draft_b);
            result
        };

        let _ = self.flush_entry(&entry_a, false);
        let _ = self.flush_entry(&entry_b, false);
        Ok(result)
    }

    /// Write one record if it has unflushed changes
    pub fn flush(&self, id: ParticipantId) -> Result<()> {
        let entry = self.entry(id)?;
        self.flush_entry(&entry, false)
    }

    /// Write every resident record, used at shutdown
    ///
    /// Keeps going past failures and reports them together at the end.
    pub fn flush_all(&self) -> Result<usize> {
        let entries: Vec<Arc<Entry>> = self.read_entries().values().cloned().collect();
        let mut written = 0;
        let mut failed = 0;
        for entry in &entries {
            match self.flush_entry(entry, true) {
                Ok(()) => written += 1,
                Err(_) => failed += 1,
            }
        }
        tracing::info!(written, failed, "Flushed progression records");
        if failed > 0 {
            return Err(ProgressionError::PersistenceFailure(format!(
                "{} of {} records failed to flush",
                failed,
                entries.len()
            )));
        }
        Ok(written)
    }

    fn flush_entry(&self, entry: &Entry, force: bool) -> Result<()> {
        let _gate = entry
            .flush_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (id, stored, revision) = {
            let slot = entry.lock_slot();
            if !force && slot.flushed >= slot.revision {
                return Ok(());
            }
            (slot.participant.id, slot.participant.to_stored(), slot.revision)
        };

        let written = serde_json::to_string_pretty(&stored)
            .map_err(ProgressionError::from)
            .and_then(|document| self.backend.store(&id.storage_key(), &document));

        match written {
            Ok(()) => {
                let mut slot = entry.lock_slot();
                slot.flushed = slot.flushed.max(revision);
                tracing::debug!(participant = %id, revision, "Flushed record");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(participant = %id, "Failed to flush record: {}", e);
                Err(e)
            }
        }
    }

    fn entry(&self, id: ParticipantId) -> Result<Arc<Entry>> {
        if let Some(entry) = self.read_entries().get(&id) {
            return Ok(entry.clone());
        }

        // Durable lookup happens outside the table lock
        let restored = self.fetch(id)?;

        let mut entries = self.write_entries();
        let entry = entries.entry(id).or_insert_with(|| match restored {
            Some(participant) => Arc::new(Entry::new(participant, 0)),
            None => {
                let role = self.roll_role();
                self.created.fetch_add(1, Ordering::SeqCst);
                tracing::info!(participant = %id, role = %role, "Created participant record");
                Arc::new(Entry::new(Participant::new(id, role), 1))
            }
        });
        Ok(entry.clone())
    }

    fn fetch(&self, id: ParticipantId) -> Result<Option<Participant>> {
        let Some(document) = self.backend.load(&id.storage_key())? else {
            return Ok(None);
        };
        match decode(id, &document) {
            Ok(participant) => Ok(Some(participant)),
            Err(reason) => {
                tracing::warn!(participant = %id, "Ignoring malformed record: {}", reason);
                Ok(None)
            }
        }
    }

    fn roll_role(&self) -> Role {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen_bool(0.5) {
            Role::Passive
        } else {
            Role::Aggressive
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, AHashMap<ParticipantId, Arc<Entry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, AHashMap<ParticipantId, Arc<Entry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn commit(slot: &mut Slot, mut draft: Participant) {
    draft.id = slot.participant.id;
    if draft.to_stored() != slot.participant.to_stored() {
        slot.revision += 1;
    }
    slot.participant = draft;
}

fn decode(id: ParticipantId, document: &str) -> std::result::Result<Participant, String> {
    let stored: StoredParticipant =
        serde_json::from_str(document).map_err(|e| format!("invalid JSON: {}", e))?;
    let restored = Participant::from_stored(id, stored)?;
    if !restored.ignored.is_empty() {
        tracing::warn!(
            participant = %id,
            keys = ?restored.ignored,
            "Ignoring unknown ability keys"
        );
    }
    Ok(restored.participant)
}
