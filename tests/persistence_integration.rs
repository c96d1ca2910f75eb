//! Persistence integration tests
//!
//! Records written through one store must come back intact through a fresh
//! store over the same directory, the way a server restart would see them.

use catsmp_progression::core::config::ProgressionConfig;
use catsmp_progression::core::{ManualClock, ParticipantId, Role};
use catsmp_progression::host::InMemoryHost;
use catsmp_progression::progression::{
    AbilityKey, DurableBackend, JsonDirBackend, MemoryBackend, ProgressionService,
    ProgressionStore, StoredParticipant,
};
use std::sync::Arc;
use tempfile::TempDir;

fn service_over(backend: Arc<dyn DurableBackend>) -> (ProgressionService, Arc<InMemoryHost>) {
    let config = ProgressionConfig {
        seed: Some(11),
        upgrade_cost: 1,
        ..Default::default()
    };
    let store = Arc::new(ProgressionStore::new(backend, config.seed));
    store.load_all().unwrap();
    let host = Arc::new(InMemoryHost::new());
    let clock = Arc::new(ManualClock::new(0));
    let service = ProgressionService::new(config, store, host.clone(), clock).unwrap();
    (service, host)
}

#[test]
fn test_progress_survives_restart() {
    let dir = TempDir::new().unwrap();
    let id = ParticipantId::new();

    {
        let backend = Arc::new(JsonDirBackend::open(dir.path()).unwrap());
        let (service, host) = service_over(backend);
        host.connect(id);
        service.on_join(id).unwrap();
        service.set_role(id, Role::Passive).unwrap();
        service.request_upgrade(id, AbilityKey::Zoom).unwrap();
        service.request_upgrade(id, AbilityKey::Zoom).unwrap();
        service.toggle_combo(id).unwrap();
        service.shutdown().unwrap();
    }

    let backend = Arc::new(JsonDirBackend::open(dir.path()).unwrap());
    let (service, _host) = service_over(backend);
    assert_eq!(service.store().len(), 1);

    let p = service.participant(id).unwrap();
    assert_eq!(p.role, Role::Passive);
    assert_eq!(p.currency, 1);
    assert_eq!(p.level(AbilityKey::Zoom), 2);
    assert!(!p.dash_combo_enabled);
    assert_eq!(service.store().created_count(), 0);
}

#[test]
fn test_record_field_names_match_saved_format() {
    let dir = TempDir::new().unwrap();
    let id = ParticipantId::new();
    let backend = Arc::new(JsonDirBackend::open(dir.path()).unwrap());
    let (service, host) = service_over(backend.clone());
    host.connect(id);
    service.on_join(id).unwrap();
    service.set_role(id, Role::Aggressive).unwrap();
    service.request_upgrade(id, AbilityKey::Rabies).unwrap();
    service.shutdown().unwrap();

    let raw = backend.load(&id.storage_key()).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["role"], "AGGRESSIVE");
    assert_eq!(value["bloodpoints"], 2);
    assert_eq!(value["zoomcombo"], true);
    assert_eq!(value["abilities"]["rabies"], 1);
}

/// A hand-edited file with a stale ability and a missing field still loads.
#[test]
fn test_hand_written_record_loads() {
    let dir = TempDir::new().unwrap();
    let id = ParticipantId::new();
    std::fs::write(
        dir.path().join(format!("{}.json", id.storage_key())),
        r#"{"role":"AGGRESSIVE","bloodpoints":4,"abilities":{"claws":2,"laser":3}}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a record").unwrap();

    let backend = Arc::new(JsonDirBackend::open(dir.path()).unwrap());
    let (service, host) = service_over(backend);
    host.connect(id);
    let p = service.on_join(id).unwrap();
    assert_eq!(p.role, Role::Aggressive);
    assert_eq!(p.currency, 4);
    assert_eq!(p.level(AbilityKey::Claws), 2);
    assert!(p.dash_combo_enabled);
}

/// Out-of-range documents are skipped instead of aborting the load.
#[test]
fn test_malformed_records_are_skipped() {
    let backend = Arc::new(MemoryBackend::new());
    let good = ParticipantId::new();
    backend.insert_raw(
        good.storage_key(),
        serde_json::to_string(&StoredParticipant::default()).unwrap(),
    );
    backend.insert_raw(ParticipantId::new().storage_key(), r#"{"bloodpoints":99}"#);
    backend.insert_raw(ParticipantId::new().storage_key(), "{ nope");
    backend.insert_raw("not-a-uuid", "{}");

    let store = ProgressionStore::new(backend, Some(3));
    let report = store.load_all().unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, 3);
    assert!(store.contains(good));
}

/// A failed write keeps the change in memory and lands on the next flush.
#[test]
fn test_failed_write_is_retried() {
    let backend = Arc::new(MemoryBackend::new());
    let (service, host) = service_over(backend.clone());
    let id = ParticipantId::new();
    host.connect(id);
    service.on_join(id).unwrap();

    backend.set_fail_writes(true);
    service.admin_set(id, 5).unwrap();
    assert!(service.shutdown().is_err());
    assert_eq!(service.get_currency(id).unwrap(), 5);

    backend.set_fail_writes(false);
    service.shutdown().unwrap();
    let raw = backend.raw(&id.storage_key()).unwrap();
    let stored: StoredParticipant = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.currency, 5);
}
