//! Durable key-value backing for participant records
//!
//! Backends move opaque JSON documents keyed by participant id. Parsing and
//! validation live in the store so one bad record never poisons a load.

use crate::core::error::{ProgressionError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub trait DurableBackend: Send + Sync {
    /// Raw document stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Every (key, document) pair the backend holds
    ///
    /// Entries that cannot be read are skipped with a warning.
    fn load_all(&self) -> Result<Vec<(String, String)>>;

    /// Replace the document stored under `key`
    fn store(&self, key: &str, document: &str) -> Result<()>;
}

const RECORD_EXTENSION: &str = "json";

/// One `<key>.json` file per participant in a directory
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    /// Open (creating if needed) a record directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, RECORD_EXTENSION))
    }
}

impl DurableBackend for JsonDirBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.record_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_all(&self) -> Result<Vec<(String, String)>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(dir = %self.dir.display(), "Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                tracing::warn!(path = %path.display(), "Skipping record with non UTF-8 name");
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(content) => records.push((key.to_string(), content)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable record: {}", e);
                }
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    fn store(&self, key: &str, document: &str) -> Result<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, document)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                ProgressionError::PersistenceFailure(format!("{}: {}", path.display(), e))
            })
    }
}

/// In-memory backend with switchable write failures
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw document, bypassing the write counter
    pub fn insert_raw(&self, key: impl Into<String>, document: impl Into<String>) {
        self.lock().insert(key.into(), document.into());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of successful `store` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following `store` fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn load_all(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn store(&self, key: &str, document: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProgressionError::PersistenceFailure(format!(
                "write of {} rejected",
                key
            )));
        }
        self.lock().insert(key.to_string(), document.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
