//! Settings persistence boundary.
//!
//! The record is always written whole; implementations must replace it
//! atomically.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::SettingsRecord;

/// Get/set store for the single settings record
pub trait SettingsStore: Send + Sync {
    fn load_record(&self) -> Result<Option<SettingsRecord>>;

    fn save_record(&self, record: &SettingsRecord) -> Result<()>;

    /// Returns whether a record existed
    fn delete_record(&self) -> Result<bool>;

    /// Drop any cached copy of the record
    fn invalidate_cache(&self) {}
}

/// In-process store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    record: RwLock<Option<SettingsRecord>>,
    writes: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SettingsRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_record(&self) -> Result<Option<SettingsRecord>> {
        let guard = self
            .record
            .read()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save_record(&self, record: &SettingsRecord) -> Result<()> {
        let mut guard = self
            .record
            .write()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;
        *guard = Some(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_record(&self) -> Result<bool> {
        let mut guard = self
            .record
            .write()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;
        Ok(guard.take().is_some())
    }
}
