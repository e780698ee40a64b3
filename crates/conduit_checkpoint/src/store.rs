//! Processing record persistence.

use crate::error::StoreResult;
use crate::record::{ProcessingRecord, RecordKey};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};

/// Durable storage for processing records, plus a per-key run gate.
///
/// The gate serializes runs for one resource: `try_acquire_run` returns
/// `false` while another holder has the key, and `release_run` gives it back.
pub trait ProcessingRecordStore: Send + Sync {
    /// Loads a record.
    fn get(&self, key: &RecordKey) -> StoreResult<Option<ProcessingRecord>>;

    /// Stores a record, replacing any previous version.
    fn put(&self, record: &ProcessingRecord) -> StoreResult<()>;

    /// Loads every record.
    fn list(&self) -> StoreResult<Vec<ProcessingRecord>>;

    /// Tries to take the run gate for `key`.
    fn try_acquire_run(&self, key: &RecordKey) -> StoreResult<bool>;

    /// Releases the run gate for `key`. Releasing a free key is a no-op.
    fn release_run(&self, key: &RecordKey) -> StoreResult<()>;
}

/// In-memory store, for tests and single-process embedders.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordKey, ProcessingRecord>>,
    running: Mutex<HashSet<RecordKey>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns true if a run holds `key`.
    pub fn is_running(&self, key: &RecordKey) -> bool {
        self.running.lock().contains(key)
    }
}

impl ProcessingRecordStore for InMemoryRecordStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<ProcessingRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, record: &ProcessingRecord) -> StoreResult<()> {
        self.records
            .write()
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<ProcessingRecord>> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn try_acquire_run(&self, key: &RecordKey) -> StoreResult<bool> {
        Ok(self.running.lock().insert(key.clone()))
    }

    fn release_run(&self, key: &RecordKey) -> StoreResult<()> {
        self.running.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorStrategy;
    use serde_json::json;

    #[test]
    fn put_get_list() {
        let store = InMemoryRecordStore::new();
        let key = RecordKey::new("acme", "shop", "orders");
        assert!(store.get(&key).unwrap().is_none());

        let mut record = ProcessingRecord::new(key.clone(), None);
        record.complete_page(json!(10), CursorStrategy::FindById, 1);
        store.put(&record).unwrap();
        store
            .put(&ProcessingRecord::new(RecordKey::new("acme", "shop", "customers"), None))
            .unwrap();

        assert_eq!(store.get(&key).unwrap(), Some(record));
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key.resource, "customers");
    }

    #[test]
    fn run_gate_is_exclusive_per_key() {
        let store = InMemoryRecordStore::new();
        let orders = RecordKey::new("acme", "shop", "orders");
        let customers = RecordKey::new("acme", "shop", "customers");

        assert!(store.try_acquire_run(&orders).unwrap());
        assert!(!store.try_acquire_run(&orders).unwrap());
        assert!(store.try_acquire_run(&customers).unwrap());

        store.release_run(&orders).unwrap();
        assert!(!store.is_running(&orders));
        assert!(store.try_acquire_run(&orders).unwrap());
        store.release_run(&RecordKey::new("x", "y", "z")).unwrap();
    }
}
