//! Destinations for fetched records.

use crate::error::SyncResult;
use async_trait::async_trait;
use conduit_checkpoint::RecordKey;
use parking_lot::Mutex;
use serde_json::Value;

/// Receives every page of records before it is checkpointed.
///
/// A page is checkpointed only after `deliver` returns `Ok`, so a failing
/// sink causes the page to be fetched again on the next run.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Delivers one filtered page.
    async fn deliver(&self, key: &RecordKey, records: &[Value]) -> SyncResult<()>;
}

/// Collects delivered pages in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(RecordKey, Vec<Value>)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivered page, in order.
    pub fn batches(&self) -> Vec<(RecordKey, Vec<Value>)> {
        self.batches.lock().clone()
    }

    /// Every record delivered for `key`, in order.
    pub fn records(&self, key: &RecordKey) -> Vec<Value> {
        self.batches
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }

    /// Total number of delivered records.
    pub fn len(&self) -> usize {
        self.batches.lock().iter().map(|(_, r)| r.len()).sum()
    }

    /// Returns true if nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn deliver(&self, key: &RecordKey, records: &[Value]) -> SyncResult<()> {
        self.batches.lock().push((key.clone(), records.to_vec()));
        Ok(())
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl RecordSink for DiscardSink {
    async fn deliver(&self, _key: &RecordKey, _records: &[Value]) -> SyncResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_sink_groups_by_key() {
        let sink = MemorySink::new();
        let orders = RecordKey::new("acme", "shop", "orders");
        let customers = RecordKey::new("acme", "shop", "customers");

        sink.deliver(&orders, &[json!({ "id": 1 })]).await.unwrap();
        sink.deliver(&customers, &[json!({ "id": 9 })]).await.unwrap();
        sink.deliver(&orders, &[json!({ "id": 2 })]).await.unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.records(&orders), vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        assert_eq!(sink.batches().len(), 3);
    }
}
