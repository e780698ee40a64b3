//! Test fixtures.
//!
//! Record batches, paged scripts and pre-wired invokers for common
//! test scenarios.

use crate::mock::MockHttpClient;
use chrono::{DateTime, Duration, TimeZone, Utc};
use conduit_checkpoint::{CursorConfig, FileRecordStore, RecordKey, TimestampFormat};
use conduit_connector::{
    ConnectorInvoker, ExecuteResult, HostPolicy, MemorySecretStore, Pagination, TenantScope,
    ACCESS_TOKEN_SECRET,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Tenant used by fixtures.
pub const TEST_TENANT: &str = "acme";

/// Connector name used by fixtures.
pub const TEST_CONNECTOR: &str = "shop";

/// Resource used by fixtures.
pub const TEST_RESOURCE: &str = "orders";

/// Token stored for [`TEST_TENANT`].
pub const TEST_TOKEN: &str = "test-token";

/// Host the fixture connectors are allowed to reach.
pub const TEST_HOST: &str = "api.example.com";

/// 2024-05-01T00:00:00Z, the first fixture timestamp.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// The processing record key for the fixture tenant, connector and resource.
pub fn test_key() -> RecordKey {
    RecordKey::new(TEST_TENANT, TEST_CONNECTOR, TEST_RESOURCE)
}

/// A timestamp cursor on `updated_at`, passed back as `updated_at_min`.
pub fn updated_at_cursor() -> CursorConfig {
    CursorConfig::timestamp("updated_at", TimestampFormat::Iso).with_action_param("updated_at_min")
}

/// An order record updated `minutes` after [`base_time`].
pub fn order(id: i64, minutes: i64, status: &str) -> Value {
    let updated = base_time() + Duration::minutes(minutes);
    json!({
        "id": id,
        "status": status,
        "total": id * 10,
        "updated_at": updated.to_rfc3339(),
    })
}

/// `count` open orders with ids from `first_id`, one minute apart.
pub fn orders(first_id: i64, count: usize) -> Vec<Value> {
    (0..count as i64)
        .map(|i| order(first_id + i, first_id + i, "open"))
        .collect()
}

/// Epoch milliseconds of the order with `id` built by [`orders`].
pub fn order_millis(id: i64) -> i64 {
    (base_time() + Duration::minutes(id)).timestamp_millis()
}

/// Splits `records` into pages linked by `page-N` tokens.
pub fn paged(records: Vec<Value>, page_size: usize) -> Vec<ExecuteResult> {
    let page_size = page_size.max(1);
    let chunks: Vec<Vec<Value>> = records.chunks(page_size).map(<[Value]>::to_vec).collect();
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, data)| {
            let pagination = if i + 1 < total {
                Pagination::next(format!("page-{}", i + 2))
            } else {
                Pagination::last()
            };
            ExecuteResult::page("list", data, pagination)
        })
        .collect()
}

/// A secret store holding [`TEST_TOKEN`] for the fixture tenant and `connector`.
pub fn secrets_for(connector: &str) -> Arc<MemorySecretStore> {
    let secrets = Arc::new(MemorySecretStore::new());
    secrets.insert(
        TenantScope::new(TEST_TENANT, connector),
        ACCESS_TOKEN_SECRET,
        TEST_TOKEN,
    );
    secrets
}

/// An invoker whose fixture connector may reach [`TEST_HOST`].
pub fn test_invoker(http: Arc<MockHttpClient>) -> ConnectorInvoker {
    ConnectorInvoker::new(http, secrets_for(TEST_CONNECTOR))
        .with_connector_hosts(TEST_CONNECTOR, HostPolicy::allow([TEST_HOST]))
}

/// A file record store in a temporary directory.
pub struct TempRecordStore {
    /// The store.
    pub store: Arc<FileRecordStore>,
    dir: TempDir,
}

impl TempRecordStore {
    /// Creates a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileRecordStore::open(dir.path()).expect("Failed to open record store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Opens a second store over the same directory.
    pub fn reopen(&self) -> Arc<FileRecordStore> {
        Arc::new(FileRecordStore::open(self.dir.path()).expect("Failed to reopen record store"))
    }

    /// The store directory.
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for TempRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_links_pages_with_tokens() {
        let pages = paged(orders(1, 5), 2);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].pagination.next_page_info.as_deref(), Some("page-2"));
        assert_eq!(pages[1].pagination.next_page_info.as_deref(), Some("page-3"));
        assert!(!pages[2].pagination.has_next_page);
        assert_eq!(pages[2].data.len(), 1);
    }

    #[test]
    fn order_timestamps_line_up_with_ids() {
        let record = order(3, 3, "open");
        let parsed = conduit_checkpoint::parse_timestamp(&record["updated_at"]).unwrap();
        assert_eq!(parsed.timestamp_millis(), order_millis(3));
    }

    #[test]
    fn temp_store_reopens_same_directory() {
        let temp = TempRecordStore::new();
        assert_eq!(temp.reopen().dir(), temp.path());
    }
}
