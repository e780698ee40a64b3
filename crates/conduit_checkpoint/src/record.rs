//! Processing records.

use crate::cursor::{CursorConfig, CursorStrategy};
use crate::resume::{advance, ResumePoint};
use chrono::{DateTime, Utc};
use conduit_connector::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifies one synchronized resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Tenant identifier.
    pub tenant: String,
    /// Connector name.
    pub connector: String,
    /// Upstream resource, e.g. `orders`.
    pub resource: String,
}

impl RecordKey {
    /// Creates a key.
    pub fn new(
        tenant: impl Into<String>,
        connector: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            connector: connector.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.connector, self.resource)
    }
}

/// Status of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Finished without error.
    Success,
    /// Stopped by an error.
    Failure,
    /// Currently running, or the process died mid-run.
    InProgress,
    /// Stopped on request.
    Cancelled,
}

/// Classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing credential or parameter, unknown operation.
    Configuration,
    /// Upstream rejected the credentials.
    AuthenticationFailed,
    /// Credentials lack permission.
    AuthorizationDenied,
    /// Requested record does not exist.
    NotFound,
    /// Upstream failure after retries.
    Upstream,
    /// Deadline exceeded after retries.
    Timeout,
    /// Connector reached outside its capabilities.
    CapabilityDenied,
    /// The record store or sink failed.
    Storage,
    /// The run was cancelled or preempted.
    Interrupted,
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Configuration => FailureKind::Configuration,
            ErrorKind::AuthenticationFailed => FailureKind::AuthenticationFailed,
            ErrorKind::AuthorizationDenied => FailureKind::AuthorizationDenied,
            ErrorKind::NotFound => FailureKind::NotFound,
            ErrorKind::Upstream => FailureKind::Upstream,
            ErrorKind::Timeout => FailureKind::Timeout,
            ErrorKind::CapabilityDenied => FailureKind::CapabilityDenied,
        }
    }
}

/// Details of the last failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Failure classification.
    pub kind: FailureKind,
    /// Error message.
    pub message: String,
    /// Hint for the tenant, if one applies.
    pub remediation: Option<String>,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Runs started.
    pub runs: u64,
    /// Pages checkpointed.
    pub pages: u64,
    /// Records delivered.
    pub records: u64,
}

/// Durable per-resource sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Resource identity.
    pub key: RecordKey,
    /// Where the next run starts.
    pub resume_point: Option<ResumePoint>,
    /// Cursor settings used for the last run.
    pub cursor: Option<CursorConfig>,
    /// Status of the last run.
    pub status: RunStatus,
    /// Failure details of the last run, cleared on success.
    pub last_failure: Option<FailureInfo>,
    /// Identifier of the last run.
    pub last_run_id: Option<Uuid>,
    /// Lifetime counters.
    #[serde(default)]
    pub counters: RunCounters,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    /// Creates the record for a resource's first run.
    pub fn new(key: RecordKey, cursor: Option<CursorConfig>) -> Self {
        Self {
            key,
            resume_point: None,
            cursor,
            status: RunStatus::InProgress,
            last_failure: None,
            last_run_id: None,
            counters: RunCounters::default(),
            updated_at: Utc::now(),
        }
    }

    /// The stored resume value, if any.
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume_point
            .as_ref()
            .map(|point| &point.value)
            .filter(|value| !value.is_null())
    }

    /// Marks the start of a run.
    pub fn begin_run(&mut self, run_id: Uuid, cursor: Option<CursorConfig>) {
        // A changed strategy invalidates the stored value.
        let strategy_changed = match (&self.resume_point, &cursor) {
            (Some(point), Some(cursor)) => point.strategy != cursor.strategy,
            (Some(_), None) => true,
            _ => false,
        };
        if strategy_changed {
            tracing::info!(key = %self.key, "cursor strategy changed; discarding resume point");
            self.resume_point = None;
        }

        self.cursor = cursor;
        self.status = RunStatus::InProgress;
        self.last_run_id = Some(run_id);
        self.counters.runs += 1;
        self.touch();
    }

    /// Records a fully processed page and moves the resume point forward.
    ///
    /// Returns true if the stored resume value changed.
    pub fn complete_page(&mut self, candidate: Value, strategy: CursorStrategy, delivered: usize) -> bool {
        let previous = self
            .resume_point
            .as_ref()
            .map(|point| point.value.clone())
            .unwrap_or(Value::Null);
        let next = advance(&previous, candidate, strategy);
        let changed = next != previous;
        if !next.is_null() {
            self.resume_point = Some(ResumePoint::new(next, strategy));
        }

        self.counters.pages += 1;
        self.counters.records += delivered as u64;
        self.touch();
        changed
    }

    /// Marks the run successful.
    pub fn mark_success(&mut self) {
        self.status = RunStatus::Success;
        self.last_failure = None;
        self.touch();
    }

    /// Marks the run failed. The resume point is left as is.
    pub fn mark_failure(&mut self, failure: FailureInfo) {
        self.status = RunStatus::Failure;
        self.last_failure = Some(failure);
        self.touch();
    }

    /// Marks the run cancelled.
    pub fn mark_cancelled(&mut self) {
        self.status = RunStatus::Cancelled;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::TimestampFormat;
    use serde_json::json;

    fn record() -> ProcessingRecord {
        ProcessingRecord::new(
            RecordKey::new("acme", "shop", "orders"),
            Some(CursorConfig::timestamp("updated_at", TimestampFormat::Iso)),
        )
    }

    #[test]
    fn pages_move_resume_point_forward_only() {
        let mut record = record();
        assert!(record.resume_value().is_none());

        assert!(record.complete_page(json!(200), CursorStrategy::FindByTimestamp, 3));
        assert!(!record.complete_page(json!(100), CursorStrategy::FindByTimestamp, 1));
        assert!(!record.complete_page(Value::Null, CursorStrategy::FindByTimestamp, 0));

        assert_eq!(record.resume_value(), Some(&json!(200)));
        assert_eq!(record.counters.pages, 3);
        assert_eq!(record.counters.records, 4);
    }

    #[test]
    fn failure_keeps_resume_point_and_success_clears_failure() {
        let mut record = record();
        record.complete_page(json!(50), CursorStrategy::FindByTimestamp, 1);
        record.mark_failure(FailureInfo {
            kind: FailureKind::Upstream,
            message: "HTTP 502".into(),
            remediation: None,
        });
        assert_eq!(record.status, RunStatus::Failure);
        assert_eq!(record.resume_value(), Some(&json!(50)));

        record.begin_run(Uuid::new_v4(), record.cursor.clone());
        record.mark_success();
        assert!(record.last_failure.is_none());
        assert_eq!(record.counters.runs, 1);
    }

    #[test]
    fn strategy_change_discards_resume_point() {
        let mut record = record();
        record.complete_page(json!(50), CursorStrategy::FindByTimestamp, 1);
        record.begin_run(
            Uuid::new_v4(),
            Some(CursorConfig::new("id", CursorStrategy::FindById)),
        );
        assert!(record.resume_point.is_none());
    }

    #[test]
    fn failure_kind_from_connector_kind() {
        assert_eq!(
            FailureKind::from(ErrorKind::AuthenticationFailed),
            FailureKind::AuthenticationFailed
        );
        assert_eq!(
            serde_json::to_value(FailureKind::CapabilityDenied).unwrap(),
            json!("capability_denied")
        );
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = record();
        record.complete_page(json!(1_700_000_000_000i64), CursorStrategy::FindByTimestamp, 2);
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: ProcessingRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
