//! Run reports.

use chrono::{DateTime, Utc};
use conduit_checkpoint::{FailureInfo, RecordKey, RunState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What a finished run hands back to its scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunReport {
    /// Run identifier, also recorded on the processing record.
    pub run_id: Uuid,
    /// Resource that was synced.
    pub key: RecordKey,
    /// Terminal state: completed, failed or cancelled.
    pub state: RunState,
    /// Pages checkpointed during this run.
    pub pages: u32,
    /// Records returned by the connector.
    pub fetched: usize,
    /// Records handed to the sink.
    pub delivered: usize,
    /// Records dropped by the post-filter.
    pub filtered_out: usize,
    /// Retried connector calls.
    pub retries: u32,
    /// True if the run stopped at the page limit with pages left.
    pub has_more: bool,
    /// Resume value after the run.
    pub resume_point: Option<Value>,
    /// Failure details, for failed runs.
    pub failure: Option<FailureInfo>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
}

impl SyncRunReport {
    pub(crate) fn start(run_id: Uuid, key: RecordKey) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            key,
            state: RunState::Fetching,
            pages: 0,
            fetched: 0,
            delivered: 0,
            filtered_out: 0,
            retries: 0,
            has_more: false,
            resume_point: None,
            failure: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(
        mut self,
        state: RunState,
        resume_point: Option<Value>,
        failure: Option<FailureInfo>,
    ) -> Self {
        self.state = state;
        self.resume_point = resume_point;
        self.failure = failure;
        self.finished_at = Utc::now();
        self
    }

    /// Returns true if the run completed.
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
