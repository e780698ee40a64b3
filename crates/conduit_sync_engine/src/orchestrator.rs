//! Sync run orchestration.
//!
//! One run, for one (tenant, connector, resource):
//! 1. Take the run gate and load the processing record
//! 2. Build fetch parameters from the stored resume point
//! 3. Fetch pages through the invoker, retrying transient errors
//! 4. Post-filter each page and hand it to the sink
//! 5. Advance and persist the resume point after every page
//!
//! A failed or cancelled run keeps the checkpoint of its last completed page.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::filter::FilterPlan;
use crate::report::SyncRunReport;
use crate::sink::RecordSink;
use conduit_checkpoint::{
    build_fetch_params, extract_next_resume_point, CursorConfig, CursorStrategy, ProcessingRecord,
    ProcessingRecordStore, RecordKey, RunState, StoreError,
};
use conduit_connector::{
    ConnectionStatus, Connector, ConnectorError, ConnectorInvoker, ConnectorRegistry,
    ExecuteResult, Params, LIMIT_PARAM, RESOURCE_PARAM,
};
use conduit_filter::Expr;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Operation used when a request names none.
pub const DEFAULT_OPERATION: &str = "list";

/// Shared cancellation flag, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A request to sync one resource.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Tenant identifier.
    pub tenant: String,
    /// Registered connector name.
    pub connector: String,
    /// Upstream resource.
    pub resource: String,
    /// Connector operation to page through.
    pub operation: String,
    /// Caller-supplied parameters.
    pub params: Params,
    /// Cursor settings. `None` fetches everything every run.
    pub cursor: Option<CursorConfig>,
    /// Optional record filter.
    pub filter: Option<Expr>,
    /// Per-run cancellation.
    pub cancel: CancelToken,
}

impl SyncRequest {
    /// Creates a request for the default operation.
    pub fn new(
        tenant: impl Into<String>,
        connector: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            connector: connector.into(),
            resource: resource.into(),
            operation: DEFAULT_OPERATION.to_string(),
            params: Params::new(),
            cursor: None,
            filter: None,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the operation.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the cursor configuration.
    pub fn with_cursor(mut self, cursor: CursorConfig) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Sets the filter.
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Uses `token` for cancellation.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The processing record key for this request.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.tenant, &self.connector, &self.resource)
    }
}

/// Releases a run gate when dropped.
struct RunGate<'a> {
    store: &'a dyn ProcessingRecordStore,
    key: RecordKey,
}

impl Drop for RunGate<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_run(&self.key) {
            tracing::error!(key = %self.key, error = %e, "failed to release run gate");
        }
    }
}

/// Per-run decisions derived from the request.
struct RunPlan<'a> {
    key: &'a RecordKey,
    strategy: CursorStrategy,
    cursor: Option<&'a CursorConfig>,
    filter: Option<FilterPlan>,
}

/// Drives sync runs.
pub struct SyncOrchestrator {
    registry: ConnectorRegistry,
    invoker: Arc<ConnectorInvoker>,
    store: Arc<dyn ProcessingRecordStore>,
    sink: Arc<dyn RecordSink>,
    config: SyncConfig,
    cancelled: CancelToken,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with the default configuration.
    pub fn new(
        registry: ConnectorRegistry,
        invoker: Arc<ConnectorInvoker>,
        store: Arc<dyn ProcessingRecordStore>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            registry,
            invoker,
            store,
            sink,
            config: SyncConfig::default(),
            cancelled: CancelToken::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The connector registry.
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Loads the processing record for `key`.
    pub fn processing_record(&self, key: &RecordKey) -> SyncResult<Option<ProcessingRecord>> {
        Ok(self.store.get(key)?)
    }

    /// Cancels every run in progress, at its next page boundary.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Clears a previous [`cancel`](Self::cancel).
    pub fn reset_cancel(&self) {
        self.cancelled.reset();
    }

    fn is_cancelled(&self, request: &SyncRequest) -> bool {
        self.cancelled.is_cancelled() || request.cancel.is_cancelled()
    }

    fn connector(&self, name: &str) -> SyncResult<Arc<dyn Connector>> {
        self.registry
            .get(name)
            .ok_or_else(|| SyncError::UnknownConnector(name.to_string()))
    }

    /// Probes a connector with a tenant's credentials.
    ///
    /// Never retried and never touches processing records.
    pub async fn test_connection(&self, tenant: &str, connector: &str) -> SyncResult<ConnectionStatus> {
        let connector = self.connector(connector)?;
        match self.invoker.test_connection(connector.as_ref(), tenant).await {
            Ok(status) => {
                tracing::info!(tenant, connector = connector.name(), status = ?status.status, "connection test passed");
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(
                    tenant,
                    connector = connector.name(),
                    error = %e,
                    hint = e.remediation_hint().unwrap_or_default(),
                    "connection test failed"
                );
                Err(e.into())
            }
        }
    }

    /// Runs several requests with at most `config.concurrency` in flight.
    ///
    /// Results are returned in request order.
    pub async fn run_all(&self, requests: Vec<SyncRequest>) -> Vec<SyncResult<SyncRunReport>> {
        stream::iter(requests)
            .map(|request| self.run(request))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    /// Runs one sync.
    ///
    /// Returns `Err` only when the run could not start or its final state
    /// could not be persisted. Connector failures and cancellation end the
    /// run normally and are reported through [`SyncRunReport::state`].
    pub async fn run(&self, request: SyncRequest) -> SyncResult<SyncRunReport> {
        let connector = self.connector(&request.connector)?;
        let key = request.key();

        if !self.store.try_acquire_run(&key)? {
            tracing::warn!(%key, "sync run rejected: another run is in progress");
            return Err(SyncError::RunInProgress(key));
        }
        let _gate = RunGate {
            store: self.store.as_ref(),
            key: key.clone(),
        };

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "sync_run",
            tenant = %key.tenant,
            connector = %key.connector,
            resource = %key.resource,
            %run_id
        );
        self.drive(connector, &request, &key, run_id)
            .instrument(span)
            .await
    }

    fn load_record(&self, key: &RecordKey) -> SyncResult<Option<ProcessingRecord>> {
        match self.store.get(key) {
            Ok(record) => Ok(record),
            Err(StoreError::Corrupted(message)) => {
                tracing::warn!(
                    kind = "checkpoint_corrupt",
                    detail = %message,
                    "processing record unreadable; starting from the beginning"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drive(
        &self,
        connector: Arc<dyn Connector>,
        request: &SyncRequest,
        key: &RecordKey,
        run_id: Uuid,
    ) -> SyncResult<SyncRunReport> {
        let mut record = self
            .load_record(key)?
            .unwrap_or_else(|| ProcessingRecord::new(key.clone(), request.cursor.clone()));
        record.begin_run(run_id, request.cursor.clone());
        self.store.put(&record)?;

        let cursor = request.cursor.as_ref();
        let plan = RunPlan {
            key,
            strategy: cursor.map_or(CursorStrategy::FindAll, |c| c.strategy),
            cursor,
            filter: request
                .filter
                .clone()
                .map(|expr| FilterPlan::new(expr, &connector.filterable_fields())),
        };

        let base = self.base_params(request, &record, &plan);
        let mut state = RunState::NotStarted.transition(RunState::Fetching)?;
        let mut report = SyncRunReport::start(run_id, key.clone());
        tracing::info!(strategy = %plan.strategy, resume = ?record.resume_value(), "sync run started");

        let mut page_token: Option<String> = None;
        let outcome: SyncResult<()> = loop {
            if self.is_cancelled(request) {
                break Err(SyncError::Cancelled);
            }
            if let Some(max) = self.config.max_pages_per_run {
                if report.pages >= max {
                    report.has_more = true;
                    tracing::info!(pages = report.pages, "page limit reached; continuing next run");
                    break Ok(());
                }
            }

            let params = page_params(&base, page_token.as_deref(), &plan, &self.config.page_param);
            let page = match self
                .fetch_page(connector.as_ref(), request, params, &mut report)
                .await
            {
                Ok(page) => page,
                Err(e) => break Err(e),
            };
            state = state.transition(RunState::Fetching)?;

            match self
                .checkpoint_page(&plan, &mut record, page, &mut report)
                .await
            {
                Ok(Some(token)) => page_token = Some(token),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let (state, failure) = match outcome {
            Ok(()) => {
                record.mark_success();
                tracing::info!(
                    pages = report.pages,
                    delivered = report.delivered,
                    retries = report.retries,
                    "sync run completed"
                );
                (state.transition(RunState::Completed)?, None)
            }
            Err(SyncError::Cancelled) => {
                record.mark_cancelled();
                tracing::info!(pages = report.pages, "sync run cancelled");
                (state.transition(RunState::Cancelled)?, None)
            }
            Err(e) => {
                let failure = e.failure_info();
                tracing::error!(
                    error = %e,
                    kind = ?failure.kind,
                    hint = failure.remediation.as_deref().unwrap_or_default(),
                    pages = report.pages,
                    "sync run failed"
                );
                record.mark_failure(failure.clone());
                (state.transition(RunState::Failed)?, Some(failure))
            }
        };

        self.store.put(&record)?;
        Ok(report.finish(state, record.resume_value().cloned(), failure))
    }

    fn base_params(&self, request: &SyncRequest, record: &ProcessingRecord, plan: &RunPlan<'_>) -> Params {
        let mut params = request.params.clone();
        if !params.contains(RESOURCE_PARAM) {
            params.insert(RESOURCE_PARAM, request.resource.clone());
        }
        if let Some(size) = self.config.page_size {
            if !params.contains(LIMIT_PARAM) {
                params.insert(LIMIT_PARAM, size);
            }
        }
        if let Some(filter) = &plan.filter {
            params = filter.push_down(params);
        }
        build_fetch_params(&params, record.resume_value(), plan.strategy, plan.cursor)
    }

    async fn fetch_page(
        &self,
        connector: &dyn Connector,
        request: &SyncRequest,
        params: Params,
        report: &mut SyncRunReport,
    ) -> SyncResult<ExecuteResult> {
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = self
                .invoker
                .execute_within(
                    connector,
                    &request.tenant,
                    &request.operation,
                    params.clone(),
                    self.config.timeout,
                )
                .await;

            match result {
                Ok(page) => return Ok(page),
                Err(ConnectorError::ResourceNotFound { .. }) if params.resource_id().is_none() => {
                    tracing::debug!("upstream returned not found for a listing; treating as empty");
                    return Ok(ExecuteResult::empty(request.operation.clone()));
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay_with_hint(attempt, e.retry_after());
                    tracing::warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        delay_ms = saturating_millis(delay),
                        error = %e,
                        "connector call failed; retrying"
                    );
                    report.retries += 1;
                    tokio::time::sleep(delay).await;
                    if self.is_cancelled(request) {
                        return Err(SyncError::Cancelled);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Filters, delivers and checkpoints one page. Returns the next page token.
    async fn checkpoint_page(
        &self,
        plan: &RunPlan<'_>,
        record: &mut ProcessingRecord,
        page: ExecuteResult,
        report: &mut SyncRunReport,
    ) -> SyncResult<Option<String>> {
        let fetched = page.data.len();
        let reported = page.pagination.next_page_info;
        let candidate =
            extract_next_resume_point(&page.data, plan.strategy, plan.cursor, reported.as_deref());
        if candidate.is_null() && plan.strategy.is_ordered() && fetched > 0 {
            tracing::warn!(
                page = report.pages + 1,
                "batch carried no usable resume value; checkpoint not advanced"
            );
        }

        let (kept, dropped) = match &plan.filter {
            Some(filter) => filter.apply(page.data),
            None => (page.data, 0),
        };

        self.sink.deliver(plan.key, &kept).await?;
        record.complete_page(candidate, plan.strategy, kept.len());
        self.store.put(record)?;

        report.pages += 1;
        report.fetched += fetched;
        report.delivered += kept.len();
        report.filtered_out += dropped;
        tracing::debug!(
            page = report.pages,
            fetched,
            delivered = kept.len(),
            resume = ?record.resume_value(),
            "page checkpointed"
        );

        match (page.pagination.has_next_page, reported) {
            (true, Some(token)) => Ok(Some(token)),
            (true, None) => {
                tracing::warn!("connector reported another page without a token; stopping");
                Ok(None)
            }
            (false, _) => Ok(None),
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parameters for a page after the first.
///
/// Cursor-resumed resources carry the token under their own parameter;
/// everything else uses `page_param`.
fn page_params(base: &Params, token: Option<&str>, plan: &RunPlan<'_>, page_param: &str) -> Params {
    let Some(token) = token else {
        return base.clone();
    };
    match (plan.strategy, plan.cursor) {
        (CursorStrategy::FindByCursor, Some(cursor)) => base.clone().with(cursor.action_param(), token),
        _ => base.clone().with(page_param, token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_connector::PAGE_INFO_PARAM;
    use serde_json::json;

    #[test]
    fn request_builder_and_key() {
        let request = SyncRequest::new("acme", "shop", "orders")
            .with_params(Params::new().with("status", "any"))
            .with_cursor(CursorConfig::new("id", CursorStrategy::FindById));
        assert_eq!(request.operation, DEFAULT_OPERATION);
        assert_eq!(request.key(), RecordKey::new("acme", "shop", "orders"));
        assert_eq!(request.params.get("status"), Some(&json!("any")));
    }

    #[test]
    fn logged_delay_saturates() {
        assert_eq!(saturating_millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn later_pages_use_page_info_unless_cursor_resumed() {
        let key = RecordKey::new("a", "b", "c");
        let base = Params::new().with("limit", 10);

        let plan = RunPlan {
            key: &key,
            strategy: CursorStrategy::FindAll,
            cursor: None,
            filter: None,
        };
        assert_eq!(page_params(&base, None, &plan, PAGE_INFO_PARAM), base);
        assert_eq!(
            page_params(&base, Some("p2"), &plan, PAGE_INFO_PARAM).get(PAGE_INFO_PARAM),
            Some(&json!("p2"))
        );
        assert_eq!(
            page_params(&base, Some("p2"), &plan, "page").get("page"),
            Some(&json!("p2"))
        );

        let cursor = CursorConfig::new("cursor", CursorStrategy::FindByCursor).with_action_param("after");
        let plan = RunPlan {
            key: &key,
            strategy: CursorStrategy::FindByCursor,
            cursor: Some(&cursor),
            filter: None,
        };
        let params = page_params(&base, Some("c2"), &plan, PAGE_INFO_PARAM);
        assert_eq!(params.get("after"), Some(&json!("c2")));
        assert!(params.get(PAGE_INFO_PARAM).is_none());
    }
}
