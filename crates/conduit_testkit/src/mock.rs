//! Scripted connectors and HTTP clients.
//!
//! Both replay a queue of canned results and record what they were asked,
//! so tests can assert on call counts and on the exact parameters sent.

use async_trait::async_trait;
use conduit_connector::{
    CapabilityContext, ConnectionStatus, Connector, ConnectorError, ConnectorResult, ExecuteResult,
    HttpClient, HttpRequest, HttpResponse, Pagination, Params,
};
use conduit_filter::IndexedFields;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A connector that replays scripted results.
///
/// Each `execute` call pops the next scripted result. Once the script runs
/// out, every call returns an empty last page.
pub struct ScriptedConnector {
    name: String,
    operations: Vec<&'static str>,
    filterable: Vec<String>,
    script: Mutex<VecDeque<ConnectorResult<ExecuteResult>>>,
    connection: Mutex<Option<ConnectorResult<ConnectionStatus>>>,
    calls: Mutex<Vec<(String, Params)>>,
    connection_tests: AtomicUsize,
}

impl ScriptedConnector {
    /// Creates a connector supporting `list` and `get`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: vec!["list", "get"],
            filterable: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            connection: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            connection_tests: AtomicUsize::new(0),
        }
    }

    /// Replaces the declared operations.
    pub fn with_operations(mut self, operations: &[&'static str]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    /// Declares equality-filterable fields.
    pub fn with_filterable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `test_connection` result. Connected by default.
    pub fn with_connection_result(self, result: ConnectorResult<ConnectionStatus>) -> Self {
        *self.connection.lock() = Some(result);
        self
    }

    /// Queues a page.
    pub fn push_page(&self, data: Vec<Value>, pagination: Pagination) -> &Self {
        self.push_result(Ok(ExecuteResult::page("list", data, pagination)))
    }

    /// Queues an error.
    pub fn push_error(&self, error: ConnectorError) -> &Self {
        self.push_result(Err(error))
    }

    /// Queues the same error `times` times.
    pub fn push_errors(&self, error: ConnectorError, times: usize) -> &Self {
        for _ in 0..times {
            self.push_error(error.clone());
        }
        self
    }

    /// Queues an arbitrary result.
    pub fn push_result(&self, result: ConnectorResult<ExecuteResult>) -> &Self {
        self.script.lock().push_back(result);
        self
    }

    /// Queues scripted pages in order.
    pub fn push_pages(&self, pages: impl IntoIterator<Item = ExecuteResult>) -> &Self {
        for page in pages {
            self.push_result(Ok(page));
        }
        self
    }

    /// Number of scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Parameters of every `execute` call, in order.
    pub fn calls(&self) -> Vec<Params> {
        self.calls.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    /// Operations of every `execute` call, in order.
    pub fn operations_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(op, _)| op.clone()).collect()
    }

    /// Number of `execute` calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of `test_connection` calls.
    pub fn connection_tests(&self) -> usize {
        self.connection_tests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn operations(&self) -> &[&str] {
        &self.operations
    }

    fn filterable_fields(&self) -> IndexedFields {
        IndexedFields::equality(self.filterable.iter().cloned())
    }

    async fn test_connection(&self, _ctx: &CapabilityContext) -> ConnectorResult<ConnectionStatus> {
        self.connection_tests.fetch_add(1, Ordering::SeqCst);
        match self.connection.lock().clone() {
            Some(result) => result,
            None => Ok(ConnectionStatus::connected(json!({ "connector": self.name }))),
        }
    }

    async fn execute(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
        self.calls
            .lock()
            .push((ctx.operation().to_string(), ctx.params().clone()));
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(mut page)) => {
                page.operation = ctx.operation().to_string();
                Ok(page)
            }
            Some(Err(e)) => Err(e),
            None => Ok(ExecuteResult::empty(ctx.operation())),
        }
    }
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("name", &self.name)
            .field("operations", &self.operations)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// An HTTP client that replays scripted responses.
///
/// Runs out into a transport error, so an unexpected request fails loudly.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<ConnectorResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push_response(HttpResponse::json_body(status, &body))
    }

    /// Queues a transport-level failure.
    pub fn push_error(&self, error: ConnectorError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// Every request sent, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// URLs of every request sent, in order.
    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of requests sent.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::Transport("no scripted response".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_connector::{ConnectorInvoker, HostPolicy, MemorySecretStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn scripted_connector_replays_then_runs_dry() {
        let connector = ScriptedConnector::new("shop");
        connector
            .push_page(vec![json!({ "id": 1 })], Pagination::next("p2"))
            .push_error(ConnectorError::from_status(503, "busy"));

        let invoker = ConnectorInvoker::new(
            Arc::new(MockHttpClient::new()),
            Arc::new(MemorySecretStore::new()),
        )
        .with_connector_hosts("shop", HostPolicy::deny_all());

        let params = Params::new().with("resource", "orders");
        let first = invoker
            .execute(&connector, "acme", "list", params.clone())
            .await
            .unwrap();
        assert_eq!(first.data.len(), 1);
        assert!(first.pagination.has_next_page);

        let err = invoker
            .execute(&connector, "acme", "list", params.clone())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let dry = invoker.execute(&connector, "acme", "list", params).await.unwrap();
        assert!(dry.data.is_empty());
        assert_eq!(connector.call_count(), 3);
        assert_eq!(connector.calls()[0].get_str("resource"), Some("orders"));
    }

    #[tokio::test]
    async fn mock_http_records_requests() {
        let client = MockHttpClient::new();
        client.push_json(200, json!({ "ok": true }));

        let request = HttpRequest {
            method: conduit_connector::HttpMethod::Get,
            url: "https://api.example.com/ping".into(),
            headers: Default::default(),
            body: None,
        };
        let response = client.send(request.clone()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(client.send(request).await.is_err());
        assert_eq!(client.urls(), vec!["https://api.example.com/ping"; 2]);
    }
}
