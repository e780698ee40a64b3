//! Connector invocation.
//!
//! The invoker is the only place a [`CapabilityContext`] is created. Each
//! call gets a fresh context scoped to one tenant and one connector, and the
//! connector future runs under a deadline.

use crate::connector::{ConnectionStatus, Connector, ExecuteResult};
use crate::context::{CapabilityContext, Params};
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{HostPolicy, HttpClient, ScopedHttp};
use crate::secrets::{ScopedSecrets, SecretStore, TenantScope};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Operation name reported for connection probes.
pub const TEST_CONNECTION_OPERATION: &str = "test_connection";

/// Default deadline for one connector call.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds capability contexts and runs connectors under them.
pub struct ConnectorInvoker {
    http: Arc<dyn HttpClient>,
    secrets: Arc<dyn SecretStore>,
    connector_hosts: HashMap<String, Arc<HostPolicy>>,
    tenant_hosts: HashMap<TenantScope, Arc<HostPolicy>>,
    timeout: Duration,
}

impl ConnectorInvoker {
    /// Creates an invoker. No outbound host is allowed until configured.
    pub fn new(http: Arc<dyn HttpClient>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            http,
            secrets,
            connector_hosts: HashMap::new(),
            tenant_hosts: HashMap::new(),
            timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    /// Sets the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allows `connector` to reach the hosts in `policy`, for every tenant.
    pub fn with_connector_hosts(mut self, connector: impl Into<String>, policy: HostPolicy) -> Self {
        self.connector_hosts.insert(connector.into(), Arc::new(policy));
        self
    }

    /// Overrides the host policy for one tenant's use of a connector.
    ///
    /// Needed when the upstream host depends on the tenant, such as a
    /// per-shop subdomain.
    pub fn with_tenant_hosts(mut self, scope: TenantScope, policy: HostPolicy) -> Self {
        self.tenant_hosts.insert(scope, Arc::new(policy));
        self
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn policy_for(&self, scope: &TenantScope) -> Arc<HostPolicy> {
        self.tenant_hosts
            .get(scope)
            .or_else(|| self.connector_hosts.get(&scope.connector))
            .cloned()
            .unwrap_or_else(|| Arc::new(HostPolicy::deny_all()))
    }

    fn context(&self, scope: TenantScope, operation: &str, params: Params) -> CapabilityContext {
        let http = ScopedHttp::new(self.http.clone(), self.policy_for(&scope));
        let secrets = ScopedSecrets::new(self.secrets.clone(), scope);
        CapabilityContext::new(operation, params, http, secrets)
    }

    /// Runs `operation` on `connector` for `tenant`.
    ///
    /// Undeclared operations are rejected before the connector is called.
    pub async fn execute(
        &self,
        connector: &dyn Connector,
        tenant: &str,
        operation: &str,
        params: Params,
    ) -> ConnectorResult<ExecuteResult> {
        self.execute_within(connector, tenant, operation, params, self.timeout)
            .await
    }

    /// Like [`execute`](Self::execute), with an explicit deadline.
    pub async fn execute_within(
        &self,
        connector: &dyn Connector,
        tenant: &str,
        operation: &str,
        params: Params,
        timeout: Duration,
    ) -> ConnectorResult<ExecuteResult> {
        if !connector.supports(operation) {
            return Err(ConnectorError::UnknownOperation {
                connector: connector.name().to_string(),
                operation: operation.to_string(),
            });
        }

        let ctx = self.context(TenantScope::new(tenant, connector.name()), operation, params);
        tracing::debug!(tenant, connector = connector.name(), operation, "invoking connector");

        let result = with_deadline(timeout, connector.execute(&ctx)).await;
        if let Err(err) = &result {
            tracing::debug!(tenant, connector = connector.name(), operation, error = %err, "connector call failed");
        }
        result
    }

    /// Probes `connector` with `tenant`'s credentials.
    pub async fn test_connection(
        &self,
        connector: &dyn Connector,
        tenant: &str,
    ) -> ConnectorResult<ConnectionStatus> {
        let ctx = self.context(
            TenantScope::new(tenant, connector.name()),
            TEST_CONNECTION_OPERATION,
            Params::new(),
        );
        tracing::debug!(tenant, connector = connector.name(), "testing connection");
        with_deadline(self.timeout, connector.test_connection(&ctx)).await
    }
}

async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = ConnectorResult<T>>,
) -> ConnectorResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::Timeout(timeout)),
    }
}

impl std::fmt::Debug for ConnectorInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorInvoker")
            .field("connector_hosts", &self.connector_hosts)
            .field("tenant_hosts", &self.tenant_hosts)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Pagination;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::secrets::MemorySecretStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
            self.urls.lock().push(request.url);
            Ok(HttpResponse::json_body(200, &json!([{ "id": 1 }])))
        }
    }

    /// Fetches from whatever URL the `url` param names, with the tenant's token.
    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Connector for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn operations(&self) -> &[&str] {
            &["fetch"]
        }

        async fn test_connection(&self, ctx: &CapabilityContext) -> ConnectorResult<ConnectionStatus> {
            let token = ctx.secrets().require("access_token")?;
            Ok(ConnectionStatus::connected(json!({ "token_len": token.len() })))
        }

        async fn execute(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let url = ctx
                .require_param("url")?
                .as_str()
                .unwrap_or_default()
                .to_string();
            let response = ctx.http().get(&url, Vec::<(String, String)>::new()).await?;
            let data: Vec<serde_json::Value> = response.json()?;
            Ok(ExecuteResult::page(ctx.operation(), data, Pagination::last()))
        }
    }

    fn invoker(client: Arc<RecordingClient>) -> ConnectorInvoker {
        let secrets = Arc::new(MemorySecretStore::new());
        secrets.insert(TenantScope::new("acme", "probe"), "access_token", "secret");
        ConnectorInvoker::new(client, secrets)
            .with_connector_hosts("probe", HostPolicy::allow(["api.example.com"]))
            .with_tenant_hosts(
                TenantScope::new("globex", "probe"),
                HostPolicy::allow(["globex.example.com"]),
            )
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_before_invocation() {
        let connector = Probe::default();
        let invoker = invoker(Arc::default());

        let err = invoker
            .execute(&connector, "acme", "delete", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownOperation { .. }));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tenant_policy_overrides_connector_policy() {
        let client = Arc::new(RecordingClient::default());
        let invoker = invoker(client.clone());
        let connector = Probe::default();

        let params = Params::new().with("url", "https://api.example.com/items");
        assert!(invoker.execute(&connector, "acme", "fetch", params.clone()).await.is_ok());

        let err = invoker
            .execute(&connector, "globex", "fetch", params)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CapabilityDenied(_)));

        let params = Params::new().with("url", "https://globex.example.com/items");
        let result = invoker.execute(&connector, "globex", "fetch", params).await.unwrap();
        assert_eq!(result.count, 1);

        assert_eq!(
            *client.urls.lock(),
            vec![
                "https://api.example.com/items".to_string(),
                "https://globex.example.com/items".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn unconfigured_connector_reaches_nothing() {
        let invoker = ConnectorInvoker::new(
            Arc::new(RecordingClient::default()),
            Arc::new(MemorySecretStore::new()),
        );
        let params = Params::new().with("url", "https://api.example.com/items");
        let err = invoker
            .execute(&Probe::default(), "acme", "fetch", params)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CapabilityDenied(_)));
    }

    #[tokio::test]
    async fn missing_param_is_configuration_error() {
        let invoker = invoker(Arc::default());
        let err = invoker
            .execute(&Probe::default(), "acme", "fetch", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_connection_uses_tenant_secrets() {
        let invoker = invoker(Arc::default());
        let status = invoker.test_connection(&Probe::default(), "acme").await.unwrap();
        assert_eq!(status.details["token_len"], 6);

        let err = invoker
            .test_connection(&Probe::default(), "globex")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn slow_connector_times_out() {
        let invoker = invoker(Arc::default()).with_timeout(Duration::from_millis(20));
        let connector = Probe {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_secs(5)),
        };
        let params = Params::new().with("url", "https://api.example.com/items");

        let err = invoker.execute(&connector, "acme", "fetch", params).await.unwrap_err();
        assert_eq!(err, ConnectorError::Timeout(Duration::from_millis(20)));
        assert!(err.is_retryable());
    }
}
