//! A generic REST connector.
//!
//! Lists `GET {base}/{resource}` and fetches `GET {base}/{resource}/{id}`
//! with a bearer token read from the `access_token` secret. Pagination
//! follows the `Link` header.

use crate::connector::{ConnectionStatus, Connector, ExecuteResult, Pagination};
use crate::context::{CapabilityContext, Params, PAGE_INFO_PARAM, RESOURCE_ID_PARAM, RESOURCE_PARAM};
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::HttpResponse;
use async_trait::async_trait;
use conduit_filter::IndexedFields;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Secret holding the upstream credential.
pub const ACCESS_TOKEN_SECRET: &str = "access_token";

/// Configuration for a [`RestConnector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestConfig {
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Path probed by `test_connection`, relative to the base URL.
    pub test_path: String,
    /// Resource used when the invocation names none.
    pub default_resource: Option<String>,
    /// Key under which list responses wrap their records, e.g. `orders`.
    pub records_key: Option<String>,
    /// Header carrying the token. `authorization` sends `Bearer <token>`.
    pub token_header: String,
    /// Fields the upstream accepts as equality query filters.
    pub filterable_fields: Vec<String>,
}

impl RestConfig {
    /// Creates a configuration for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            test_path: String::new(),
            default_resource: None,
            records_key: None,
            token_header: "authorization".into(),
            filterable_fields: Vec::new(),
        }
    }

    /// Sets the connection probe path.
    pub fn with_test_path(mut self, path: impl Into<String>) -> Self {
        self.test_path = path.into();
        self
    }

    /// Sets the default resource.
    pub fn with_default_resource(mut self, resource: impl Into<String>) -> Self {
        self.default_resource = Some(resource.into());
        self
    }

    /// Sets the wrapping key of list responses.
    pub fn with_records_key(mut self, key: impl Into<String>) -> Self {
        self.records_key = Some(key.into());
        self
    }

    /// Sends the raw token under `header` instead of a bearer authorization.
    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into().to_ascii_lowercase();
        self
    }

    /// Declares upstream-filterable fields.
    pub fn with_filterable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A connector for JSON REST APIs.
#[derive(Debug, Clone)]
pub struct RestConnector {
    name: String,
    config: RestConfig,
}

impl RestConnector {
    /// Operations supported by every REST connector.
    pub const OPERATIONS: &'static [&'static str] = &["list", "get"];

    /// Creates a connector.
    pub fn new(name: impl Into<String>, config: RestConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Connector configuration.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn auth_header(&self, ctx: &CapabilityContext) -> ConnectorResult<(String, String)> {
        let token = ctx.secrets().require(ACCESS_TOKEN_SECRET)?;
        let value = if self.config.token_header == "authorization" {
            format!("Bearer {}", token)
        } else {
            token
        };
        Ok((self.config.token_header.clone(), value))
    }

    fn resource<'a>(&'a self, params: &'a Params) -> ConnectorResult<&'a str> {
        params
            .get_str(RESOURCE_PARAM)
            .or(self.config.default_resource.as_deref())
            .ok_or_else(|| {
                ConnectorError::invalid_configuration(format!(
                    "connector '{}' requires parameter '{}'",
                    self.name, RESOURCE_PARAM
                ))
            })
    }

    fn url(&self, path: &str, query: Vec<(String, String)>) -> ConnectorResult<String> {
        let raw = format!("{}/{}", self.config.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| {
            ConnectorError::invalid_configuration(format!("invalid URL {}: {}", raw, e))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    // A page token carries the original filters, so it is sent alone.
    fn list_url(&self, resource: &str, params: &Params) -> ConnectorResult<String> {
        if let Some(token) = params.page_info() {
            if token.starts_with("https://") || token.starts_with("http://") {
                return Ok(token.to_string());
            }
            let mut query = vec![(PAGE_INFO_PARAM.to_string(), token.to_string())];
            if let Some(limit) = params.limit() {
                query.push(("limit".to_string(), limit.to_string()));
            }
            return self.url(resource, query);
        }

        let query = params
            .to_query_pairs()
            .into_iter()
            .filter(|(k, _)| k != RESOURCE_PARAM && k != RESOURCE_ID_PARAM)
            .collect();
        self.url(resource, query)
    }

    fn records(&self, body: Value) -> Vec<Value> {
        let body = match (&self.config.records_key, body) {
            (Some(key), Value::Object(mut map)) => map.remove(key).unwrap_or(Value::Null),
            (_, body) => body,
        };
        match body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    async fn list(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
        let resource = self.resource(ctx.params())?;
        let auth = self.auth_header(ctx)?;
        let url = self.list_url(resource, ctx.params())?;

        let response = ctx.http().get(&url, [auth]).await?;
        ConnectorError::check_response(&response)?;

        let pagination = Pagination::from_link_header(response.header("link"));
        let data = self.records(response.json()?);
        Ok(ExecuteResult::page(ctx.operation(), data, pagination))
    }

    async fn get(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
        let resource = self.resource(ctx.params())?;
        let id = match ctx.require_param(RESOURCE_ID_PARAM)? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let auth = self.auth_header(ctx)?;
        let url = self.url(&format!("{}/{}", resource, id), Vec::new())?;

        let response = ctx.http().get(&url, [auth]).await?;
        ConnectorError::check_response(&response)?;

        let body: Value = response.json()?;
        let record = match (&self.config.records_key, body) {
            (Some(_), Value::Object(map)) if map.len() == 1 => {
                map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
            }
            (_, body) => body,
        };
        Ok(ExecuteResult::page(ctx.operation(), vec![record], Pagination::last()))
    }
}

fn probe_details(response: &HttpResponse) -> Value {
    let body = response.json::<Value>().unwrap_or(Value::Null);
    serde_json::json!({ "http_status": response.status(), "body": body })
}

#[async_trait]
impl Connector for RestConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn operations(&self) -> &[&str] {
        Self::OPERATIONS
    }

    fn filterable_fields(&self) -> IndexedFields {
        IndexedFields::equality(self.config.filterable_fields.iter().cloned())
    }

    async fn test_connection(&self, ctx: &CapabilityContext) -> ConnectorResult<ConnectionStatus> {
        let auth = self.auth_header(ctx)?;
        let url = self.url(&self.config.test_path, Vec::new())?;
        let response = ctx.http().get(&url, [auth]).await?;
        ConnectorError::check_response(&response)?;
        Ok(ConnectionStatus::connected(probe_details(&response)))
    }

    async fn execute(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult> {
        match ctx.operation() {
            "list" => self.list(ctx).await,
            "get" => self.get(ctx).await,
            other => Err(ConnectorError::UnknownOperation {
                connector: self.name.clone(),
                operation: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HostPolicy, HttpClient, HttpRequest};
    use crate::invoker::ConnectorInvoker;
    use crate::secrets::{MemorySecretStore, TenantScope};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn push(&self, response: HttpResponse) {
            self.responses.lock().push_back(response);
        }
    }

    #[async_trait]
    impl HttpClient for Scripted {
        async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| ConnectorError::Transport("no scripted response".into()))
        }
    }

    fn setup(token: Option<&str>) -> (Arc<Scripted>, ConnectorInvoker, RestConnector) {
        let client = Arc::new(Scripted::default());
        let secrets = Arc::new(MemorySecretStore::new());
        if let Some(token) = token {
            secrets.insert(TenantScope::new("acme", "shop"), ACCESS_TOKEN_SECRET, token);
        }
        let invoker = ConnectorInvoker::new(client.clone(), secrets)
            .with_connector_hosts("shop", HostPolicy::allow(["api.shop.test"]));
        let connector = RestConnector::new(
            "shop",
            RestConfig::new("https://api.shop.test/admin/")
                .with_test_path("shop.json")
                .with_records_key("orders")
                .with_filterable_fields(["status"]),
        );
        (client, invoker, connector)
    }

    #[tokio::test]
    async fn list_sends_filters_and_reads_link_header() {
        let (client, invoker, connector) = setup(Some("tok"));
        client.push(
            HttpResponse::json_body(200, &json!({ "orders": [{ "id": 1 }, { "id": 2 }] }))
                .with_header("Link", "<https://api.shop.test/admin/orders?page_info=p2>; rel=\"next\""),
        );

        let params = Params::new()
            .with("resource", "orders")
            .with("status", "open")
            .with("updated_at_min", "2024-01-01T00:00:00.000Z");
        let result = invoker.execute(&connector, "acme", "list", params).await.unwrap();

        assert_eq!(result.count, 2);
        assert_eq!(result.pagination, Pagination::next("p2"));

        let requests = client.requests.lock();
        let url = Url::parse(&requests[0].url).unwrap();
        assert_eq!(url.path(), "/admin/orders");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("status".into(), "open".into())));
        assert!(!query.iter().any(|(k, _)| k == "resource"));
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer tok")
        );
    }

    #[tokio::test]
    async fn page_token_is_sent_alone() {
        let (client, invoker, connector) = setup(Some("tok"));
        client.push(HttpResponse::json_body(200, &json!({ "orders": [] })));

        let params = Params::new()
            .with("resource", "orders")
            .with("status", "open")
            .with("page_info", "p2")
            .with("limit", 50);
        invoker.execute(&connector, "acme", "list", params).await.unwrap();

        let url = Url::parse(&client.requests.lock()[0].url).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![("page_info".into(), "p2".into()), ("limit".into(), "50".into())]
        );
    }

    #[tokio::test]
    async fn get_unwraps_single_record() {
        let (client, invoker, connector) = setup(Some("tok"));
        client.push(HttpResponse::json_body(200, &json!({ "order": { "id": 7 } })));

        let params = Params::new().with("resource", "orders").with("id", 7);
        let result = invoker.execute(&connector, "acme", "get", params).await.unwrap();
        assert_eq!(result.data, vec![json!({ "id": 7 })]);
        assert!(client.requests.lock()[0].url.ends_with("/admin/orders/7"));
    }

    #[tokio::test]
    async fn missing_token_fails_before_network() {
        let (client, invoker, connector) = setup(None);
        let params = Params::new().with("resource", "orders");
        let err = invoker.execute(&connector, "acme", "list", params).await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
        assert!(client.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn probe_maps_unauthorized() {
        let (client, invoker, connector) = setup(Some("expired"));
        client.push(HttpResponse::new(401, [("content-type", "text/plain")], b"nope".to_vec()));

        let err = invoker.test_connection(&connector, "acme").await.unwrap_err();
        assert!(matches!(err, ConnectorError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("access token"));
    }

    #[tokio::test]
    async fn probe_reports_details() {
        let (client, invoker, connector) = setup(Some("tok"));
        client.push(HttpResponse::json_body(200, &json!({ "shop": { "name": "Acme" } })));

        let status = invoker.test_connection(&connector, "acme").await.unwrap();
        assert_eq!(status.details["http_status"], 200);
        assert_eq!(status.details["body"]["shop"]["name"], "Acme");
    }

    #[test]
    fn filterable_fields_are_equality_indexes() {
        let (_, _, connector) = setup(None);
        let fields = connector.filterable_fields();
        assert_eq!(
            conduit_filter::IndexCatalog::index_for(&fields, "status"),
            Some(conduit_filter::IndexKind::Hash)
        );
    }
}
