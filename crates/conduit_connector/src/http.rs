//! Scoped HTTP capability.
//!
//! Connectors never hold an HTTP client directly. They receive a
//! [`ScopedHttp`] whose requests are checked against a [`HostPolicy`] before
//! they reach the underlying [`HttpClient`]. The client itself is abstracted
//! so that tests and embedders can plug in any transport.

use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// HTTP methods available to connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

/// A response as seen by connector code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response. Header names are normalized to lowercase.
    pub fn new<I, K, V>(status: u16, headers: I, body: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
            body,
        }
    }

    /// Creates a response with a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(
            status,
            [("content-type", "application/json")],
            body.to_string().into_bytes(),
        )
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Looks up a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, with lowercase names.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ConnectorResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ConnectorError::InvalidResponse(format!("invalid JSON body: {}", e)))
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Implementations
/// report connection-level failures as [`ConnectorError::Transport`] and
/// return every received response, whatever its status.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse>;
}

/// The set of outbound hosts a connector invocation may contact.
///
/// An empty policy denies everything. Entries of the form `*.example.com`
/// match any subdomain of `example.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPolicy {
    hosts: HashSet<String>,
    allow_plain_http: bool,
}

impl HostPolicy {
    /// A policy that denies every request.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// A policy allowing the given hosts over HTTPS.
    pub fn allow<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
            allow_plain_http: false,
        }
    }

    /// Also allows plain `http://` URLs for the listed hosts.
    #[must_use]
    pub fn with_plain_http(mut self) -> Self {
        self.allow_plain_http = true;
        self
    }

    /// Returns true if no host is allowed.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Checks a URL against the policy.
    pub fn check(&self, url: &str) -> ConnectorResult<Url> {
        let parsed = Url::parse(url)
            .map_err(|e| ConnectorError::CapabilityDenied(format!("invalid URL {}: {}", url, e)))?;

        match parsed.scheme() {
            "https" => {}
            "http" if self.allow_plain_http => {}
            scheme => {
                return Err(ConnectorError::CapabilityDenied(format!(
                    "scheme {} not allowed",
                    scheme
                )))
            }
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConnectorError::CapabilityDenied(format!("no host in URL {}", url)))?
            .to_ascii_lowercase();

        if self.matches_host(&host) {
            Ok(parsed)
        } else {
            Err(ConnectorError::CapabilityDenied(format!(
                "host {} not allowed",
                host
            )))
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|allowed| match allowed.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1),
            None => allowed == host,
        })
    }
}

/// The HTTP capability handed to connectors.
#[derive(Clone)]
pub struct ScopedHttp {
    client: Arc<dyn HttpClient>,
    policy: Arc<HostPolicy>,
}

impl ScopedHttp {
    /// Creates a scoped client.
    pub fn new(client: Arc<dyn HttpClient>, policy: Arc<HostPolicy>) -> Self {
        Self { client, policy }
    }

    /// Sends a GET request.
    pub async fn get<I, K, V>(&self, url: &str, headers: I) -> ConnectorResult<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: collect_headers(headers),
            body: None,
        };
        self.send(request).await
    }

    /// Sends a POST request with a raw body.
    pub async fn post<I, K, V>(
        &self,
        url: &str,
        headers: I,
        body: Vec<u8>,
    ) -> ConnectorResult<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            headers: collect_headers(headers),
            body: Some(body),
        };
        self.send(request).await
    }

    /// Sends a POST request with a JSON body.
    pub async fn post_json<I, K, V, T>(
        &self,
        url: &str,
        headers: I,
        body: &T,
    ) -> ConnectorResult<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ConnectorError::invalid_configuration(format!("unencodable body: {}", e)))?;
        let mut headers = collect_headers(headers);
        headers
            .entry("content-type".into())
            .or_insert_with(|| "application/json".into());
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            headers,
            body: Some(bytes),
        };
        self.send(request).await
    }

    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        if let Err(err) = self.policy.check(&request.url) {
            tracing::warn!(method = %request.method, url = %request.url, "blocked outbound request");
            return Err(err);
        }
        tracing::debug!(method = %request.method, url = %request.url, "outbound request");
        self.client.send(request).await
    }
}

impl fmt::Debug for ScopedHttp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHttp")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn collect_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
        .collect()
}
