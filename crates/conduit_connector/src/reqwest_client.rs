//! [`HttpClient`] backed by `reqwest`.

use crate::error::{ConnectorError, ConnectorResult};
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use async_trait::async_trait;

/// Production HTTP client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client.
    ///
    /// Redirects are not followed: a redirect target has not been checked
    /// against the host policy.
    pub fn new() -> ConnectorResult<Self> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Wraps an existing client. The caller is responsible for its redirect policy.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.inner.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpResponse::new(status, headers, body))
    }
}
