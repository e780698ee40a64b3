//! Error types surfaced by connector invocation.

use crate::http::HttpResponse;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors a connector invocation can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Upstream rejected the credentials (HTTP 401).
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Credentials are valid but lack permission (HTTP 403).
    #[error("authorization denied: {message}")]
    AuthorizationDenied {
        /// Error message.
        message: String,
    },

    /// The requested resource does not exist (HTTP 404).
    #[error("resource not found: {message}")]
    ResourceNotFound {
        /// Error message.
        message: String,
    },

    /// Any other non-2xx response.
    #[error("upstream error: HTTP {status}")]
    UpstreamError {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited by upstream")]
    RateLimited {
        /// Delay requested through `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// A required credential or parameter is missing. Raised before any network call.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The operation is not declared by the connector.
    #[error("connector '{connector}' does not support operation '{operation}'")]
    UnknownOperation {
        /// Connector name.
        connector: String,
        /// Requested operation.
        operation: String,
    },

    /// The connector tried to reach something its context does not grant.
    #[error("capability denied: {0}")]
    CapabilityDenied(String),

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The invocation exceeded its deadline.
    #[error("connector invocation timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification of connector errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credential, parameter or unknown operation.
    Configuration,
    /// HTTP 401.
    AuthenticationFailed,
    /// HTTP 403.
    AuthorizationDenied,
    /// HTTP 404.
    NotFound,
    /// Other upstream failures, including rate limiting and bad payloads.
    Upstream,
    /// Deadline exceeded.
    Timeout,
    /// Capability violation.
    CapabilityDenied,
}

impl ConnectorError {
    /// Maps a non-2xx HTTP status to an error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::AuthenticationFailed {
                message: "upstream rejected the access token (HTTP 401)".into(),
            },
            403 => Self::AuthorizationDenied {
                message: "access token lacks the required scope (HTTP 403)".into(),
            },
            404 => Self::ResourceNotFound {
                message: if body.is_empty() {
                    "HTTP 404".into()
                } else {
                    body
                },
            },
            429 => Self::RateLimited { retry_after: None },
            _ => Self::UpstreamError { status, body },
        }
    }

    /// Returns `Ok(())` for 2xx responses, the mapped error otherwise.
    pub fn check_response(response: &HttpResponse) -> ConnectorResult<()> {
        if response.is_success() {
            return Ok(());
        }

        if response.status() == 429 {
            let retry_after = response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            return Err(Self::RateLimited { retry_after });
        }

        Err(Self::from_status(response.status(), response.text()))
    }

    /// Creates an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Returns the coarse error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            ConnectorError::AuthorizationDenied { .. } => ErrorKind::AuthorizationDenied,
            ConnectorError::ResourceNotFound { .. } => ErrorKind::NotFound,
            ConnectorError::UpstreamError { .. }
            | ConnectorError::RateLimited { .. }
            | ConnectorError::Transport(_)
            | ConnectorError::InvalidResponse(_) => ErrorKind::Upstream,
            ConnectorError::InvalidConfiguration(_) | ConnectorError::UnknownOperation { .. } => {
                ErrorKind::Configuration
            }
            ConnectorError::CapabilityDenied(_) => ErrorKind::CapabilityDenied,
            ConnectorError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Returns true if the invocation may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::UpstreamError { .. }
                | ConnectorError::RateLimited { .. }
                | ConnectorError::Transport(_)
                | ConnectorError::Timeout(_)
        )
    }

    /// Delay requested by the upstream, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ConnectorError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// A short hint for the tenant on how to fix the problem.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::AuthenticationFailed => Some("verify access token"),
            ErrorKind::AuthorizationDenied => Some("verify the access token's scopes"),
            ErrorKind::Configuration => Some("check the connector configuration and credentials"),
            ErrorKind::CapabilityDenied => Some("authorize the upstream host for this connector"),
            ErrorKind::NotFound | ErrorKind::Upstream | ErrorKind::Timeout => None,
        }
    }
}
