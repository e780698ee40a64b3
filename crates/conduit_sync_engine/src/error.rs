//! Error types for the sync engine.

use conduit_checkpoint::{FailureInfo, FailureKind, InvalidTransition, RecordKey, StoreError};
use conduit_connector::ConnectorError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connector invocation failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The processing record store failed.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// The record sink rejected a page.
    #[error("record sink error: {0}")]
    Sink(String),

    /// Another run holds the resource.
    #[error("a sync run for {0} is already in progress")]
    RunInProgress(RecordKey),

    /// No connector registered under this name.
    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error(transparent)]
    InvalidStateTransition(#[from] InvalidTransition),
}

impl SyncError {
    /// Creates a sink error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }

    /// Returns true if the error is transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Connector(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the failure classification recorded on the processing record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SyncError::Connector(e) => e.kind().into(),
            SyncError::Store(_) | SyncError::Sink(_) => FailureKind::Storage,
            SyncError::UnknownConnector(_) | SyncError::InvalidStateTransition(_) => {
                FailureKind::Configuration
            }
            SyncError::RunInProgress(_) | SyncError::Cancelled => FailureKind::Interrupted,
        }
    }

    /// A short hint for the tenant on how to fix the problem.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            SyncError::Connector(e) => e.remediation_hint(),
            SyncError::UnknownConnector(_) => Some("register the connector before scheduling runs"),
            _ => None,
        }
    }

    /// Failure details for the processing record.
    pub fn failure_info(&self) -> FailureInfo {
        FailureInfo {
            kind: self.failure_kind(),
            message: self.to_string(),
            remediation: self.remediation_hint().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_errors_keep_their_classification() {
        let err = SyncError::from(ConnectorError::from_status(401, ""));
        assert!(!err.is_retryable());
        let info = err.failure_info();
        assert_eq!(info.kind, FailureKind::AuthenticationFailed);
        assert_eq!(info.remediation.as_deref(), Some("verify access token"));
        assert!(info.message.contains("access token"));

        let err = SyncError::from(ConnectorError::from_status(503, "busy"));
        assert!(err.is_retryable());
        assert_eq!(err.failure_kind(), FailureKind::Upstream);
    }

    #[test]
    fn local_errors_are_not_retryable() {
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::sink("disk full").is_retryable());
        assert_eq!(SyncError::sink("disk full").failure_kind(), FailureKind::Storage);
        assert!(SyncError::RunInProgress(RecordKey::new("a", "b", "c"))
            .to_string()
            .contains("a/b/c"));
    }
}
