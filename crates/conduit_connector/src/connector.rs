//! The connector contract.

use crate::context::CapabilityContext;
use crate::error::ConnectorResult;
use async_trait::async_trait;
use conduit_filter::IndexedFields;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pagination signal returned with every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// True if another page is available.
    pub has_next_page: bool,
    /// Opaque token for the next page.
    pub next_page_info: Option<String>,
}

impl Pagination {
    /// No further pages.
    pub fn last() -> Self {
        Self::default()
    }

    /// Another page is reachable with `token`.
    pub fn next(token: impl Into<String>) -> Self {
        Self {
            has_next_page: true,
            next_page_info: Some(token.into()),
        }
    }
}

/// Result of an `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation that produced the result.
    pub operation: String,
    /// Records returned.
    pub data: Vec<Value>,
    /// Number of records in `data`.
    pub count: usize,
    /// Pagination metadata.
    pub pagination: Pagination,
}

impl ExecuteResult {
    /// A successful page of records.
    pub fn page(operation: impl Into<String>, data: Vec<Value>, pagination: Pagination) -> Self {
        Self {
            success: true,
            operation: operation.into(),
            count: data.len(),
            data,
            pagination,
        }
    }

    /// A successful result with no records and no further pages.
    pub fn empty(operation: impl Into<String>) -> Self {
        Self::page(operation, Vec::new(), Pagination::last())
    }
}

/// Outcome of a connection probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Upstream reachable and credentials accepted.
    Connected,
    /// Reachable, but something is off (missing scope, partial outage).
    Degraded,
}

/// Result of `test_connection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Connection state.
    pub status: ConnectionState,
    /// Connector-specific details.
    pub details: Value,
}

impl ConnectionStatus {
    /// A healthy connection.
    pub fn connected(details: Value) -> Self {
        Self {
            status: ConnectionState::Connected,
            details,
        }
    }
}

/// A third-party data connector.
///
/// Implementations must be pure with respect to everything outside the
/// [`CapabilityContext`] they are given: no ambient network, filesystem or
/// global state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique connector name.
    fn name(&self) -> &str;

    /// Operations this connector supports.
    fn operations(&self) -> &[&str];

    /// Returns true if `operation` is declared.
    fn supports(&self, operation: &str) -> bool {
        self.operations().iter().any(|op| *op == operation)
    }

    /// Fields the upstream can filter on directly, as query parameters.
    fn filterable_fields(&self) -> IndexedFields {
        IndexedFields::new()
    }

    /// Probes the upstream with the context's credentials.
    async fn test_connection(&self, ctx: &CapabilityContext) -> ConnectorResult<ConnectionStatus>;

    /// Runs `ctx.operation()`.
    async fn execute(&self, ctx: &CapabilityContext) -> ConnectorResult<ExecuteResult>;
}
