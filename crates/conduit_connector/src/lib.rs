//! # Conduit Connector
//!
//! Connector contract and capability sandbox for Conduit.
//!
//! This crate provides:
//! - The `Connector` trait every integration implements
//! - The per-invocation `CapabilityContext` (scoped HTTP, scoped secrets,
//!   parameters)
//! - Host allow-listing for outbound requests
//! - The connector error taxonomy and HTTP status mapping
//! - `Link` header pagination parsing
//! - An explicit `ConnectorRegistry` and the `ConnectorInvoker`
//! - A generic `RestConnector`
//!
//! ## Key Invariants
//!
//! - A context is built fresh for every invocation and never outlives it
//! - Undeclared operations are rejected before the connector runs
//! - Requests to hosts outside the allow-list never reach the HTTP client
//! - Secrets are visible only to the tenant and connector they belong to
//!
//! Enable the `reqwest` feature for a production [`HttpClient`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connector;
mod context;
mod error;
mod http;
mod invoker;
mod pagination;
mod registry;
mod rest;
#[cfg(feature = "reqwest")]
mod reqwest_client;
mod secrets;

pub use connector::{ConnectionState, ConnectionStatus, Connector, ExecuteResult, Pagination};
pub use context::{
    CapabilityContext, Params, LIMIT_PARAM, PAGE_INFO_PARAM, RESOURCE_ID_PARAM, RESOURCE_PARAM,
};
pub use error::{ConnectorError, ConnectorResult, ErrorKind};
pub use http::{HostPolicy, HttpClient, HttpMethod, HttpRequest, HttpResponse, ScopedHttp};
pub use invoker::{ConnectorInvoker, DEFAULT_INVOCATION_TIMEOUT, TEST_CONNECTION_OPERATION};
pub use pagination::{next_page_token, parse_link_header, LinkValue};
pub use registry::ConnectorRegistry;
pub use rest::{RestConfig, RestConnector, ACCESS_TOKEN_SECRET};
#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestClient;
pub use secrets::{MemorySecretStore, ScopedSecrets, SecretStore, TenantScope};
