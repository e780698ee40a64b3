//! # Conduit Sync Engine
//!
//! Incremental sync orchestrator for Conduit connectors.
//!
//! This crate provides:
//! - The `SyncOrchestrator` driving paginated, resumable runs
//! - Retry with exponential backoff and `Retry-After` hints
//! - Filter push-down to connectors and post-filtering of pages
//! - Record sinks receiving each fetched page
//! - Run reports and cooperative cancellation
//!
//! ## Architecture
//!
//! A run walks one resource page by page:
//! 1. Resume from the processing record's stored resume point
//! 2. Fetch a page through the connector invoker
//! 3. Deliver the filtered page to the sink
//! 4. Checkpoint the new resume point before fetching the next page
//!
//! ## Key Invariants
//!
//! - At most one run per (tenant, connector, resource) at a time
//! - The checkpoint is persisted only after the sink accepted the page
//! - A failed run never moves the resume point past its last delivered page
//! - Only retryable connector errors are retried, and only up to the limit

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod filter;
mod orchestrator;
mod report;
mod sink;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{CancelToken, SyncOrchestrator, SyncRequest, DEFAULT_OPERATION};
pub use report::SyncRunReport;
pub use sink::{DiscardSink, MemorySink, RecordSink};
