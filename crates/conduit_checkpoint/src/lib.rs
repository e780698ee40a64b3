//! # Conduit Checkpoint
//!
//! Checkpoint and resume management for Conduit sync runs.
//!
//! This crate provides:
//! - Cursor configuration (strategy, timestamp format, action parameter)
//! - Fetch parameter construction from a stored resume point
//! - Resume point extraction from fetched batches
//! - The run state machine
//! - Processing records and their stores (in-memory and file-backed)
//!
//! ## Key Invariants
//!
//! - A null resume point leaves fetch parameters untouched
//! - `find_all` never injects and never extracts
//! - Resume points only move forward for ordered strategies
//! - The resume point is never changed by a failed run
//! - At most one run holds a resource's run gate at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod file;
mod record;
mod resume;
mod state;
mod store;

pub use cursor::{CursorConfig, CursorStrategy, TimestampFormat, UnknownVariant};
pub use error::{StoreError, StoreResult};
pub use file::FileRecordStore;
pub use record::{FailureInfo, FailureKind, ProcessingRecord, RecordKey, RunCounters, RunStatus};
pub use resume::{
    advance, build_fetch_params, decode_timestamp, encode_timestamp, extract_next_resume_point,
    parse_timestamp, ResumePoint,
};
pub use state::{InvalidTransition, RunState};
pub use store::{InMemoryRecordStore, ProcessingRecordStore};
