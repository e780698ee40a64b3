//! # Conduit Testkit
//!
//! Test utilities for Conduit.
//!
//! This crate provides:
//! - A scripted connector and a scripted HTTP client
//! - Record fixtures, paged scripts and pre-wired invokers
//! - Property-based test generators using proptest
//! - Log capture setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conduit_testkit::prelude::*;
//!
//! let connector = ScriptedConnector::new(TEST_CONNECTOR);
//! connector.push_pages(paged(orders(1, 10), 4));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mock;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::mock::*;
}

pub use fixtures::*;
pub use generators::*;
pub use mock::*;

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
