//! # Conduit Filter
//!
//! Filter expression tree and push-down compiler for Conduit.
//!
//! This crate provides:
//! - A typed filter AST (`Expr`) with a total conversion from ESTree JSON
//! - The condition compiler that splits a filter into indexable conditions
//!   and a "requires post-filter" flag
//! - Post-filter evaluation of records against conditions or whole trees
//! - Access path selection against a catalog of indexed fields
//!
//! ## Key Invariants
//!
//! - Compilation never fails: unsupported shapes degrade to
//!   `has_complex_conditions = true`
//! - Only `&&` combines sub-results; `||` is never pushed down
//! - Conditions are a conjunction; duplicates are preserved
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ast;
mod compiler;
mod eval;
mod path;
mod plan;

pub use ast::{BinaryOperator, ComparisonOperator, Expr, Identifier, Literal, UnknownOperator};
pub use compiler::{compile, CompilationResult, FilterCondition};
pub use path::lookup_path;
pub use plan::{AccessPath, IndexCatalog, IndexKind, IndexedFields};
