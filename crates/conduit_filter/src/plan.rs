//! Access path selection.
//!
//! Given compiled conditions and a catalog of what the data source can look
//! up directly, decides which conditions are answered by the index and which
//! remain for the post-filter pass.
//!
//! - Hash indexes answer `==`
//! - BTree indexes answer `==` and range operators
//! - `!=` and nested fields always stay in the residual

use crate::ast::ComparisonOperator;
use crate::compiler::{CompilationResult, FilterCondition};
use std::collections::HashMap;

/// Kind of index available on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Equality lookups only.
    Hash,
    /// Equality and ordered range lookups.
    BTree,
}

impl IndexKind {
    /// Returns true if this index kind can evaluate the operator.
    pub fn supports(&self, operator: ComparisonOperator) -> bool {
        match operator {
            ComparisonOperator::Eq => true,
            ComparisonOperator::NotEq => false,
            ComparisonOperator::Gt
            | ComparisonOperator::Lt
            | ComparisonOperator::Ge
            | ComparisonOperator::Le => matches!(self, IndexKind::BTree),
        }
    }
}

/// Something that knows which fields can be looked up directly.
pub trait IndexCatalog {
    /// Returns the index kind for a top-level field, if any.
    fn index_for(&self, field: &str) -> Option<IndexKind>;
}

/// A simple field-to-index-kind catalog.
#[derive(Debug, Clone, Default)]
pub struct IndexedFields {
    fields: HashMap<String, IndexKind>,
}

impl IndexedFields {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an index on a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, kind: IndexKind) -> Self {
        self.fields.insert(field.into(), kind);
        self
    }

    /// Creates a catalog with equality indexes on every given field.
    pub fn equality<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| (f.into(), IndexKind::Hash))
                .collect(),
        }
    }

    /// Returns true if no field is indexed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl IndexCatalog for IndexedFields {
    fn index_for(&self, field: &str) -> Option<IndexKind> {
        self.fields.get(field).copied()
    }
}

/// The chosen access path for a compiled filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessPath {
    /// Conditions the index answers directly.
    pub index_conditions: Vec<FilterCondition>,
    /// Conditions that must be checked record by record.
    pub residual: Vec<FilterCondition>,
    /// True if records returned by the index still need a post-filter pass.
    pub requires_post_filter: bool,
}

impl AccessPath {
    /// Selects the access path for a compilation result.
    pub fn select(result: &CompilationResult, catalog: &dyn IndexCatalog) -> Self {
        let (index_conditions, residual): (Vec<_>, Vec<_>) =
            result.conditions.iter().cloned().partition(|condition| {
                condition.is_simple_field
                    && catalog
                        .index_for(&condition.field)
                        .is_some_and(|kind| kind.supports(condition.operator))
            });

        let requires_post_filter = result.has_complex_conditions || !residual.is_empty();

        Self {
            index_conditions,
            residual,
            requires_post_filter,
        }
    }

    /// Returns true if no condition could use an index.
    pub fn is_full_scan(&self) -> bool {
        self.index_conditions.is_empty()
    }
}
