//! Filter condition compiler.
//!
//! Turns a filter tree into the list of conditions an index lookup can answer,
//! plus a flag telling the caller whether a full scan with post-filtering is
//! still required.
//!
//! # Rules
//!
//! - `&&` merges both sides (conditions concatenated, flags OR-ed)
//! - `||` is never pushed down: `{[], complex}`
//! - A comparison needs an identifier on the left and a literal (or the
//!   `null` constant) on the right
//! - Every other node is complex

use crate::ast::{BinaryOperator, ComparisonOperator, Expr};
use crate::path::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field comparison that an index can evaluate directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Dotted field path.
    pub field: String,
    /// Comparison operator.
    pub operator: ComparisonOperator,
    /// Value to compare against.
    pub value: Value,
    /// True if the field is top-level (no dot in the path).
    pub is_simple_field: bool,
}

impl FilterCondition {
    /// Creates a condition, deriving `is_simple_field` from the path.
    pub fn new(field: impl Into<String>, operator: ComparisonOperator, value: Value) -> Self {
        let field = field.into();
        let is_simple_field = !field.contains('.');
        Self {
            field,
            operator,
            value,
            is_simple_field,
        }
    }

    /// Tests the condition against a record. A missing field compares as `null`.
    pub fn matches(&self, record: &Value) -> bool {
        let actual = lookup_path(record, &self.field).unwrap_or(&Value::Null);
        self.operator.apply(actual, &self.value)
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationResult {
    /// Indexable conditions, to be applied as a conjunction.
    pub conditions: Vec<FilterCondition>,
    /// True if some part of the filter could not be expressed as conditions.
    pub has_complex_conditions: bool,
}

impl CompilationResult {
    fn complex() -> Self {
        Self {
            conditions: Vec::new(),
            has_complex_conditions: true,
        }
    }

    fn single(condition: FilterCondition) -> Self {
        Self {
            conditions: vec![condition],
            has_complex_conditions: false,
        }
    }

    fn merge(mut self, other: CompilationResult) -> Self {
        self.conditions.extend(other.conditions);
        self.has_complex_conditions |= other.has_complex_conditions;
        self
    }

    /// Returns true if the conditions alone describe the whole filter.
    pub fn is_fully_indexable(&self) -> bool {
        !self.has_complex_conditions
    }

    /// Tests every condition against a record.
    ///
    /// This does not account for complex parts of the filter; callers must
    /// still post-filter when `has_complex_conditions` is set.
    pub fn matches_conditions(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Compiles a filter tree into indexable conditions.
pub fn compile(expr: &Expr) -> CompilationResult {
    match expr {
        Expr::Binary {
            operator: BinaryOperator::And,
            left,
            right,
        } => compile(left).merge(compile(right)),
        Expr::Binary {
            operator: BinaryOperator::Or,
            ..
        } => CompilationResult::complex(),
        Expr::Binary {
            operator: BinaryOperator::Compare(op),
            left,
            right,
        } => compile_comparison(*op, left, right),
        Expr::Identifier(_) | Expr::Literal(_) | Expr::Other { .. } => {
            CompilationResult::complex()
        }
    }
}

fn compile_comparison(operator: ComparisonOperator, left: &Expr, right: &Expr) -> CompilationResult {
    let Expr::Identifier(ident) = left else {
        return CompilationResult::complex();
    };

    let value = match right {
        Expr::Literal(literal) => literal.to_value(),
        Expr::Identifier(other) if other.is_null_constant() => Value::Null,
        _ => return CompilationResult::complex(),
    };

    CompilationResult::single(FilterCondition::new(ident.field_path(), operator, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Identifier, Literal};
    use proptest::prelude::*;
    use serde_json::json;

    fn includes_call() -> Expr {
        Expr::other("CallExpression")
    }

    #[test]
    fn conjunction_of_two_comparisons() {
        let expr = Expr::and(
            Expr::compare("status", ComparisonOperator::Eq, "active"),
            Expr::compare("price", ComparisonOperator::Gt, 10),
        );

        let result = compile(&expr);
        assert!(!result.has_complex_conditions);
        assert_eq!(
            result.conditions,
            vec![
                FilterCondition::new("status", ComparisonOperator::Eq, json!("active")),
                FilterCondition::new("price", ComparisonOperator::Gt, json!(10)),
            ]
        );
        assert!(result.conditions.iter().all(|c| c.is_simple_field));
    }

    #[test]
    fn disjunction_is_complex() {
        let expr = Expr::or(
            Expr::compare("status", ComparisonOperator::Eq, "active"),
            Expr::compare("region", ComparisonOperator::Eq, "EU"),
        );

        assert_eq!(compile(&expr), CompilationResult::complex());
    }

    #[test]
    fn function_call_is_complex_at_any_depth() {
        assert!(compile(&includes_call()).has_complex_conditions);

        let nested = Expr::and(
            Expr::compare("a", ComparisonOperator::Eq, 1),
            Expr::and(
                Expr::compare("b", ComparisonOperator::Eq, 2),
                includes_call(),
            ),
        );
        let result = compile(&nested);
        assert!(result.has_complex_conditions);
        assert_eq!(result.conditions.len(), 2);
    }

    #[test]
    fn nested_field_is_not_simple() {
        let result = compile(&Expr::compare(
            "address.city",
            ComparisonOperator::Eq,
            "Oslo",
        ));
        assert_eq!(result.conditions.len(), 1);
        assert_eq!(result.conditions[0].field, "address.city");
        assert!(!result.conditions[0].is_simple_field);
        assert!(!result.has_complex_conditions);
    }

    #[test]
    fn null_identifier_on_right() {
        let expr = Expr::binary(
            BinaryOperator::Compare(ComparisonOperator::NotEq),
            Expr::ident("deleted_at"),
            Expr::Identifier(Identifier::new("null")),
        );
        let result = compile(&expr);
        assert_eq!(
            result.conditions,
            vec![FilterCondition::new(
                "deleted_at",
                ComparisonOperator::NotEq,
                Value::Null
            )]
        );
    }

    #[test]
    fn non_literal_operands_are_complex() {
        let field_to_field = Expr::binary(
            BinaryOperator::Compare(ComparisonOperator::Eq),
            Expr::ident("a"),
            Expr::ident("b"),
        );
        assert!(compile(&field_to_field).has_complex_conditions);

        let literal_on_left = Expr::binary(
            BinaryOperator::Compare(ComparisonOperator::Lt),
            Expr::literal(10),
            Expr::ident("price"),
        );
        assert!(compile(&literal_on_left).has_complex_conditions);

        assert!(compile(&Expr::ident("active")).has_complex_conditions);
        assert!(compile(&Expr::literal(true)).has_complex_conditions);
    }

    #[test]
    fn duplicate_fields_are_kept() {
        let expr = Expr::and(
            Expr::compare("x", ComparisonOperator::Eq, 1),
            Expr::compare("x", ComparisonOperator::Eq, 2),
        );
        let result = compile(&expr);
        assert_eq!(result.conditions.len(), 2);
        assert!(!result.matches_conditions(&json!({ "x": 1 })));
        assert!(!result.matches_conditions(&json!({ "x": 2 })));
    }

    #[test]
    fn or_inside_and_keeps_other_side() {
        let expr = Expr::and(
            Expr::compare("status", ComparisonOperator::Eq, "open"),
            Expr::or(
                Expr::compare("a", ComparisonOperator::Eq, 1),
                Expr::compare("b", ComparisonOperator::Eq, 2),
            ),
        );
        let result = compile(&expr);
        assert!(result.has_complex_conditions);
        assert_eq!(result.conditions.len(), 1);
        assert_eq!(result.conditions[0].field, "status");
    }

    fn leaf() -> impl Strategy<Value = Expr> {
        prop_oneof![
            ("[a-z]{1,6}", any::<i32>()).prop_map(|(f, v)| Expr::compare(
                &f,
                ComparisonOperator::Ge,
                Literal::from(i64::from(v))
            )),
            "[a-z]{1,6}".prop_map(|f| Expr::compare(&f, ComparisonOperator::Eq, "x")),
            Just(Expr::other("CallExpression")),
        ]
    }

    fn tree() -> impl Strategy<Value = Expr> {
        leaf().prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
                (inner.clone(), inner).prop_map(|(l, r)| Expr::or(l, r)),
            ]
        })
    }

    proptest! {
        #[test]
        fn and_merge_is_order_insensitive(l in tree(), r in tree()) {
            let lr = compile(&Expr::and(l.clone(), r.clone()));
            let rl = compile(&Expr::and(r, l));
            prop_assert_eq!(lr.has_complex_conditions, rl.has_complex_conditions);
            prop_assert_eq!(lr.conditions.len(), rl.conditions.len());
            for c in &lr.conditions {
                prop_assert!(rl.conditions.contains(c));
            }
        }

        #[test]
        fn or_never_yields_conditions(l in tree(), r in tree()) {
            let result = compile(&Expr::or(l, r));
            prop_assert!(result.conditions.is_empty());
            prop_assert!(result.has_complex_conditions);
        }
    }
}
