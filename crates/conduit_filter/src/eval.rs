//! Post-filter evaluation.
//!
//! Used for records that an index lookup could not narrow down. Evaluation is
//! three-valued: `None` means the tree contains a node this crate cannot
//! interpret and the caller must decide.

use crate::ast::{BinaryOperator, ComparisonOperator, Expr};
use crate::path::lookup_path;
use serde_json::Value;
use std::cmp::Ordering;

impl ComparisonOperator {
    /// Applies the operator to two JSON values.
    ///
    /// Numbers compare numerically, strings lexicographically, booleans with
    /// `false < true`. Ordering operators on mismatched types are false.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            ComparisonOperator::Eq => values_equal(left, right),
            ComparisonOperator::NotEq => !values_equal(left, right),
            ComparisonOperator::Gt => compare_values(left, right) == Some(Ordering::Greater),
            ComparisonOperator::Lt => compare_values(left, right) == Some(Ordering::Less),
            ComparisonOperator::Ge => matches!(
                compare_values(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ComparisonOperator::Le => matches!(
                compare_values(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl Expr {
    /// Evaluates the expression against a record.
    ///
    /// Returns `None` when an opaque node decides the outcome.
    pub fn evaluate(&self, record: &Value) -> Option<bool> {
        match self {
            Expr::Binary {
                operator: BinaryOperator::And,
                left,
                right,
            } => match (left.evaluate(record), right.evaluate(record)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expr::Binary {
                operator: BinaryOperator::Or,
                left,
                right,
            } => match (left.evaluate(record), right.evaluate(record)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Expr::Binary {
                operator: BinaryOperator::Compare(op),
                left,
                right,
            } => {
                let left = left.operand(record)?;
                let right = right.operand(record)?;
                Some(op.apply(&left, &right))
            }
            Expr::Identifier(_) | Expr::Literal(_) => self.operand(record).map(|v| truthy(&v)),
            Expr::Other { .. } => None,
        }
    }

    fn operand(&self, record: &Value) -> Option<Value> {
        match self {
            Expr::Identifier(ident) if ident.is_null_constant() => Some(Value::Null),
            Expr::Identifier(ident) => Some(
                lookup_path(record, &ident.field_path())
                    .cloned()
                    .unwrap_or(Value::Null),
            ),
            Expr::Literal(literal) => Some(literal.to_value()),
            Expr::Binary { .. } => self.evaluate(record).map(Value::Bool),
            Expr::Other { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use serde_json::json;

    #[test]
    fn numeric_comparisons_mix_int_and_float() {
        assert!(ComparisonOperator::Eq.apply(&json!(1), &json!(1.0)));
        assert!(ComparisonOperator::Gt.apply(&json!(10.5), &json!(10)));
        assert!(ComparisonOperator::Le.apply(&json!(-3), &json!(-3)));
    }

    #[test]
    fn mismatched_types() {
        assert!(!ComparisonOperator::Gt.apply(&json!("10"), &json!(5)));
        assert!(!ComparisonOperator::Eq.apply(&json!("1"), &json!(1)));
        assert!(ComparisonOperator::NotEq.apply(&json!("1"), &json!(1)));
    }

    #[test]
    fn evaluate_supported_subset() {
        let record = json!({ "status": "active", "price": 25, "address": { "city": "Rome" } });

        let expr = Expr::and(
            Expr::compare("status", ComparisonOperator::Eq, "active"),
            Expr::or(
                Expr::compare("price", ComparisonOperator::Lt, 10),
                Expr::compare("address.city", ComparisonOperator::Eq, "Rome"),
            ),
        );
        assert_eq!(expr.evaluate(&record), Some(true));

        let missing = Expr::compare("discount", ComparisonOperator::Eq, Literal::Null);
        assert_eq!(missing.evaluate(&record), Some(true));
    }

    #[test]
    fn opaque_nodes_are_undecided_unless_short_circuited() {
        let record = json!({ "status": "archived" });
        let call = Expr::other("CallExpression");

        assert_eq!(call.evaluate(&record), None);

        let and = Expr::and(
            Expr::compare("status", ComparisonOperator::Eq, "active"),
            call.clone(),
        );
        assert_eq!(and.evaluate(&record), Some(false));

        let or = Expr::or(
            Expr::compare("status", ComparisonOperator::Eq, "active"),
            call,
        );
        assert_eq!(or.evaluate(&record), None);
    }

    #[test]
    fn bare_identifier_truthiness() {
        let record = json!({ "flag": true, "empty": "" });
        assert_eq!(Expr::ident("flag").evaluate(&record), Some(true));
        assert_eq!(Expr::ident("empty").evaluate(&record), Some(false));
        assert_eq!(Expr::ident("missing").evaluate(&record), Some(false));
    }
}
