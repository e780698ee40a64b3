//! Property-based test generators using proptest.

use conduit_checkpoint::{CursorConfig, CursorStrategy, RecordKey, TimestampFormat};
use conduit_connector::Params;
use conduit_filter::{ComparisonOperator, Expr};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for identifier-like names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for record keys.
pub fn record_key_strategy() -> impl Strategy<Value = RecordKey> {
    (name_strategy(), name_strategy(), name_strategy())
        .prop_map(|(tenant, connector, resource)| RecordKey::new(tenant, connector, resource))
}

/// Strategy for scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

/// Strategy for parameter maps.
pub fn params_strategy() -> impl Strategy<Value = Params> {
    prop::collection::btree_map(name_strategy(), scalar_strategy(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for cursor strategies.
pub fn cursor_strategy_strategy() -> impl Strategy<Value = CursorStrategy> {
    prop_oneof![
        Just(CursorStrategy::FindByTimestamp),
        Just(CursorStrategy::FindByCursor),
        Just(CursorStrategy::FindById),
        Just(CursorStrategy::FindAll),
    ]
}

/// Strategy for timestamp formats.
pub fn timestamp_format_strategy() -> impl Strategy<Value = TimestampFormat> {
    prop_oneof![
        Just(TimestampFormat::Iso),
        Just(TimestampFormat::EpochMs),
        Just(TimestampFormat::EpochS),
        Just(TimestampFormat::Date),
    ]
}

/// Strategy for cursor configurations.
pub fn cursor_config_strategy() -> impl Strategy<Value = CursorConfig> {
    (
        name_strategy(),
        cursor_strategy_strategy(),
        timestamp_format_strategy(),
        prop::option::of(name_strategy()),
    )
        .prop_map(|(field, strategy, format, action)| {
            let config = CursorConfig::new(field, strategy).with_format(format);
            match action {
                Some(param) => config.with_action_param(param),
                None => config,
            }
        })
}

/// Strategy for epoch-millisecond timestamps between 2001 and 2100.
pub fn epoch_millis_strategy() -> impl Strategy<Value = i64> {
    1_000_000_000_000i64..4_102_444_800_000i64
}

/// Strategy for batches of records with `id` and `updated_at` (epoch ms).
pub fn timestamped_batch_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec((1i64..1_000_000, epoch_millis_strategy()), 0..20).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, updated)| json!({ "id": id, "updated_at": updated }))
            .collect()
    })
}

/// Strategy for comparison operators.
pub fn comparison_operator_strategy() -> impl Strategy<Value = ComparisonOperator> {
    prop_oneof![
        Just(ComparisonOperator::Eq),
        Just(ComparisonOperator::NotEq),
        Just(ComparisonOperator::Gt),
        Just(ComparisonOperator::Lt),
        Just(ComparisonOperator::Ge),
        Just(ComparisonOperator::Le),
    ]
}

/// Strategy for a single comparison on a short field path.
pub fn comparison_strategy() -> impl Strategy<Value = Expr> {
    (
        prop_oneof![Just("status"), Just("total"), Just("customer.id")],
        comparison_operator_strategy(),
        prop_oneof![
            (-100i64..100).prop_map(Value::from),
            prop_oneof![Just("open"), Just("closed")].prop_map(Value::from),
        ],
    )
        .prop_map(|(path, op, value)| match value {
            Value::String(s) => Expr::compare(path, op, s),
            other => Expr::compare(path, op, other.as_i64().unwrap_or_default()),
        })
}

/// Strategy for filter trees mixing `&&`, `||` and unsupported nodes.
pub fn filter_expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        4 => comparison_strategy(),
        1 => Just(Expr::other("CallExpression")),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
            (inner.clone(), inner).prop_map(|(l, r)| Expr::or(l, r)),
        ]
    })
}

/// Strategy for order-like records matching [`comparison_strategy`] paths.
pub fn order_record_strategy() -> impl Strategy<Value = Value> {
    (
        prop_oneof![Just("open"), Just("closed")],
        -100i64..100,
        prop::option::of(-100i64..100),
    )
        .prop_map(|(status, total, customer)| match customer {
            Some(id) => json!({ "status": status, "total": total, "customer": { "id": id } }),
            None => json!({ "status": status, "total": total }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn params_keep_every_generated_key(params in params_strategy()) {
            prop_assert_eq!(params.iter().count(), params.len());
        }

        #[test]
        fn cursor_configs_always_have_an_action_param(config in cursor_config_strategy()) {
            prop_assert!(!config.action_param().is_empty());
        }
    }
}
