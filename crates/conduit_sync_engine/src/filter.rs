//! Filter push-down and post-filtering for sync runs.

use conduit_connector::Params;
use conduit_filter::{compile, AccessPath, ComparisonOperator, Expr, FilterCondition, IndexCatalog};
use serde_json::Value;

/// How a request's filter is split between the upstream and the engine.
#[derive(Debug, Clone)]
pub(crate) struct FilterPlan {
    expr: Expr,
    pushed: Vec<FilterCondition>,
    checked: Vec<FilterCondition>,
    evaluate_tree: bool,
}

impl FilterPlan {
    pub(crate) fn new(expr: Expr, catalog: &dyn IndexCatalog) -> Self {
        let compiled = compile(&expr);
        let access = AccessPath::select(&compiled, catalog);

        // Upstream filters only express equality as query parameters.
        let (pushed, unpushed): (Vec<_>, Vec<_>) = access
            .index_conditions
            .into_iter()
            .partition(|c| c.operator == ComparisonOperator::Eq && !c.value.is_null());

        // Pushed equalities are re-checked: a caller parameter or a repeated
        // field can keep them from reaching the upstream.
        let mut checked = access.residual;
        checked.extend(unpushed);
        checked.extend(pushed.iter().cloned());

        tracing::debug!(
            pushed = pushed.len(),
            checked = checked.len(),
            complex = compiled.has_complex_conditions,
            "filter plan"
        );

        Self {
            expr,
            pushed,
            checked,
            evaluate_tree: compiled.has_complex_conditions,
        }
    }

    /// Adds pushed-down conditions as parameters, without overriding caller values.
    pub(crate) fn push_down(&self, mut params: Params) -> Params {
        for condition in &self.pushed {
            if !params.contains(&condition.field) {
                params.insert(condition.field.clone(), condition.value.clone());
            }
        }
        params
    }

    /// Returns true if the post-filter has nothing to check.
    pub(crate) fn is_trivial(&self) -> bool {
        self.checked.is_empty() && !self.evaluate_tree
    }

    /// Keeps records that pass the post-filter. Undecided records are kept.
    pub(crate) fn apply(&self, records: Vec<Value>) -> (Vec<Value>, usize) {
        if self.is_trivial() {
            return (records, 0);
        }
        let before = records.len();
        let kept: Vec<Value> = records.into_iter().filter(|r| self.keep(r)).collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    fn keep(&self, record: &Value) -> bool {
        if !self.checked.iter().all(|c| c.matches(record)) {
            return false;
        }
        !self.evaluate_tree || self.expr.evaluate(record) != Some(false)
    }
}
