//! Per-invocation capability context.

use crate::error::{ConnectorError, ConnectorResult};
use crate::http::ScopedHttp;
use crate::secrets::ScopedSecrets;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter carrying an explicit resource identifier.
pub const RESOURCE_ID_PARAM: &str = "id";

/// Parameter carrying an opaque pagination token.
pub const PAGE_INFO_PARAM: &str = "page_info";

/// Parameter carrying a page size hint.
pub const LIMIT_PARAM: &str = "limit";

/// Parameter naming the upstream resource collection.
pub const RESOURCE_PARAM: &str = "resource";

/// Flat key/value invocation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a parameter value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a parameter as a string slice, if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns true if the parameter is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Sets a parameter, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Removes a parameter.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The explicit resource identifier, if any.
    pub fn resource_id(&self) -> Option<&Value> {
        self.get(RESOURCE_ID_PARAM).filter(|v| !v.is_null())
    }

    /// The pagination token, if any.
    pub fn page_info(&self) -> Option<&str> {
        self.get_str(PAGE_INFO_PARAM)
    }

    /// The page size hint, if any.
    pub fn limit(&self) -> Option<u64> {
        self.get(LIMIT_PARAM).and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Renders scalar parameters as query pairs. Nulls, arrays and objects are skipped.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null | Value::Array(_) | Value::Object(_) => return None,
                };
                Some((k.clone(), rendered))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Everything a connector may touch during one invocation.
///
/// Built fresh by the invoker for every call and only lent to the connector.
/// There is no way to reach the filesystem, spawn processes or open sockets
/// through it.
#[derive(Debug)]
pub struct CapabilityContext {
    operation: String,
    params: Params,
    http: ScopedHttp,
    secrets: ScopedSecrets,
}

impl CapabilityContext {
    /// Creates a context.
    pub fn new(
        operation: impl Into<String>,
        params: Params,
        http: ScopedHttp,
        secrets: ScopedSecrets,
    ) -> Self {
        Self {
            operation: operation.into(),
            params,
            http,
            secrets,
        }
    }

    /// Requested operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Invocation parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Scoped HTTP client.
    pub fn http(&self) -> &ScopedHttp {
        &self.http
    }

    /// Scoped secrets.
    pub fn secrets(&self) -> &ScopedSecrets {
        &self.secrets
    }

    /// Returns a parameter, failing with `InvalidConfiguration` if absent.
    pub fn require_param(&self, key: &str) -> ConnectorResult<&Value> {
        self.params
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                ConnectorError::invalid_configuration(format!(
                    "operation '{}' requires parameter '{}'",
                    self.operation, key
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_accessors() {
        let params = Params::new()
            .with("id", 42)
            .with("page_info", "abc")
            .with("limit", "50")
            .with("status", "open");

        assert_eq!(params.resource_id(), Some(&json!(42)));
        assert_eq!(params.page_info(), Some("abc"));
        assert_eq!(params.limit(), Some(50));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn null_id_is_absent() {
        let params = Params::new().with("id", Value::Null);
        assert!(params.resource_id().is_none());
    }

    #[test]
    fn query_pairs_skip_non_scalars() {
        let params: Params = [
            ("b", json!(true)),
            ("a", json!(1)),
            ("n", Value::Null),
            ("o", json!({ "x": 1 })),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "true".to_string())
            ]
        );
    }

    #[test]
    fn params_serialize_as_flat_map() {
        let params = Params::new().with("updated_at_min", "2024-01-01");
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({ "updated_at_min": "2024-01-01" })
        );
    }
}
