//! Dotted path lookup into JSON records.

use serde_json::Value;

/// Resolves a dotted path such as `"customer.address.city"` inside a record.
///
/// Numeric segments index into arrays (`"line_items.0.sku"`). Returns `None`
/// if any segment is missing or the path is empty.
pub fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    path.split('.').try_fold(record, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_and_nested() {
        let record = json!({
            "id": 7,
            "customer": { "address": { "city": "Lyon" } },
            "line_items": [{ "sku": "A-1" }, { "sku": "B-2" }]
        });

        assert_eq!(lookup_path(&record, "id"), Some(&json!(7)));
        assert_eq!(
            lookup_path(&record, "customer.address.city"),
            Some(&json!("Lyon"))
        );
        assert_eq!(lookup_path(&record, "line_items.1.sku"), Some(&json!("B-2")));
    }

    #[test]
    fn missing_segments() {
        let record = json!({ "a": { "b": 1 } });
        assert_eq!(lookup_path(&record, "a.c"), None);
        assert_eq!(lookup_path(&record, "a.b.c"), None);
        assert_eq!(lookup_path(&record, ""), None);
        assert_eq!(lookup_path(&json!([1, 2]), "x"), None);
    }
}
