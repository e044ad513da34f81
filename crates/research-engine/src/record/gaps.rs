//! Missing-data detection over arbitrary record values

use serde_json::Value;

/// Whether `value` contains any missing data.
///
/// A value is missing when it is `null`, a string that is empty after
/// trimming, or an empty list. Objects and lists are searched recursively,
/// so a nested record with one missing leaf, or a list holding one such
/// element, counts as missing. Numbers and booleans are always present.
pub fn has_missing_data(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty() || items.iter().any(has_missing_data),
        Value::Object(map) => map.values().any(has_missing_data),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Paths of every missing leaf, e.g. `founded.at` or `funding_rounds[0].amount`.
///
/// An empty list reports the list itself, not its (nonexistent) elements.
pub fn missing_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect(value, String::new(), &mut paths);
    paths
}

fn collect(value: &Value, path: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect(child, child_path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                collect(item, format!("{path}[{i}]"), out);
            }
        }
        other => {
            if has_missing_data(other) {
                out.push(if path.is_empty() { "$".to_string() } else { path });
            }
        }
    }
}
