//! First-writer-wins merging of record values

use serde_json::{Map, Value};

use super::gaps::has_missing_data;

/// Merge `fill` into `base` without overwriting anything `base` already knows.
///
/// - Objects merge key by key, recursively.
/// - Two non-empty lists merge element by element, so a missing leaf inside
///   a list of records can still be filled. `base` keeps its length.
/// - Any other field of `base` that is populated is kept as is.
/// - A missing field of `base` takes the value from `fill`, but only when
///   `fill` actually has something there.
pub fn merge_preserving(base: &Value, fill: &Value) -> Value {
    match (base, fill) {
        (Value::Object(b), Value::Object(f)) => Value::Object(merge_objects(b, f)),
        (Value::Object(_), _) => base.clone(),
        (Value::Array(b), Value::Array(f)) if !b.is_empty() => Value::Array(
            b.iter()
                .enumerate()
                .map(|(i, item)| match f.get(i) {
                    Some(fill_item) => merge_preserving(item, fill_item),
                    None => item.clone(),
                })
                .collect(),
        ),
        _ if !is_missing_leaf(base) => base.clone(),
        _ if is_missing_leaf(fill) => base.clone(),
        _ => fill.clone(),
    }
}

fn merge_objects(base: &Map<String, Value>, fill: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (key, fill_value) in fill {
        let merged = match base.get(key) {
            Some(base_value) => merge_preserving(base_value, fill_value),
            None => fill_value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

fn is_missing_leaf(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
        other => has_missing_data(other),
    }
}

/// Number of leaves that are missing in `before` but present in `after`
pub(crate) fn filled_leaves(before: &Value, after: &Value) -> usize {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => a
            .iter()
            .map(|(key, a_value)| match b.get(key) {
                Some(b_value) => filled_leaves(b_value, a_value),
                None => usize::from(!is_missing_leaf(a_value)),
            })
            .sum(),
        (Value::Array(b), Value::Array(a)) if !b.is_empty() => {
            let paired: usize = b.iter().zip(a).map(|(b_item, a_item)| filled_leaves(b_item, a_item)).sum();
            let appended = a.iter().skip(b.len()).filter(|item| !is_missing_leaf(item)).count();
            paired + appended
        }
        (b, a) => usize::from(is_missing_leaf(b) && !is_missing_leaf(a) && b != a),
    }
}
