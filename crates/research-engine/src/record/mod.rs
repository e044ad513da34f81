//! Record model
//!
//! Research knowledge lives in `ResearchRecord`s: JSON objects whose layout
//! is declared by a `RecordShape`. Gap detection and merging are generic
//! over any shape.

mod gaps;
mod merge;
mod shape;

pub use gaps::{has_missing_data, missing_paths};
pub use merge::merge_preserving;
pub use shape::{FieldKind, FieldSpec, RecordShape, ShapeViolation, DATE_FORMAT};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accumulated knowledge about one research topic.
///
/// Records only grow: `merge` fills missing fields and never replaces a
/// populated one. `version` counts the changes applied since creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    name: String,
    version: u32,
    value: Value,
}

impl ResearchRecord {
    /// Empty record of the given shape (every field `null`)
    pub fn empty(shape: &RecordShape) -> Self {
        Self {
            name: shape.name.clone(),
            version: 0,
            value: shape.empty_template(),
        }
    }

    /// Record from a value, normalized against `shape`
    pub fn from_value(shape: &RecordShape, value: &Value) -> Result<Self, ShapeViolation> {
        Ok(Self {
            name: shape.name.clone(),
            version: 0,
            value: shape.conform(value)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Field lookup by dotted path (`founded.at`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.value, |current, key| current.get(key))
    }

    /// Whether any field is still missing
    pub fn has_gaps(&self) -> bool {
        has_missing_data(&self.value)
    }

    /// Dotted paths of the missing fields
    pub fn missing_fields(&self) -> Vec<String> {
        missing_paths(&self.value)
    }

    /// Fill missing fields from `candidate`; returns how many leaves were filled.
    pub fn merge(&mut self, candidate: &Value) -> usize {
        let merged = merge_preserving(&self.value, candidate);
        let filled = merge::filled_leaves(&self.value, &merged);
        if filled > 0 {
            self.value = merged;
            self.version += 1;
        }
        filled
    }

    /// Explicitly clear a field so a later merge may populate it again.
    ///
    /// Returns false when the path does not exist.
    pub fn clear(&mut self, path: &str) -> bool {
        let mut keys: Vec<&str> = path.split('.').collect();
        let Some(last) = keys.pop() else {
            return false;
        };
        let parent = keys
            .into_iter()
            .try_fold(&mut self.value, |current, key| current.get_mut(key));

        match parent.and_then(|p| p.as_object_mut()) {
            Some(obj) if obj.contains_key(last) => {
                obj.insert(last.to_string(), Value::Null);
                self.version += 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape() -> RecordShape {
        RecordShape::new("MarketPosition")
            .list("competitors", FieldKind::Text, "Competitors")
            .text("market_share", "Share of market")
            .record(
                "founded",
                RecordShape::new("Founded").date("at", "Date"),
                "Founding",
            )
    }

    #[test]
    fn test_empty_record_has_gaps() {
        let record = ResearchRecord::empty(&shape());
        assert_eq!(record.name(), "MarketPosition");
        assert_eq!(record.version(), 0);
        assert!(record.has_gaps());
        assert_eq!(record.missing_fields().len(), 3);
    }

    #[test]
    fn test_merge_bumps_version_only_on_change() {
        let mut record = ResearchRecord::empty(&shape());

        let filled = record.merge(&json!({ "market_share": "12%" }));
        assert_eq!(filled, 1);
        assert_eq!(record.version(), 1);

        let filled = record.merge(&json!({ "market_share": "40%" }));
        assert_eq!(filled, 0);
        assert_eq!(record.version(), 1);
        assert_eq!(record.get("market_share"), Some(&json!("12%")));
    }

    #[test]
    fn test_clear_allows_refill() {
        let mut record = ResearchRecord::from_value(
            &shape(),
            &json!({ "market_share": "12%", "founded": { "at": "2001-02-03" } }),
        )
        .unwrap();

        assert!(record.clear("founded.at"));
        assert!(!record.clear("founded.nope"));
        assert!(record.get("founded.at").unwrap().is_null());

        record.merge(&json!({ "founded": { "at": "2002-02-02" } }));
        assert_eq!(record.get("founded.at"), Some(&json!("2002-02-02")));
        assert_eq!(record.get("market_share"), Some(&json!("12%")));
    }

    #[test]
    fn test_from_value_rejects_mismatch() {
        let err = ResearchRecord::from_value(&shape(), &json!({ "competitors": "Acme" }));
        assert!(err.is_err());
    }
}
