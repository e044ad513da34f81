//! Declared record shapes
//!
//! A `RecordShape` is an ordered list of named fields. Every generic
//! operation over records (validation, templates, schema prompting) walks
//! this list instead of inspecting values reflectively.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Date format accepted by `FieldKind::Date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Kind of value a field may hold. Every field is optional (`null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Date,
    List(Box<FieldKind>),
    Record(RecordShape),
}

impl FieldKind {
    /// List of the given element kind
    pub fn list(of: FieldKind) -> Self {
        FieldKind::List(Box::new(of))
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::List(_) => "array",
            FieldKind::Record(_) => "object",
        }
    }

    fn schema(&self) -> Value {
        match self {
            FieldKind::Text => json!({ "type": ["string", "null"] }),
            FieldKind::Number => json!({ "type": ["number", "null"] }),
            FieldKind::Boolean => json!({ "type": ["boolean", "null"] }),
            FieldKind::Date => json!({ "type": ["string", "null"], "format": "date" }),
            FieldKind::List(of) => json!({ "type": ["array", "null"], "items": of.schema() }),
            FieldKind::Record(shape) => shape.schema(),
        }
    }

    fn conform(&self, path: &str, value: &Value) -> Result<Value, ShapeViolation> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (self, value) {
            (FieldKind::Text, Value::String(_))
            | (FieldKind::Number, Value::Number(_))
            | (FieldKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldKind::Date, Value::String(s)) => {
                if s.trim().is_empty() || NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).is_ok()
                {
                    Ok(Value::String(s.trim().to_string()))
                } else {
                    Err(ShapeViolation::new(path, "date (YYYY-MM-DD)", value))
                }
            }
            (FieldKind::List(of), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| of.conform(&format!("{path}[{i}]"), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (FieldKind::Record(shape), Value::Object(map)) => shape.conform_at(path, map),
            _ => Err(ShapeViolation::new(path, self.type_name(), value)),
        }
    }
}

/// One declared field of a record shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub description: String,
}

/// A value did not fit the declared shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeViolation {
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl ShapeViolation {
    fn new(path: &str, expected: &str, found: &Value) -> Self {
        let found = match found {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Self {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: expected {}, found {}", self.path, self.expected, self.found)
    }
}

impl std::error::Error for ShapeViolation {}

/// Named, ordered list of fields describing one kind of research record.
///
/// # Example
///
/// ```rust
/// use research_engine::record::{FieldKind, RecordShape};
///
/// let founded = RecordShape::new("Founded")
///     .date("at", "Founding date")
///     .list("by", FieldKind::Text, "Founders");
/// let shape = RecordShape::new("CompanyBackground")
///     .text("industry", "Primary industry")
///     .record("founded", founded, "Founding details");
///
/// let empty = shape.empty_template();
/// assert!(empty["industry"].is_null());
/// assert!(shape.validate(&empty));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordShape {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl RecordShape {
    /// Create a shape with no fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field of any kind
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            description: description.into(),
        });
        self
    }

    pub fn text(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::Text, description)
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::Number, description)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::Boolean, description)
    }

    pub fn date(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::Date, description)
    }

    pub fn list(self, name: impl Into<String>, of: FieldKind, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::list(of), description)
    }

    pub fn record(self, name: impl Into<String>, shape: RecordShape, description: impl Into<String>) -> Self {
        self.field(name, FieldKind::Record(shape), description)
    }

    /// Look up a declared field
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Object with every declared field set to `null`
    pub fn empty_template(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), Value::Null))
                .collect(),
        )
    }

    /// Whether `value` conforms to this shape
    pub fn validate(&self, value: &Value) -> bool {
        self.conform(value).is_ok()
    }

    /// Check `value` against the shape and normalize it.
    ///
    /// Declared fields missing from `value` become `null`; undeclared keys are
    /// dropped. Type mismatches are rejected, never repaired.
    pub fn conform(&self, value: &Value) -> Result<Value, ShapeViolation> {
        match value {
            Value::Object(map) => self.conform_at("", map),
            other => Err(ShapeViolation::new("", "object", other)),
        }
    }

    fn conform_at(&self, path: &str, map: &Map<String, Value>) -> Result<Value, ShapeViolation> {
        let mut out = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{path}.{}", field.name)
            };
            let value = map.get(&field.name).unwrap_or(&Value::Null);
            out.insert(field.name.clone(), field.kind.conform(&field_path, value)?);
        }
        Ok(Value::Object(out))
    }

    /// JSON-schema-like description used when asking a model for this shape
    pub fn schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut schema = f.kind.schema();
                if !f.description.is_empty() {
                    if let Value::Object(ref mut obj) = schema {
                        obj.insert("description".into(), Value::String(f.description.clone()));
                    }
                }
                (f.name.clone(), schema)
            })
            .collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
        })
    }
}
