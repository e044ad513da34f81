//! Workflow state and patches

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared state threaded through one workflow invocation.
///
/// Nodes never mutate it directly; they return a [`Patch`] that the
/// scheduler merges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    fields: Map<String, Value>,
    current_node: Option<String>,
    errors: Vec<String>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field initialization
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Deserialize a field; `None` when absent or of another type
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Node whose patch was merged most recently
    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Shallow union: every field in the patch replaces the state's field.
    pub fn merge(&mut self, node: &str, patch: Patch) {
        self.fields.extend(patch.fields);
        self.errors.extend(patch.notes);
        self.current_node = Some(node.to_string());
    }

    pub fn record_error(&mut self, node: &str, error: impl std::fmt::Display) {
        self.errors.push(format!("{}: {}", node, error));
    }
}

/// Partial state update produced by one node.
///
/// `notes` are appended to the state's error list; they are how a node that
/// recovered from a failure still reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    fields: Map<String, Value>,
    notes: Vec<String>,
}

impl Patch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.notes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}
