//! Structured output over a plain text completion
//!
//! The model is shown the target shape's schema, answers with JSON, and the
//! answer is conformed to the shape. Anything that does not conform is a
//! `ShapeMismatch`; no repair is attempted.

use serde_json::Value;

use crate::error::AgentError;
use crate::record::RecordShape;

use super::message::Message;

/// System message telling the model which JSON shape to answer with
pub fn shape_instructions(shape: &RecordShape) -> Message {
    let schema = serde_json::to_string_pretty(&shape.schema()).unwrap_or_default();
    Message::system(format!(
        "Respond with a single JSON object matching this schema and nothing else.\n\
         Use null for any field you cannot fill from the provided information.\n\n{schema}"
    ))
}

/// Pull the first JSON object out of a model response.
///
/// Handles bare JSON, fenced ```json blocks and JSON surrounded by prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Parse `text` as a value of `shape`
pub fn parse_structured(text: &str, shape: &RecordShape) -> Result<Value, AgentError> {
    let value = extract_json(text)
        .ok_or_else(|| AgentError::shape_mismatch(&shape.name, "response contains no JSON object"))?;
    shape
        .conform(&value)
        .map_err(|violation| AgentError::shape_mismatch(&shape.name, violation.to_string()))
}
