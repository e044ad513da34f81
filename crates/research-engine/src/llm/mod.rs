//! Language model port
//!
//! Agents talk to a model only through [`LanguageModel`]: a single
//! request/response call with no retries, caching or streaming. Transport
//! adapters live in `compat`; deadlines in `deadline`.

mod message;
mod structured;

pub use message::{transcript_text, Message, Role};
pub use structured::{extract_json, parse_structured, shape_instructions};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::record::RecordShape;

/// A black-box language model: prompt in, text or structured value out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion
    async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError>;

    /// Completion constrained to `shape`.
    ///
    /// The default implementation prepends the shape's schema to the
    /// conversation and conforms the JSON answer. The returned value always
    /// conforms to `shape`; anything else is `AgentError::ShapeMismatch`.
    async fn invoke_structured(
        &self,
        messages: &[Message],
        shape: &RecordShape,
    ) -> Result<Value, AgentError> {
        let mut request = Vec::with_capacity(messages.len() + 1);
        request.push(shape_instructions(shape));
        request.extend_from_slice(messages);

        let text = self.invoke(&request).await?;
        parse_structured(&text, shape)
    }

    /// Provider name used in logs and error messages
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldKind;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedModel {
        reply: String,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn model(reply: &str) -> FixedModel {
        FixedModel {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    static_assertions::assert_obj_safe!(LanguageModel);

    #[tokio::test]
    async fn test_default_structured_prepends_schema() {
        let shape = RecordShape::new("Answer").text("answer", "The answer");
        let llm = model("```json\n{\"answer\": \"42\"}\n```");

        let value = llm
            .invoke_structured(&[Message::user("question?")], &shape)
            .await
            .unwrap();
        assert_eq!(value, json!({ "answer": "42" }));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0][1].content, "question?");
    }

    #[tokio::test]
    async fn test_default_structured_rejects_nonconforming() {
        let shape = RecordShape::new("Queries").list("queries", FieldKind::Text, "");
        let llm = model(r#"{"queries": [1, 2]}"#);

        let err = llm.invoke_structured(&[], &shape).await.unwrap_err();
        assert!(matches!(err, AgentError::ShapeMismatch { .. }));
    }
}
