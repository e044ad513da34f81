//! Rig agents as a [`LanguageModel`]
//!
//! Any Rig provider (Ollama, OpenAI, ...) can back the research agents:
//! build a `rig::agent::Agent` and wrap it.
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::ollama;
//! use research_engine::compat::RigLanguageModel;
//!
//! let agent = ollama::Client::from_env().agent("llama3.2").temperature(0.0).build();
//! let llm = RigLanguageModel::with_names(agent, "ollama", "llama3.2");
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use rig::agent::Agent;
use rig::completion::{Chat, CompletionModel, Message as RigMessage};
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{LanguageModel, Message, Role};

/// Wraps a Rig `Agent<M>` so agents can call it through the port.
pub struct RigLanguageModel<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
}

impl<M> RigLanguageModel<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// Wrap with provider/model names for logs and errors
    pub fn with_names(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl<M> LanguageModel for RigLanguageModel<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError> {
        let conversation = build_rig_conversation(messages);
        debug!(
            provider = %self.provider_name,
            model = %self.model_name,
            history = conversation.history.len(),
            "Invoking language model"
        );

        let history = conversation
            .history
            .into_iter()
            .map(|(role, text)| match role {
                Role::Assistant => RigMessage::assistant(text),
                _ => RigMessage::user(text),
            })
            .collect::<Vec<_>>();

        let text = self
            .agent
            .chat(conversation.prompt.as_str(), history)
            .await
            .map_err(|e| AgentError::provider(&self.provider_name, e.to_string()))?;

        debug!(provider = %self.provider_name, chars = text.len(), response = %text, "Language model responded");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

/// A port conversation flattened for Rig's chat API
struct RigConversation {
    prompt: String,
    history: Vec<(Role, String)>,
}

/// The last message is the prompt; system messages are prepended to it.
///
/// The agent's own preamble is fixed at build time, so per-call system
/// instructions travel with the prompt.
fn build_rig_conversation(messages: &[Message]) -> RigConversation {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        let content = match &message.name {
            Some(name) => format!("{}: {}", name, message.content),
            None => message.content.clone(),
        };
        match message.role {
            Role::System => {
                if !message.content.trim().is_empty() {
                    system_parts.push(content);
                }
            }
            role => turns.push((role, content)),
        }
    }

    let last = turns.pop().map(|(_, text)| text).unwrap_or_default();
    system_parts.push(last);
    let prompt = system_parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    RigConversation {
        prompt,
        history: turns,
    }
}

impl<M> std::fmt::Debug for RigLanguageModel<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigLanguageModel")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_folds_system_into_prompt() {
        let messages = vec![
            Message::system("schema rules"),
            Message::system("be factual"),
            Message::assistant("What was revenue in 2023?").named("Interviewer"),
            Message::user("About $12M.").named("Expert"),
            Message::user("Summarize."),
        ];

        let conversation = build_rig_conversation(&messages);

        assert_eq!(conversation.prompt, "schema rules\n\nbe factual\n\nSummarize.");
        assert_eq!(
            conversation.history,
            vec![
                (Role::Assistant, "Interviewer: What was revenue in 2023?".to_string()),
                (Role::User, "Expert: About $12M.".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_conversation_gets_empty_prompt() {
        let conversation = build_rig_conversation(&[]);
        assert!(conversation.prompt.is_empty());
        assert!(conversation.history.is_empty());
    }

    #[test]
    fn test_system_only_conversation() {
        let conversation = build_rig_conversation(&[Message::system("Plan searches."), Message::system("  ")]);
        assert_eq!(conversation.prompt, "Plan searches.");
        assert!(conversation.history.is_empty());
    }
}
