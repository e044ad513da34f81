//! Workflow nodes wrapping the research agents

use async_trait::async_trait;
use tracing::info;

use crate::agents::{ConvergenceLoopAgent, GapFillAgent, GapFillInput, TopicBrief};
use crate::graph::{GraphError, Node, NodeId, Patch, WorkflowState};
use crate::search::Page;

use super::fields;

/// Placeholder for a branch output that is not in the state
pub const UNAVAILABLE: &str = "(unavailable: this research branch produced no output)";

/// Text form of a state field for a prompt; `None` when the field is absent
pub(crate) fn field_text(state: &WorkflowState, key: &str) -> Option<String> {
    state.get(key).map(|value| match value.as_str() {
        Some(text) => text.to_string(),
        None => serde_json::to_string_pretty(value).unwrap_or_default(),
    })
}

fn subject(state: &WorkflowState, node: &NodeId) -> Result<String, GraphError> {
    state
        .get_str(fields::COMPANY_NAME)
        .map(str::to_string)
        .ok_or_else(|| GraphError::node_failed(node.clone(), format!("state has no '{}'", fields::COMPANY_NAME)))
}

/// Runs a [`GapFillAgent`] and writes its record to one state field
pub struct GapFillNode {
    id: NodeId,
    agent: GapFillAgent,
    output: String,
    pages_output: Option<String>,
    writes: Vec<String>,
}

impl GapFillNode {
    pub fn new(id: impl Into<NodeId>, agent: GapFillAgent, output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            id: id.into(),
            agent,
            writes: vec![output.clone()],
            output,
            pages_output: None,
        }
    }

    /// Also publish the pages the record was grounded on
    pub fn publishing_pages(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.writes.push(field.clone());
        self.pages_output = Some(field);
        self
    }
}

#[async_trait]
impl Node for GapFillNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<Patch, GraphError> {
        let input = GapFillInput {
            subject: subject(state, &self.id)?,
            seed_url: state.get_str(fields::COMPANY_URL).map(str::to_string),
            cached_pages: state.get_as::<Vec<Page>>(fields::SITE_CONTENT).unwrap_or_default(),
        };

        let outcome = self
            .agent
            .run(&input)
            .await
            .map_err(|e| GraphError::node_failed_with_source(self.id.clone(), e))?;

        info!(
            node = %self.id,
            record = outcome.record.name(),
            version = outcome.record.version(),
            queries = outcome.queries.len(),
            "Gap fill finished"
        );

        let mut patch = Patch::empty();
        if let Some(field) = &self.pages_output {
            let pages = serde_json::to_value(&outcome.pages)
                .map_err(|e| GraphError::node_failed_with_source(self.id.clone(), e))?;
            patch = patch.set(field.as_str(), pages);
        }
        let patch = outcome
            .notes
            .into_iter()
            .fold(patch, |patch, note| patch.note(note));
        Ok(patch.set(self.output.as_str(), outcome.record.into_value()))
    }
}

/// Runs a [`ConvergenceLoopAgent`] seeded with the background record and
/// writes its report text to one state field
pub struct TopicResearchNode {
    id: NodeId,
    agent: ConvergenceLoopAgent,
    writes: Vec<String>,
}

impl TopicResearchNode {
    pub fn new(id: impl Into<NodeId>, agent: ConvergenceLoopAgent, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent,
            writes: vec![output.into()],
        }
    }
}

#[async_trait]
impl Node for TopicResearchNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<Patch, GraphError> {
        let brief = TopicBrief {
            subject: subject(state, &self.id)?,
            background: field_text(state, fields::BACKGROUND).unwrap_or_else(|| UNAVAILABLE.to_string()),
        };

        let report = self
            .agent
            .run(&brief)
            .await
            .map_err(|e| GraphError::node_failed_with_source(self.id.clone(), e))?;

        info!(
            node = %self.id,
            topic = %report.topic,
            expert_turns = report.expert_turns,
            "Topic research finished"
        );
        Ok(Patch::empty().set(self.writes[0].as_str(), report.report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{MockSearch, ScriptedModel};
    use crate::agents::{ContentSource, GapFillConfig};
    use crate::error::AgentError;
    use crate::record::RecordShape;
    use serde_json::json;
    use std::sync::Arc;

    fn gap_fill_node(llm: Arc<ScriptedModel>, search: Arc<MockSearch>) -> GapFillNode {
        let shape = RecordShape::new("Tiny").text("industry", "Industry");
        let agent = GapFillAgent::new("background", shape, llm, search, GapFillConfig::new());
        GapFillNode::new("background", agent, "background").publishing_pages("site_content")
    }

    fn state() -> WorkflowState {
        WorkflowState::new()
            .with_field(fields::COMPANY_NAME, "Acme")
            .with_field(fields::COMPANY_URL, "https://acme.test")
    }

    #[test]
    fn test_field_text() {
        let state = WorkflowState::new()
            .with_field("a", "plain")
            .with_field("b", json!({ "k": 1 }));
        assert_eq!(field_text(&state, "a").as_deref(), Some("plain"));
        assert!(field_text(&state, "b").unwrap().contains("\"k\": 1"));
        assert!(field_text(&state, "c").is_none());
    }

    #[tokio::test]
    async fn test_gap_fill_node_declares_and_writes_pages() {
        let llm = Arc::new(ScriptedModel::new().reply("Source content:", r#"{"industry": "Rockets"}"#));
        let search = Arc::new(MockSearch::new().with_pages(vec![Page::new("https://acme.test", "Acme")]));
        let node = gap_fill_node(llm, search);

        assert_eq!(node.writes(), &["background".to_string(), "site_content".to_string()]);

        let patch = node.run(&state()).await.unwrap();
        assert_eq!(patch.get("background"), Some(&json!({ "industry": "Rockets" })));
        assert_eq!(patch.get("site_content").unwrap()[0]["url"], "https://acme.test");
    }

    #[tokio::test]
    async fn test_gap_fill_node_keeps_agent_error_as_source() {
        let llm = Arc::new(ScriptedModel::new());
        let search = Arc::new(MockSearch::new());
        let node = gap_fill_node(llm, search);

        let err = node.run(&state()).await.unwrap_err();
        assert_eq!(err.node().as_str(), "background");
        assert_eq!(err.source_as::<AgentError>(), Some(&AgentError::no_content("Tiny")));
    }

    #[tokio::test]
    async fn test_missing_subject_fails() {
        let llm = Arc::new(ScriptedModel::new());
        let search = Arc::new(MockSearch::new());
        let shape = RecordShape::new("Tiny").text("industry", "Industry");
        let agent = GapFillAgent::new(
            "financial",
            shape,
            llm,
            search,
            GapFillConfig::new().with_content(ContentSource::Reuse),
        );
        let node = GapFillNode::new("financial_health", agent, "financial_health");

        let err = node.run(&WorkflowState::new()).await.unwrap_err();
        assert!(err.to_string().contains("company_name"));
    }
}
