//! Fan-in node combining every branch into the final report

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::ResearchPrompts;
use crate::error::AgentError;
use crate::graph::{GraphError, Node, NodeId, Patch, WorkflowState};
use crate::llm::LanguageModel;
use crate::record::RecordShape;

use super::fields;
use super::nodes::{field_text, UNAVAILABLE};
use super::shapes;

/// Branch fields synthesis reads, in prompt order
const BRANCHES: [&str; 3] = [fields::BACKGROUND, fields::FINANCIAL_HEALTH, fields::MARKET_POSITION];

pub struct SynthesisNode {
    id: NodeId,
    llm: Arc<dyn LanguageModel>,
    shape: RecordShape,
    writes: Vec<String>,
}

impl SynthesisNode {
    pub fn new(id: impl Into<NodeId>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            id: id.into(),
            llm,
            shape: shapes::research_report(),
            writes: vec![fields::REPORT.to_string()],
        }
    }
}

#[async_trait]
impl Node for SynthesisNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<Patch, GraphError> {
        let subject = state.get_str(fields::COMPANY_NAME).unwrap_or_default();
        let [background, financial, market] = BRANCHES.map(|key| field_text(state, key));

        let missing: Vec<&str> = BRANCHES
            .iter()
            .zip([&background, &financial, &market])
            .filter(|(_, text)| text.is_none())
            .map(|(key, _)| *key)
            .collect();
        if missing.len() == BRANCHES.len() {
            return Err(GraphError::node_failed_with_source(
                self.id.clone(),
                AgentError::no_content(&self.shape.name),
            ));
        }
        if !missing.is_empty() {
            warn!(node = %self.id, ?missing, "Synthesizing a partial report");
        }

        let messages = ResearchPrompts::synthesis(
            subject,
            background.as_deref().unwrap_or(UNAVAILABLE),
            financial.as_deref().unwrap_or(UNAVAILABLE),
            market.as_deref().unwrap_or(UNAVAILABLE),
        );
        let report = self
            .llm
            .invoke_structured(&messages, &self.shape)
            .await
            .map_err(|e| GraphError::node_failed_with_source(self.id.clone(), e))?;

        info!(node = %self.id, "Report synthesized");
        Ok(Patch::empty().set(fields::REPORT, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedModel;
    use serde_json::json;

    const REPORT: &str = r#"{
        "grounded_information": { "background": "Acme builds rockets." },
        "positive_aspects": ["Reusable boosters"],
        "negative_aspects": []
    }"#;

    #[tokio::test]
    async fn test_partial_inputs_marked_unavailable() {
        let llm = Arc::new(ScriptedModel::new().reply("Branch findings:", REPORT));
        let node = SynthesisNode::new("synthesis", llm.clone());
        let state = WorkflowState::new()
            .with_field(fields::COMPANY_NAME, "Acme")
            .with_field(fields::BACKGROUND, json!({ "industry": "Aerospace" }));

        let patch = node.run(&state).await.unwrap();
        assert_eq!(
            patch.get(fields::REPORT).unwrap()["positive_aspects"][0],
            "Reusable boosters"
        );

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("\"industry\": \"Aerospace\""));
        assert!(prompt.contains(&format!("## Financial Health\n{UNAVAILABLE}")));
    }

    #[tokio::test]
    async fn test_nothing_survived_is_no_content() {
        let llm = Arc::new(ScriptedModel::new().reply("Branch findings:", REPORT));
        let node = SynthesisNode::new("synthesis", llm.clone());
        let state = WorkflowState::new().with_field(fields::COMPANY_NAME, "Acme");

        let err = node.run(&state).await.unwrap_err();
        assert_eq!(
            err.source_as::<AgentError>(),
            Some(&AgentError::no_content("ResearchReport"))
        );
        assert_eq!(llm.calls(), 0);
    }
}
