//! Company research orchestrator
//!
//! Wires the agents into a fixed graph, compiled once and shared by every
//! request:
//!
//! ```text
//! background ──┬── financial_health ──┬── synthesis ── END
//!              └── market_position  ──┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{
    ContentSource, ConvergenceConfig, ConvergenceLoopAgent, GapFillAgent, GapFillConfig, ResearchTopic,
    TerminationSignal, DEFAULT_MAX_QUERIES, DEFAULT_MAX_STEPS,
};
use crate::error::{AgentError, ResearchError};
use crate::graph::{BoxedNode, CompiledWorkflow, ErrorPolicy, GraphConfig, WorkflowGraph, WorkflowState, END};
use crate::llm::{LanguageModel, Message};
use crate::record::RecordShape;
use crate::search::{CrawlRequest, Page, SearchProvider, SearchResult};

use super::nodes::{GapFillNode, TopicResearchNode};
use super::synthesis::SynthesisNode;
use super::{fields, shapes};

/// Node ids of the research graph
pub mod node_ids {
    pub const BACKGROUND: &str = "background";
    pub const FINANCIAL_HEALTH: &str = "financial_health";
    pub const MARKET_POSITION: &str = "market_position";
    pub const SYNTHESIS: &str = "synthesis";
    pub const NEWS: &str = "news";
}

/// How the financial and market branches research their topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchMode {
    /// Ground a typed record in the crawled site, then fill its gaps
    #[default]
    GapFill,
    /// Run an interview loop seeded with the background record
    Interview,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Maximum search queries per fill or expert answer
    pub max_queries: usize,

    /// Expert-turn ceiling for interview branches
    pub max_steps: usize,

    /// Crawl depth from the company URL
    pub crawl_depth: u32,

    /// Maximum pages crawled
    pub crawl_limit: u32,

    /// Optional natural-language guidance for the crawler
    pub crawl_instructions: Option<String>,

    pub branch_mode: BranchMode,

    /// End-of-interview signal for interview branches
    pub termination: TerminationSignal,

    /// Maximum concurrently running nodes
    pub parallelism: usize,

    pub error_policy: ErrorPolicy,

    /// Also gather recent news; the news record is returned beside the report
    pub include_news: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        let graph = GraphConfig::default();
        Self {
            max_queries: DEFAULT_MAX_QUERIES,
            max_steps: DEFAULT_MAX_STEPS,
            crawl_depth: 2,
            crawl_limit: 5,
            crawl_instructions: None,
            branch_mode: BranchMode::default(),
            termination: TerminationSignal::default(),
            parallelism: graph.parallelism,
            error_policy: graph.error_policy,
            include_news: false,
        }
    }
}

impl ResearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_crawl(mut self, depth: u32, limit: u32) -> Self {
        self.crawl_depth = depth;
        self.crawl_limit = limit;
        self
    }

    pub fn with_crawl_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.crawl_instructions = Some(instructions.into());
        self
    }

    pub fn with_branch_mode(mut self, mode: BranchMode) -> Self {
        self.branch_mode = mode;
        self
    }

    pub fn with_termination(mut self, termination: TerminationSignal) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_news(mut self, include_news: bool) -> Self {
        self.include_news = include_news;
        self
    }

    fn graph_config(&self) -> GraphConfig {
        GraphConfig::new()
            .with_parallelism(self.parallelism)
            .with_error_policy(self.error_policy)
    }
}

/// One research request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub company_name: String,
    pub company_url: String,
}

impl ResearchRequest {
    pub fn new(company_name: impl Into<String>, company_url: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            company_url: company_url.into(),
        }
    }

    /// Reject an empty name or a URL that is not absolute http(s)
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.company_name.trim().is_empty() {
            return Err(ResearchError::InvalidRequest("company name is empty".into()));
        }
        let url = reqwest::Url::parse(self.company_url.trim())
            .map_err(|e| ResearchError::InvalidRequest(format!("company url '{}': {}", self.company_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResearchError::InvalidRequest(format!(
                "company url '{}' must use http or https",
                self.company_url
            )));
        }
        Ok(())
    }
}

/// Facts the report grounds in branch findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundedInformation {
    pub background: Option<String>,
    pub financial_health: Option<String>,
    pub market_position: Option<String>,
}

/// Final report of a research run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub grounded_information: GroundedInformation,
    pub positive_aspects: Vec<String>,
    pub negative_aspects: Vec<String>,
}

impl ResearchReport {
    /// Project a synthesized report value. Nulls become `None` or empty lists.
    pub fn from_value(value: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        let list = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        };
        let grounded = value.get("grounded_information");

        Self {
            grounded_information: GroundedInformation {
                background: text(grounded.and_then(|g| g.get("background"))),
                financial_health: text(grounded.and_then(|g| g.get("financial_health"))),
                market_position: text(grounded.and_then(|g| g.get("market_position"))),
            },
            positive_aspects: list("positive_aspects"),
            negative_aspects: list("negative_aspects"),
        }
    }
}

/// Everything a research run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub run_id: Uuid,
    pub request: ResearchRequest,
    pub report: ResearchReport,
    /// Branch outputs as they stood when synthesis ran
    pub background: Option<Value>,
    pub financial_health: Option<Value>,
    pub market_position: Option<Value>,
    /// News record, when news was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<Value>,
    /// Failures and skipped steps, as `"{node}: {error}"`
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ResearchOutcome {
    /// True when no node failed and no step was skipped
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Company research entry point
pub struct CompanyResearcher {
    workflow: Arc<CompiledWorkflow>,
    config: ResearchConfig,
}

impl CompanyResearcher {
    /// Build and compile the research graph
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Result<Self, ResearchError> {
        let background = GapFillAgent::new(
            node_ids::BACKGROUND,
            shapes::company_background(),
            llm.clone(),
            search.clone(),
            GapFillConfig::new()
                .with_max_queries(config.max_queries)
                .with_focus("the company's background")
                .with_content(ContentSource::Crawl {
                    max_depth: config.crawl_depth,
                    limit: config.crawl_limit,
                    instructions: config.crawl_instructions.clone(),
                }),
        );
        let background: BoxedNode = Arc::new(
            GapFillNode::new(node_ids::BACKGROUND, background, fields::BACKGROUND).publishing_pages(fields::SITE_CONTENT),
        );

        let financial = branch_node(
            &config,
            node_ids::FINANCIAL_HEALTH,
            fields::FINANCIAL_HEALTH,
            shapes::financial_health(),
            ResearchTopic::financial_health(),
            &llm,
            &search,
        );
        let market = branch_node(
            &config,
            node_ids::MARKET_POSITION,
            fields::MARKET_POSITION,
            shapes::market_position(),
            ResearchTopic::market_position(),
            &llm,
            &search,
        );

        let mut graph = WorkflowGraph::new()
            .name("company_research")
            .shared_node(background)
            .shared_node(financial)
            .shared_node(market)
            .node(SynthesisNode::new(node_ids::SYNTHESIS, llm.clone()))
            .entry(node_ids::BACKGROUND)
            .edge(node_ids::BACKGROUND, node_ids::FINANCIAL_HEALTH)
            .edge(node_ids::BACKGROUND, node_ids::MARKET_POSITION)
            .edge(node_ids::FINANCIAL_HEALTH, node_ids::SYNTHESIS)
            .edge(node_ids::MARKET_POSITION, node_ids::SYNTHESIS)
            .edge(node_ids::SYNTHESIS, END);

        // News runs beside the topic branches and never feeds synthesis
        if config.include_news {
            let agent = GapFillAgent::new(
                node_ids::NEWS,
                shapes::news(),
                llm,
                search,
                GapFillConfig::new()
                    .with_max_queries(config.max_queries)
                    .with_focus("recent important news")
                    .with_content(ContentSource::Reuse),
            );
            graph = graph
                .node(GapFillNode::new(node_ids::NEWS, agent, fields::NEWS))
                .edge(node_ids::BACKGROUND, node_ids::NEWS)
                .edge(node_ids::NEWS, END);
        }

        let built = graph.build()?;

        let workflow = CompiledWorkflow::compile(built, config.graph_config());
        info!(
            workflow = workflow.name(),
            branch_mode = ?config.branch_mode,
            parallelism = workflow.config().parallelism,
            "Research workflow compiled"
        );

        Ok(Self {
            workflow: Arc::new(workflow),
            config,
        })
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Mermaid diagram of the research graph
    pub fn to_mermaid(&self) -> String {
        self.workflow.to_mermaid()
    }

    /// Mermaid diagram of the graph `config` would build, without any
    /// provider behind the ports
    pub fn mermaid_for(config: ResearchConfig) -> Result<String, ResearchError> {
        let port = Arc::new(Disconnected);
        Ok(Self::new(port.clone(), port, config)?.to_mermaid())
    }

    /// Research one company.
    ///
    /// Returns a report whenever synthesis produced one, even if some
    /// branches failed; their errors are listed in the outcome.
    pub async fn research(&self, request: ResearchRequest) -> Result<ResearchOutcome, ResearchError> {
        request.validate()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("research", %run_id, company = %request.company_name);
        self.run(run_id, request).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, request: ResearchRequest) -> Result<ResearchOutcome, ResearchError> {
        let started_at = Utc::now();
        info!(url = %request.company_url, "Research started");

        let initial = WorkflowState::new()
            .with_field(fields::COMPANY_NAME, request.company_name.trim())
            .with_field(fields::COMPANY_URL, request.company_url.trim());
        let result = self.workflow.invoke(initial).await?;

        let state = result.state;
        let errors = state.errors().to_vec();
        for error in &errors {
            warn!(%error, "Research step failed");
        }

        let Some(report) = state.get(fields::REPORT) else {
            return Err(ResearchError::NoReport { errors });
        };

        let finished_at = Utc::now();
        info!(
            completed = result.completed.len(),
            failed = result.failed.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Research finished"
        );

        Ok(ResearchOutcome {
            run_id,
            report: ResearchReport::from_value(report),
            background: state.get(fields::BACKGROUND).cloned(),
            financial_health: state.get(fields::FINANCIAL_HEALTH).cloned(),
            market_position: state.get(fields::MARKET_POSITION).cloned(),
            news: state.get(fields::NEWS).cloned(),
            request,
            errors,
            started_at,
            finished_at,
        })
    }
}

/// Port that refuses every call; lets the graph be built for inspection
struct Disconnected;

impl Disconnected {
    fn refuse(&self) -> AgentError {
        AgentError::provider("disconnected", "no provider configured")
    }
}

#[async_trait]
impl LanguageModel for Disconnected {
    async fn invoke(&self, _messages: &[Message]) -> Result<String, AgentError> {
        Err(self.refuse())
    }

    fn name(&self) -> &str {
        "disconnected"
    }
}

#[async_trait]
impl SearchProvider for Disconnected {
    async fn crawl(&self, _request: &CrawlRequest) -> Result<Vec<Page>, AgentError> {
        Err(self.refuse())
    }

    async fn search(&self, _queries: &[String]) -> Result<Vec<SearchResult>, AgentError> {
        Err(self.refuse())
    }

    fn name(&self) -> &str {
        "disconnected"
    }
}

fn branch_node(
    config: &ResearchConfig,
    id: &str,
    output: &str,
    shape: RecordShape,
    topic: ResearchTopic,
    llm: &Arc<dyn LanguageModel>,
    search: &Arc<dyn SearchProvider>,
) -> BoxedNode {
    match config.branch_mode {
        BranchMode::GapFill => {
            let focus = topic.name.to_lowercase();
            let agent = GapFillAgent::new(
                id,
                shape,
                llm.clone(),
                search.clone(),
                GapFillConfig::new()
                    .with_max_queries(config.max_queries)
                    .with_focus(focus)
                    .with_content(ContentSource::Reuse),
            );
            Arc::new(GapFillNode::new(id, agent, output))
        }
        BranchMode::Interview => {
            let agent = ConvergenceLoopAgent::new(
                topic,
                llm.clone(),
                search.clone(),
                ConvergenceConfig::new()
                    .with_max_steps(config.max_steps)
                    .with_max_queries(config.max_queries)
                    .with_termination(config.termination.clone()),
            );
            Arc::new(TopicResearchNode::new(id, agent, output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mermaid_without_providers() {
        let mermaid = CompanyResearcher::mermaid_for(ResearchConfig::default()).unwrap();
        assert!(mermaid.contains("background --> financial_health"));
        assert!(mermaid.contains("synthesis --> END([END])"));
    }

    #[test]
    fn test_news_branch_is_opt_in() {
        let without = CompanyResearcher::mermaid_for(ResearchConfig::default()).unwrap();
        assert!(!without.contains("news"));

        let with = CompanyResearcher::mermaid_for(ResearchConfig::new().with_news(true)).unwrap();
        assert!(with.contains("background --> news"));
        assert!(with.contains("news --> END([END])"));
        assert!(!with.contains("news --> synthesis"));
    }

    #[tokio::test]
    async fn test_disconnected_ports_refuse_calls() {
        let err = Disconnected.search(&["acme".to_string()]).await.unwrap_err();
        assert_eq!(err, AgentError::provider("disconnected", "no provider configured"));
    }

    #[test]
    fn test_request_validation() {
        assert!(ResearchRequest::new("Acme", "https://acme.test").validate().is_ok());
        assert!(matches!(
            ResearchRequest::new("  ", "https://acme.test").validate(),
            Err(ResearchError::InvalidRequest(_))
        ));
        assert!(matches!(
            ResearchRequest::new("Acme", "acme.test").validate(),
            Err(ResearchError::InvalidRequest(_))
        ));
        assert!(matches!(
            ResearchRequest::new("Acme", "ftp://acme.test").validate(),
            Err(ResearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_report_from_value_tolerates_nulls() {
        let report = ResearchReport::from_value(&json!({
            "grounded_information": { "background": "Acme builds rockets.", "financial_health": null },
            "positive_aspects": ["Strong team", null],
            "negative_aspects": null
        }));
        assert_eq!(report.grounded_information.background.as_deref(), Some("Acme builds rockets."));
        assert_eq!(report.grounded_information.financial_health, None);
        assert_eq!(report.positive_aspects, vec!["Strong team"]);
        assert!(report.negative_aspects.is_empty());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ResearchConfig = serde_json::from_str(r#"{"branch_mode": "interview", "max_steps": 5}"#).unwrap();
        assert_eq!(config.branch_mode, BranchMode::Interview);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.max_queries, DEFAULT_MAX_QUERIES);
        assert_eq!(config.termination, TerminationSignal::default());
    }
}
