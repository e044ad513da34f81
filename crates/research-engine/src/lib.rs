//! research-engine: graph-driven company research agents
//!
//! Researches a company from its name and home page and produces a
//! grounded report.
//! - `ResearchRecord` / `RecordShape`: typed, gap-aware records
//! - `LanguageModel` / `SearchProvider`: the two outbound ports
//! - `GapFillAgent`: ground a record in crawled content, search to fill gaps
//! - `ConvergenceLoopAgent`: interviewer/expert loop distilled to a report
//! - `WorkflowGraph`: validated DAG with concurrent fan-out and fan-in
//! - `CompanyResearcher`: the fixed research workflow
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rig::client::{CompletionClient, ProviderClient};
//! use research_engine::{CompanyResearcher, ResearchConfig, ResearchRequest, RigLanguageModel, TavilyClient};
//!
//! let client = rig::providers::openai::Client::from_env();
//! let llm = Arc::new(RigLanguageModel::new(client.agent("gpt-4o").build()));
//! let search = Arc::new(TavilyClient::from_env()?);
//!
//! let researcher = CompanyResearcher::new(llm, search, ResearchConfig::default())?;
//! let outcome = researcher
//!     .research(ResearchRequest::new("Acme", "https://acme.example"))
//!     .await?;
//! println!("{:#?}", outcome.report);
//! ```

pub mod agents;
pub mod compat;
pub mod deadline;
pub mod error;
pub mod graph;
pub mod llm;
pub mod record;
pub mod research;
pub mod search;

// Re-exports for convenience
pub use error::{AgentError, ResearchError};
pub use record::{FieldKind, RecordShape, ResearchRecord};
pub use llm::{LanguageModel, Message, Role};
pub use search::{Page, SearchProvider, SearchResult, TavilyClient};
pub use deadline::{Deadline, DeadlineConfig};
pub use compat::RigLanguageModel;

pub use agents::{
    ContentSource, ConvergenceConfig, ConvergenceLoopAgent, GapFillAgent, GapFillConfig, ResearchTopic,
    TerminationSignal,
};
pub use graph::{CompiledWorkflow, GraphConfig, WorkflowGraph, WorkflowState};
pub use research::{
    BranchMode, CompanyResearcher, ResearchConfig, ResearchOutcome, ResearchReport, ResearchRequest,
};
