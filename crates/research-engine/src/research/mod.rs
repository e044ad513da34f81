//! Company research: shapes, workflow nodes and the orchestrator

mod nodes;
mod orchestrator;
pub mod shapes;
mod synthesis;

pub use nodes::{GapFillNode, TopicResearchNode, UNAVAILABLE};
pub use orchestrator::{
    node_ids, BranchMode, CompanyResearcher, GroundedInformation, ResearchConfig, ResearchOutcome, ResearchReport,
    ResearchRequest,
};
pub use synthesis::SynthesisNode;

/// Workflow state fields of a research run
pub mod fields {
    /// Input: company name
    pub const COMPANY_NAME: &str = "company_name";
    /// Input: company home page
    pub const COMPANY_URL: &str = "company_url";
    /// Background record
    pub const BACKGROUND: &str = "background";
    /// Pages crawled for the background, reused by gap-fill branches
    pub const SITE_CONTENT: &str = "site_content";
    /// Financial health record or report
    pub const FINANCIAL_HEALTH: &str = "financial_health";
    /// Market position record or report
    pub const MARKET_POSITION: &str = "market_position";
    /// Optional news record
    pub const NEWS: &str = "news";
    /// Synthesized report
    pub const REPORT: &str = "report";
}
