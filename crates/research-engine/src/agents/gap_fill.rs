//! Gap-fill agent
//!
//! Acquire content, ground a record in it, then fill whatever is still
//! missing with one batch of targeted web searches:
//!
//! 1. content acquisition (crawl the seed URL or reuse earlier pages)
//! 2. grounding (one structured call constrained to the record shape)
//! 3. gap detection (generic over the shape)
//! 4. conditional fill (queries, batch search, structured merge)
//!
//! Stage 4 runs only when stage 3 finds a gap. Fill results pass through
//! [`merge_preserving`](crate::record::merge_preserving), so a grounded
//! field can never be overwritten by the merge.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::record::{FieldKind, RecordShape, ResearchRecord};
use crate::search::{render_pages, render_results, CrawlRequest, Page, SearchProvider};

use super::prompts::ResearchPrompts;

/// Default cap on queries per fill
pub const DEFAULT_MAX_QUERIES: usize = 5;

/// Where the agent gets the content it grounds on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSource {
    /// Crawl the seed URL
    Crawl {
        max_depth: u32,
        limit: u32,
        #[serde(default)]
        instructions: Option<String>,
    },
    /// Use pages gathered earlier in the same run
    Reuse,
}

impl Default for ContentSource {
    fn default() -> Self {
        ContentSource::Crawl {
            max_depth: 2,
            limit: 5,
            instructions: None,
        }
    }
}

/// Gap-fill agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFillConfig {
    /// Maximum number of search queries in the fill batch
    pub max_queries: usize,

    /// Content acquisition strategy
    pub content: ContentSource,

    /// What the record is about, phrased for the grounding prompt
    pub focus: String,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            max_queries: DEFAULT_MAX_QUERIES,
            content: ContentSource::default(),
            focus: "information".to_string(),
        }
    }
}

impl GapFillConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries;
        self
    }

    pub fn with_content(mut self, content: ContentSource) -> Self {
        self.content = content;
        self
    }

    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = focus.into();
        self
    }
}

/// Per-run input
#[derive(Debug, Clone, Default)]
pub struct GapFillInput {
    /// Company (or other subject) being researched
    pub subject: String,
    /// Crawl root for `ContentSource::Crawl`
    pub seed_url: Option<String>,
    /// Pages for `ContentSource::Reuse`
    pub cached_pages: Vec<Page>,
}

/// Result of one gap-fill run
#[derive(Debug, Clone)]
pub struct GapFillOutcome {
    pub record: ResearchRecord,
    /// Pages the record was grounded on
    pub pages: Vec<Page>,
    /// Queries sent to the search port (empty when no fill ran)
    pub queries: Vec<String>,
    /// Non-fatal problems to surface in the workflow errors
    pub notes: Vec<String>,
}

/// Shape of the query-generation response
pub fn queries_shape() -> RecordShape {
    RecordShape::new("SearchQueries").list("queries", FieldKind::Text, "Web search queries")
}

/// Trim, drop blanks and duplicates, cap at `max`
pub(crate) fn clean_queries(value: &serde_json::Value, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .get("queries")
        .and_then(|q| q.as_array())
        .into_iter()
        .flatten()
        .filter_map(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Grounds one record shape and fills its gaps
pub struct GapFillAgent {
    name: String,
    shape: RecordShape,
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    config: GapFillConfig,
}

struct Fill {
    record: ResearchRecord,
    queries: Vec<String>,
}

impl GapFillAgent {
    pub fn new(
        name: impl Into<String>,
        shape: RecordShape,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: GapFillConfig,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            llm,
            search,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &RecordShape {
        &self.shape
    }

    pub fn config(&self) -> &GapFillConfig {
        &self.config
    }

    /// Run all four stages
    pub async fn run(&self, input: &GapFillInput) -> Result<GapFillOutcome, AgentError> {
        let pages = self.acquire(input).await?;
        let record = self.ground(&input.subject, &pages).await?;

        let mut outcome = GapFillOutcome {
            record,
            pages,
            queries: Vec::new(),
            notes: Vec::new(),
        };

        if !outcome.record.has_gaps() {
            info!(agent = %self.name, "Record complete after grounding, skipping search");
            return Ok(outcome);
        }

        match self.fill(&input.subject, outcome.record.clone()).await {
            Ok(fill) => {
                outcome.record = fill.record;
                outcome.queries = fill.queries;
            }
            Err(e) if e.is_recoverable() => {
                warn!(agent = %self.name, error = %e, "Gap fill failed, keeping grounded record");
                outcome.notes.push(format!("{}: gap fill skipped: {}", self.name, e));
            }
            Err(e) => return Err(e),
        }

        Ok(outcome)
    }

    async fn acquire(&self, input: &GapFillInput) -> Result<Vec<Page>, AgentError> {
        match &self.config.content {
            ContentSource::Crawl {
                max_depth,
                limit,
                instructions,
            } => {
                let Some(url) = input.seed_url.as_deref() else {
                    return Err(AgentError::no_content(&self.shape.name));
                };
                let mut request = CrawlRequest::new(url, *max_depth, *limit);
                if let Some(instructions) = instructions {
                    request = request.with_instructions(instructions);
                }
                info!(agent = %self.name, url, max_depth, limit, "Crawling");
                let pages = self.search.crawl(&request).await?;
                debug!(agent = %self.name, pages = pages.len(), "Crawl finished");
                Ok(pages)
            }
            ContentSource::Reuse => Ok(input.cached_pages.clone()),
        }
    }

    async fn ground(&self, subject: &str, pages: &[Page]) -> Result<ResearchRecord, AgentError> {
        let content = render_pages(pages);
        if content.trim().is_empty() {
            return Err(AgentError::no_content(&self.shape.name));
        }

        let messages = ResearchPrompts::grounding(subject, &self.config.focus, &self.shape.name, &content);
        let value = self.llm.invoke_structured(&messages, &self.shape).await?;
        let record = ResearchRecord::from_value(&self.shape, &value)
            .map_err(|v| AgentError::shape_mismatch(&self.shape.name, v.to_string()))?;

        debug!(
            agent = %self.name,
            missing = record.missing_fields().len(),
            "Grounded record"
        );
        Ok(record)
    }

    async fn fill(&self, subject: &str, mut record: ResearchRecord) -> Result<Fill, AgentError> {
        let missing = record.missing_fields();
        let current = serde_json::to_string_pretty(record.value()).unwrap_or_default();

        let messages = ResearchPrompts::gap_queries(subject, self.config.max_queries, &current, &missing);
        let proposed = self.llm.invoke_structured(&messages, &queries_shape()).await?;
        let queries = clean_queries(&proposed, self.config.max_queries);
        if queries.is_empty() {
            info!(agent = %self.name, "No queries proposed, keeping grounded record");
            return Ok(Fill { record, queries });
        }

        info!(agent = %self.name, count = queries.len(), "Searching for missing fields");
        let results = self.search.search(&queries).await?;
        if results.iter().all(|r| r.is_empty()) {
            info!(agent = %self.name, "Every query came back empty, nothing to merge");
            return Ok(Fill { record, queries });
        }

        let messages = ResearchPrompts::gap_merge(
            subject,
            &self.shape.name,
            &current,
            &missing,
            &render_results(&results),
        );
        let candidate = self.llm.invoke_structured(&messages, &self.shape).await?;
        let filled = record.merge(&candidate);
        info!(agent = %self.name, filled, "Merged search results");

        Ok(Fill { record, queries })
    }
}
