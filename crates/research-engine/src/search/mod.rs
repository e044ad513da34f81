//! Search/crawl port
//!
//! Two operations: bulk crawl of a site and a batch of targeted web
//! searches. Both may return empty lists; callers decide what that means.

mod tavily;

pub use tavily::{clean_raw_content, SearchDepth, TavilyClient, TavilyError, Topic};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Separator between rendered pages in a grounding prompt
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Separator between rendered search results in a prompt
pub const RESULT_SEPARATOR: &str = "\n########\n";

/// A cleaned unit of crawled content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub content: String,
}

impl Page {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }

    /// Render for a grounding prompt
    pub fn to_prompt_text(&self) -> String {
        format!("URL: {}\nContent:\n{}", self.url, self.content)
    }
}

/// Render a set of pages for a grounding prompt, skipping blank ones
pub fn render_pages(pages: &[Page]) -> String {
    pages
        .iter()
        .filter(|p| !p.content.trim().is_empty())
        .map(Page::to_prompt_text)
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// One hit of a search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Advisory relevance in `[0, 1]`
    pub relevance_score: f64,
}

impl Candidate {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
        }
    }
}

/// Results of a single query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub answer: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl SearchResult {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: None,
            candidates: Vec::new(),
        }
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// True when the query produced neither an answer nor any candidate
    pub fn is_empty(&self) -> bool {
        self.answer.as_deref().map_or(true, |a| a.trim().is_empty()) && self.candidates.is_empty()
    }

    /// Render for a prompt.
    ///
    /// Candidates are ordered by relevance, highest first. Scores only order
    /// them; every candidate is kept.
    pub fn to_prompt_text(&self) -> String {
        let mut out = format!("Query: {}\n", self.query);
        if self.is_empty() {
            out.push_str("(no results)\n");
            return out;
        }
        if let Some(answer) = &self.answer {
            out.push_str(&format!("Snippet: {}\n", answer));
        }
        out.push_str("Results:\n");

        let mut ranked: Vec<&Candidate> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        for candidate in ranked {
            out.push_str(&format!(
                "- {} ({})\n  Snippet: {}\n  Score: {:.2}\n",
                candidate.title, candidate.url, candidate.snippet, candidate.relevance_score
            ));
        }
        out
    }
}

/// Render a batch of results for a prompt
pub fn render_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(SearchResult::to_prompt_text)
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}

/// Parameters of a site crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
    pub max_depth: u32,
    pub limit: u32,
    pub instructions: Option<String>,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>, max_depth: u32, limit: u32) -> Self {
        Self {
            url: url.into(),
            max_depth,
            limit,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Bulk crawler plus batch web search.
///
/// `search` returns one `SearchResult` per query, in query order, and runs
/// the batch concurrently. A transport failure of any member fails the
/// whole batch; an empty result for a query is not a failure.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<Page>, AgentError>;

    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>, AgentError>;

    /// Provider name used in logs and error messages
    fn name(&self) -> &str;
}
