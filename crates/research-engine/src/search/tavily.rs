//! Tavily crawl and search client
//!
//! Implements [`SearchProvider`] over the Tavily HTTP API.
//!
//! # Production Features
//!
//! - HTTP timeout and retry with exponential backoff
//! - Typed error handling for rate limits and timeouts
//! - Concurrent query batches, failing as a whole on any transport error
//! - Crawled content cleaned of links and blank-line runs

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AgentError;

use super::{Candidate, CrawlRequest, Page, SearchProvider, SearchResult};

/// Default Tavily API endpoint
const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Results requested per query
const DEFAULT_MAX_RESULTS: u32 = 5;

/// Search depth for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    #[default]
    Basic,
    /// More thorough search with detailed results
    Advanced,
}

/// Topic filter for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// General web search
    #[default]
    General,
    /// Recent news articles
    News,
}

/// Tavily-backed crawler and search provider
///
/// # Example
/// ```ignore
/// let tavily = TavilyClient::from_env()?.with_search_depth(SearchDepth::Advanced);
/// let results = tavily.search(&["acme robotics revenue".to_string()]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TavilyClient {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    search_depth: SearchDepth,
    topic: Topic,
    max_results: u32,
}

impl TavilyClient {
    /// Create a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            search_depth: SearchDepth::default(),
            topic: Topic::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Create from environment variable TAVILY_API_KEY
    pub fn from_env() -> Result<Self, TavilyError> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| TavilyError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Point the client at another endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set custom max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay of the exponential backoff
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_search_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    /// Results per query, clamped to Tavily's 1..=20
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, 20);
        self
    }

    async fn search_one(&self, query: &str) -> Result<SearchResult, TavilyError> {
        let request = TavilySearchRequest {
            query,
            max_results: self.max_results,
            search_depth: self.search_depth,
            topic: self.topic,
            include_answer: true,
        };
        let response: TavilySearchResponse = self.post_with_retry("search", &request).await?;
        debug!(query, results = response.results.len(), "Tavily search finished");

        let mut result = SearchResult::new(query);
        result.answer = response.answer.filter(|a| !a.trim().is_empty());
        result.candidates = response
            .results
            .into_iter()
            .map(|r| Candidate::new(r.title, r.url, r.content, r.score))
            .collect();
        Ok(result)
    }

    /// POST with retry and backoff
    async fn post_with_retry<B, R>(&self, endpoint: &str, body: &B) -> Result<R, TavilyError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut last_error = TavilyError::Unknown("No attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                debug!(attempt, delay_ms = delay.as_millis(), endpoint, "Retrying Tavily request");
                tokio::time::sleep(delay).await;
            }

            match self.post_once(endpoint, body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    // Only retry on transient errors
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, endpoint, error = %e, "Tavily request failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn post_once<B, R>(&self, endpoint: &str, body: &B) -> Result<R, TavilyError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<Page>, AgentError> {
        info!(url = %request.url, max_depth = request.max_depth, limit = request.limit, "Crawling site");

        let body = TavilyCrawlRequest {
            url: &request.url,
            max_depth: request.max_depth,
            limit: request.limit,
            instructions: request.instructions.as_deref(),
        };
        let response: TavilyCrawlResponse = self.post_with_retry("crawl", &body).await?;

        let pages: Vec<Page> = response
            .results
            .into_iter()
            .filter_map(|r| {
                let content = clean_raw_content(r.raw_content.as_deref().unwrap_or_default());
                (!content.is_empty()).then(|| Page::new(r.url, content))
            })
            .collect();

        info!(url = %request.url, pages = pages.len(), "Crawl finished");
        Ok(pages)
    }

    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>, AgentError> {
        info!(queries = queries.len(), "Running search batch");
        let results = try_join_all(queries.iter().map(|q| self.search_one(q))).await?;
        Ok(results)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Compiled once; a pattern that fails to compile is skipped.
fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Strip markdown links and bare URLs, collapse blank-line runs, trim.
pub fn clean_raw_content(raw: &str) -> String {
    static MARKDOWN_LINK: OnceLock<Option<Regex>> = OnceLock::new();
    static BARE_URL: OnceLock<Option<Regex>> = OnceLock::new();
    static BLANK_LINES: OnceLock<Option<Regex>> = OnceLock::new();

    let mut text = raw.to_string();
    let steps = [
        (&MARKDOWN_LINK, r"\[.*?\]\(.*?\)", ""),
        (&BARE_URL, r"https?://\S+", ""),
        (&BLANK_LINES, r"\n\s*\n+", "\n\n"),
    ];
    for (cell, pattern, replacement) in steps {
        if let Some(re) = cached_regex(cell, pattern) {
            text = re.replace_all(&text, replacement).into_owned();
        }
    }
    text.trim().to_string()
}

/// Typed errors for Tavily API
#[derive(Debug, thiserror::Error)]
pub enum TavilyError {
    #[error("TAVILY_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TavilyError {
    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TavilyError::Timeout
                | TavilyError::Connection(_)
                | TavilyError::RateLimited
                | TavilyError::ServerError(_, _)
        )
    }
}

impl From<TavilyError> for AgentError {
    fn from(e: TavilyError) -> Self {
        AgentError::provider("tavily", e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: SearchDepth,
    topic: Topic,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilySearchHit>,
}

#[derive(Debug, Deserialize)]
struct TavilySearchHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Serialize)]
struct TavilyCrawlRequest<'a> {
    url: &'a str,
    max_depth: u32,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TavilyCrawlResponse {
    #[serde(default)]
    results: Vec<TavilyCrawlPage>,
}

#[derive(Debug, Deserialize)]
struct TavilyCrawlPage {
    url: String,
    #[serde(default)]
    raw_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_depth_and_topic_serialization() {
        assert_eq!(serde_json::to_string(&SearchDepth::Advanced).unwrap(), r#""advanced""#);
        assert_eq!(serde_json::to_string(&Topic::News).unwrap(), r#""news""#);
        let parsed: SearchDepth = serde_json::from_str(r#""basic""#).unwrap();
        assert_eq!(parsed, SearchDepth::Basic);
    }

    #[test]
    fn test_clean_raw_content() {
        let raw = "Acme [Home](https://acme.example) builds robots.\n\n\n  \nSee https://acme.example/about for more.\n\n";
        assert_eq!(
            clean_raw_content(raw),
            "Acme  builds robots.\n\nSee  for more."
        );
        assert_eq!(clean_raw_content("  [only](a link)  "), "");
    }

    #[test]
    fn test_builder_pattern() {
        let client = TavilyClient::new("key")
            .with_base_url("http://localhost:9999/")
            .with_max_results(50)
            .with_max_retries(0)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.base_url, "http://localhost:9999");
        assert_eq!(client.max_results, 20);
        assert_eq!(client.max_retries, 0);
    }

    #[test]
    fn test_tavily_error_retryable() {
        assert!(TavilyError::Timeout.is_retryable());
        assert!(TavilyError::RateLimited.is_retryable());
        assert!(TavilyError::ServerError(503, String::new()).is_retryable());
        assert!(!TavilyError::Unauthorized.is_retryable());
        assert!(!TavilyError::BadRequest("bad".into()).is_retryable());
    }

    #[test]
    fn test_tavily_error_to_agent_error() {
        let err: AgentError = TavilyError::RateLimited.into();
        assert_eq!(
            err,
            AgentError::provider("tavily", "Rate limited - too many requests")
        );
    }
}
