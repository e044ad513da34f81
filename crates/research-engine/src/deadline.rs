//! Caller-imposed deadlines for port calls
//!
//! The engine itself never times out. Wrap a port in [`Deadline`] to bound
//! every call; an elapsed deadline surfaces as `AgentError::Provider`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::warn;

use crate::error::AgentError;
use crate::llm::{LanguageModel, Message};
use crate::record::RecordShape;
use crate::search::{CrawlRequest, Page, SearchProvider, SearchResult};

/// Per-port deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    #[serde(with = "humantime_serde")]
    pub llm: Duration,
    #[serde(with = "humantime_serde")]
    pub search: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            llm: Duration::from_secs(120),
            search: Duration::from_secs(60),
        }
    }
}

/// Port wrapper that bounds every call by `limit`
#[derive(Debug, Clone)]
pub struct Deadline<P> {
    inner: P,
    limit: Duration,
}

impl<P> Deadline<P> {
    pub fn new(inner: P, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T, F>(&self, provider: &str, operation: &str, call: F) -> Result<T, AgentError>
    where
        F: std::future::Future<Output = Result<T, AgentError>>,
    {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(provider, operation, limit_ms = self.limit.as_millis(), "Port call exceeded deadline");
                Err(AgentError::provider(
                    provider,
                    format!("{} exceeded deadline of {:?}", operation, self.limit),
                ))
            }
        }
    }
}

#[async_trait]
impl<P: LanguageModel> LanguageModel for Deadline<P> {
    async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError> {
        self.bounded(self.inner.name(), "invoke", self.inner.invoke(messages))
            .await
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        shape: &RecordShape,
    ) -> Result<Value, AgentError> {
        self.bounded(
            self.inner.name(),
            "invoke_structured",
            self.inner.invoke_structured(messages, shape),
        )
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl<P: SearchProvider> SearchProvider for Deadline<P> {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<Page>, AgentError> {
        self.bounded(self.inner.name(), "crawl", self.inner.crawl(request))
            .await
    }

    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>, AgentError> {
        self.bounded(self.inner.name(), "search", self.inner.search(queries))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
