//! Scripted ports for agent unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::{transcript_text, LanguageModel, Message};
use crate::search::{Candidate, CrawlRequest, Page, SearchProvider, SearchResult};

/// Answers with the first rule whose needle appears in the prompt.
///
/// A rule with several replies hands them out in order and repeats the last.
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Vec<String>)>,
    served: Mutex<HashMap<usize, usize>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, needle: &str, reply: &str) -> Self {
        self.replies(needle, &[reply])
    }

    pub fn replies(mut self, needle: &str, replies: &[&str]) -> Self {
        self.rules
            .push((needle.to_string(), replies.iter().map(|r| r.to_string()).collect()));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError> {
        let prompt = transcript_text(messages);
        self.prompts.lock().unwrap().push(prompt.clone());

        let Some(index) = self.rules.iter().position(|(needle, _)| prompt.contains(needle)) else {
            return Err(AgentError::provider("scripted", "no scripted reply"));
        };
        let replies = &self.rules[index].1;
        let mut served = self.served.lock().unwrap();
        let n = served.entry(index).or_insert(0);
        let reply = replies[(*n).min(replies.len() - 1)].clone();
        *n += 1;
        Ok(reply)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Search port with fixed pages and per-query results.
///
/// Queries without a scripted result get one generic candidate.
#[derive(Default)]
pub struct MockSearch {
    pages: Vec<Page>,
    results: HashMap<String, SearchResult>,
    fail_search: bool,
    crawls: AtomicUsize,
    searches: AtomicUsize,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, pages: Vec<Page>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_result(mut self, result: SearchResult) -> Self {
        self.results.insert(result.query.clone(), result);
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn crawl_calls(&self) -> usize {
        self.crawls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn crawl(&self, _request: &CrawlRequest) -> Result<Vec<Page>, AgentError> {
        self.crawls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.clone())
    }

    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>, AgentError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(AgentError::provider("mock", "connection reset"));
        }
        Ok(queries
            .iter()
            .map(|q| {
                self.results.get(q).cloned().unwrap_or_else(|| {
                    SearchResult::new(q.as_str()).with_candidate(Candidate::new(
                        format!("About {q}"),
                        "https://example.test",
                        format!("Facts about {q}"),
                        0.5,
                    ))
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
