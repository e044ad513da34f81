//! Shared scripted ports for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use research_engine::llm::transcript_text;
use research_engine::search::{Candidate, CrawlRequest};
use research_engine::{AgentError, LanguageModel, Message, Page, SearchProvider, SearchResult};

enum Reply {
    Text(String),
    Fail(String),
}

/// Language model answering from substring rules, first match wins
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    /// Fail every call whose prompt contains `needle` with a provider error
    pub fn fail(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of calls whose prompt contains `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, messages: &[Message]) -> Result<String, AgentError> {
        let prompt = transcript_text(messages);
        self.prompts.lock().unwrap().push(prompt.clone());

        match self.rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            Some((_, Reply::Text(text))) => Ok(text.clone()),
            Some((_, Reply::Fail(message))) => Err(AgentError::provider("scripted", message.clone())),
            None => Err(AgentError::provider("scripted", "no scripted reply")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Search port with fixed crawl pages and scripted per-query results
#[derive(Default)]
pub struct MockSearch {
    pages: Vec<Page>,
    results: HashMap<String, SearchResult>,
    fail_search: bool,
    crawls: AtomicUsize,
    searches: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, pages: Vec<Page>) -> Self {
        self.pages = pages;
        self
    }

    /// Scripted result for one query; other queries get a generic hit
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

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
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
        self.queries.lock().unwrap().extend(queries.iter().cloned());
        if self.fail_search {
            return Err(AgentError::provider("mock", "connection reset"));
        }
        Ok(queries
            .iter()
            .map(|q| {
                self.results.get(q).cloned().unwrap_or_else(|| {
                    SearchResult::new(q.as_str()).with_candidate(Candidate::new(
                        format!("About {q}"),
                        "https://news.example.test",
                        format!("Facts about {q}"),
                        0.7,
                    ))
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn acme_site() -> Vec<Page> {
    vec![
        Page::new("https://acme.test", "Acme Rockets builds reusable launch vehicles."),
        Page::new("https://acme.test/about", "Founded in 2002 by Ada Lovelace."),
    ]
}
