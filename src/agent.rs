//! # Agent Module
//!
//! Wires concrete providers into the research engine:
//! - a Rig agent (Ollama or OpenAI) behind the `LanguageModel` port
//! - the Tavily client behind the `SearchProvider` port
//! - a deadline around each port

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::{ollama, openai};
use research_engine::{
    CompanyResearcher, Deadline, LanguageModel, RigLanguageModel, SearchProvider, TavilyClient,
};
use tracing::{debug, info};

use crate::config::{Config, LlmProvider};

// =============================================================================
// RESEARCHER CONSTRUCTION
// =============================================================================
/// Build a `CompanyResearcher` from the loaded configuration.
///
/// # Rust Concept: Trait Objects
///
/// The engine only sees `Arc<dyn LanguageModel>` and `Arc<dyn SearchProvider>`,
/// so the concrete Rig model type never leaks past this function.
pub fn build_researcher(config: &Config) -> Result<CompanyResearcher> {
    let llm = language_model(config)?;
    let search = search_provider(config)?;

    CompanyResearcher::new(llm, search, config.research_config())
        .context("failed to build the research workflow")
}

fn language_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let limit = config.deadlines.llm;

    match config.provider {
        LlmProvider::Ollama => {
            // In Rig 0.27, ollama::Client::from_env() reads OLLAMA_API_BASE_URL
            env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
            let client = ollama::Client::from_env();
            debug!(host = %config.ollama_host, model = %config.model, "Using Ollama");

            let agent = client
                .agent(&config.model)
                .temperature(config.temperature)
                .build();
            let model = RigLanguageModel::with_names(agent, "ollama", &config.model);
            Ok(Arc::new(Deadline::new(model, limit)))
        }
        LlmProvider::OpenAi => {
            if env::var("OPENAI_API_KEY").map_or(true, |key| key.trim().is_empty()) {
                bail!("OPENAI_API_KEY must be set to use the openai provider");
            }
            let client = openai::Client::from_env();
            debug!(model = %config.model, "Using OpenAI");

            let agent = client
                .agent(&config.model)
                .temperature(config.temperature)
                .build();
            let model = RigLanguageModel::with_names(agent, "openai", &config.model);
            Ok(Arc::new(Deadline::new(model, limit)))
        }
    }
}

fn search_provider(config: &Config) -> Result<Arc<dyn SearchProvider>> {
    let tavily = TavilyClient::from_env().context("TAVILY_API_KEY must be set for crawling and search")?;
    info!(
        llm_deadline = ?config.deadlines.llm,
        search_deadline = ?config.deadlines.search,
        "Ports configured"
    );
    Ok(Arc::new(Deadline::new(tavily, config.deadlines.search)))
}
