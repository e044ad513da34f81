//! # Configuration Module
//!
//! Loads the researcher's configuration in layers, later layers winning:
//! 1. built-in defaults
//! 2. an optional YAML file (`--config`)
//! 3. environment variables (a `.env` file is loaded first)
//! 4. command-line flags (applied in `main`)

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use research_engine::{BranchMode, DeadlineConfig, ResearchConfig};
use serde::{Deserialize, Serialize};

// =============================================================================
// LLM PROVIDER
// =============================================================================
/// Which Rig provider backs the language model port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local models via Ollama
    #[default]
    Ollama,
    /// OpenAI API (reads OPENAI_API_KEY)
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" => Ok(LlmProvider::OpenAi),
            other => bail!("unknown LLM provider '{}' (expected 'ollama' or 'openai')", other),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Ollama => f.write_str("ollama"),
            LlmProvider::OpenAi => f.write_str("openai"),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the company researcher.
///
/// # Rust Concept: `#[serde(default)]`
/// Every field missing from a YAML file falls back to `Config::default()`,
/// so a config file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: LlmProvider,

    /// Model name (e.g. "llama3.2", "gpt-4o")
    pub model: String,

    /// Ollama server URL
    pub ollama_host: String,

    /// Sampling temperature; research wants deterministic, factual answers
    pub temperature: f64,

    /// Engine settings: query limits, crawl bounds, branch mode, parallelism
    pub research: ResearchConfig,

    /// Per-call deadlines for the LLM and search ports
    pub deadlines: DeadlineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.0,
            research: ResearchConfig::default(),
            deadlines: DeadlineConfig::default(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Defaults, then the optional YAML file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Read a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Override fields from variables returned by `lookup`.
    ///
    /// # Rust Concept: Closures as Parameters
    /// Taking the lookup as a closure keeps this testable without touching
    /// the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("LLM_PROVIDER") {
            self.provider = val.parse()?;
        }

        if let Some(val) = lookup("LLM_MODEL").or_else(|| lookup("OLLAMA_MODEL")) {
            self.model = val;
        }

        if let Some(val) = lookup("OLLAMA_API_BASE_URL") {
            self.ollama_host = val;
        }

        if let Some(val) = lookup("TEMPERATURE") {
            self.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.2)")?;
        }

        if let Some(val) = lookup("MAX_QUERIES") {
            self.research.max_queries = val
                .parse()
                .context("MAX_QUERIES must be a valid positive integer")?;
        }

        if let Some(val) = lookup("MAX_SEARCHES_PER_AGENT") {
            self.research.max_steps = val
                .parse()
                .context("MAX_SEARCHES_PER_AGENT must be a valid positive integer")?;
        }

        if let Some(val) = lookup("CRAWL_MAX_DEPTH") {
            self.research.crawl_depth = val
                .parse()
                .context("CRAWL_MAX_DEPTH must be a valid positive integer")?;
        }

        if let Some(val) = lookup("CRAWL_LIMIT") {
            self.research.crawl_limit = val
                .parse()
                .context("CRAWL_LIMIT must be a valid positive integer")?;
        }

        if let Some(val) = lookup("BRANCH_MODE") {
            self.research.branch_mode = match val.trim().to_lowercase().as_str() {
                "gap_fill" | "gapfill" => BranchMode::GapFill,
                "interview" => BranchMode::Interview,
                other => bail!("BRANCH_MODE must be 'gap_fill' or 'interview', got '{}'", other),
            };
        }

        if let Some(val) = lookup("INCLUDE_NEWS") {
            self.research.include_news = val
                .trim()
                .parse()
                .context("INCLUDE_NEWS must be 'true' or 'false'")?;
        }

        if let Some(val) = lookup("LLM_TIMEOUT") {
            self.deadlines.llm = parse_duration("LLM_TIMEOUT", &val)?;
        }

        if let Some(val) = lookup("SEARCH_TIMEOUT") {
            self.deadlines.search = parse_duration("SEARCH_TIMEOUT", &val)?;
        }

        Ok(())
    }

    /// Validate the configuration before any client is built.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.model.trim().is_empty() {
            bail!("LLM model cannot be empty");
        }

        if self.research.max_queries == 0 {
            bail!("MAX_QUERIES must be at least 1");
        }

        if self.research.max_steps == 0 {
            bail!("MAX_SEARCHES_PER_AGENT must be at least 1");
        }

        if self.research.crawl_limit == 0 {
            bail!("CRAWL_LIMIT must be at least 1");
        }

        if self.deadlines.llm.is_zero() || self.deadlines.search.is_zero() {
            bail!("Port deadlines must be greater than zero");
        }

        Ok(())
    }

    /// Engine configuration for `CompanyResearcher`
    pub fn research_config(&self) -> ResearchConfig {
        self.research.clone()
    }
}

/// Durations accept humantime ("90s", "2m") or bare seconds
fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value.trim())
        .with_context(|| format!("{} must be a duration like '90s' or '2m'", name))
}
