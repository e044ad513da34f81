//! # Company Researcher
//!
//! Researches a company from its name and home page:
//! 1. Crawls the site and grounds a background record in it
//! 2. Researches financial health and market position in parallel
//! 3. Synthesizes a report with positive and negative aspects
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "Acme Rockets" https://acme.example
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

/// Provider wiring
mod agent;

// =============================================================================
// IMPORTS
// =============================================================================
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use research_engine::{BranchMode, CompanyResearcher, ResearchOutcome, ResearchRequest};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::agent::build_researcher;
use crate::config::{Config, LlmProvider};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "company-researcher",
    version,
    about = "Researches a company and writes a grounded report",
    long_about = r#"
Company Researcher - grounded company due diligence from the command line.

Given a company name and its website it will:
  1. Crawl the website and extract the company's background
  2. Research financial health and market position in parallel
  3. Combine everything into a report of positive and negative aspects

PREREQUISITES:
  - TAVILY_API_KEY for crawling and web search
  - Either a running Ollama server (default) or OPENAI_API_KEY

EXAMPLES:
  # Research with the default local model
  company-researcher "Acme Rockets" https://acme.example

  # Interview-style branches with OpenAI, JSON output
  company-researcher --provider openai --model gpt-4o --interview --json "Acme" https://acme.example

  # Show the research graph
  company-researcher --mermaid
"#
)]
struct Args {
    /// Name of the company to research
    #[arg(value_name = "COMPANY_NAME", required_unless_present = "mermaid")]
    company_name: Option<String>,

    /// Company home page
    #[arg(value_name = "COMPANY_URL", required_unless_present = "mermaid")]
    company_url: Option<String>,

    /// Model to use (overrides LLM_MODEL / OLLAMA_MODEL)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// LLM provider: ollama or openai (overrides LLM_PROVIDER)
    #[arg(short = 'p', long = "provider")]
    provider: Option<LlmProvider>,

    /// Research financial health and market position with interview loops
    #[arg(long = "interview", default_value = "false")]
    interview: bool,

    /// Also gather recent news about the company
    #[arg(long = "news", default_value = "false")]
    news: bool,

    /// Expert-turn ceiling for interview loops
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// YAML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "COMPANY_RESEARCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Print the whole outcome as JSON
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Print the research graph as a Mermaid diagram and exit
    #[arg(long = "mermaid", default_value = "false")]
    mermaid: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

impl Args {
    /// Command-line flags are the last configuration layer
    fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if self.interview {
            config.research.branch_mode = BranchMode::Interview;
        }
        if self.news {
            config.research.include_news = true;
        }
        if let Some(max_steps) = self.max_steps {
            config.research.max_steps = max_steps;
        }
    }
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    info!(
        provider = %config.provider,
        model = %config.model,
        branch_mode = ?config.research.branch_mode,
        "Configuration loaded"
    );

    if args.mermaid {
        let mermaid = CompanyResearcher::mermaid_for(config.research_config())
            .context("failed to build the research workflow")?;
        println!("{}", mermaid);
        return Ok(());
    }

    let researcher = build_researcher(&config)?;

    let request = ResearchRequest::new(
        args.company_name.clone().unwrap_or_default(),
        args.company_url.clone().unwrap_or_default(),
    );

    let outcome = match researcher.research(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Research failed");
            eprintln!("\nResearch failed: {}", e);
            if e.to_string().contains("connection refused") {
                eprintln!("\nTip: Make sure Ollama is running:");
                eprintln!("   ollama serve");
            }
            return Err(e.into());
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?;
        println!("{}", json);
    } else {
        print_report(&outcome);
    }

    if !outcome.is_complete() {
        warn!(errors = outcome.errors.len(), "Research finished with errors");
    }
    info!(run_id = %outcome.run_id, "Research completed");
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================
fn print_report(outcome: &ResearchOutcome) {
    let rule = "=".repeat(60);
    let report = &outcome.report;
    let grounded = &report.grounded_information;

    println!("\n{}", rule);
    println!("COMPANY RESEARCH: {}", outcome.request.company_name);
    println!("{}\n", rule);

    for (title, text) in [
        ("Background", &grounded.background),
        ("Financial Health", &grounded.financial_health),
        ("Market Position", &grounded.market_position),
    ] {
        println!("## {}", title);
        println!("{}\n", text.as_deref().unwrap_or("(no information)"));
    }

    for (title, items) in [
        ("Positive Aspects", &report.positive_aspects),
        ("Negative Aspects", &report.negative_aspects),
    ] {
        println!("## {}", title);
        if items.is_empty() {
            println!("(none)");
        }
        for item in items {
            println!("- {}", item);
        }
        println!();
    }

    if let Some(news) = &outcome.news {
        println!("## Recent News");
        let items = news["recent_important_news"].as_array().cloned().unwrap_or_default();
        if items.is_empty() {
            println!("(none)");
        }
        for item in items {
            let title = item["title"].as_str().unwrap_or("(untitled)");
            match item["url"].as_str() {
                Some(url) => println!("- {} ({})", title, url),
                None => println!("- {}", title),
            }
        }
        println!();
    }

    if !outcome.errors.is_empty() {
        println!("## Incomplete Research");
        for error in &outcome.errors {
            println!("- {}", error);
        }
        println!();
    }
    println!("{}", rule);
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
