//! Research agents
//!
//! - [`GapFillAgent`]: ground a typed record in page content, then fill its
//!   gaps with one batch of web searches
//! - [`ConvergenceLoopAgent`]: interview loop that ends on a signal or a
//!   step budget and distills the transcript into a report
//!
//! Both talk to the outside world only through the
//! [`LanguageModel`](crate::llm::LanguageModel) and
//! [`SearchProvider`](crate::search::SearchProvider) ports.

mod convergence;
mod gap_fill;
mod prompts;

#[cfg(test)]
pub(crate) mod testing;

pub use convergence::{
    route, ConvergenceConfig, ConvergenceLoopAgent, LoopState, ResearchTopic, RouteDecision, Speaker, StopReason,
    TerminationSignal, TopicBrief, TopicReport, Transcript, Turn, DEFAULT_END_PHRASE, DEFAULT_MAX_STEPS,
};
pub use gap_fill::{
    queries_shape, ContentSource, GapFillAgent, GapFillConfig, GapFillInput, GapFillOutcome, DEFAULT_MAX_QUERIES,
};
pub use prompts::{PromptBuilder, ResearchPrompts};
