//! Convergence-loop agent
//!
//! A simulated interview: an interviewer asks, an expert answers from fresh
//! search results, and the loop repeats until the interviewer signals it is
//! done or the step budget is spent. The transcript is then distilled into
//! a topic report.
//!
//! ```text
//! Ask ──> Route ──continue──> SearchAndAnswer ──> Ask
//!           │
//!           └──stop──> Summarize
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::llm::{LanguageModel, Message};
use crate::record::RecordShape;
use crate::search::{render_results, SearchProvider};

use super::gap_fill::{clean_queries, queries_shape, DEFAULT_MAX_QUERIES};
use super::prompts::ResearchPrompts;

/// Default phrase an interviewer uses to end the interview
pub const DEFAULT_END_PHRASE: &str = "Thank you so much for your help";

/// Default ceiling on expert turns
pub const DEFAULT_MAX_STEPS: usize = 3;

/// Participant in an interview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Interviewer,
    Expert,
    Reviewer,
    Summarizer,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Speaker::Interviewer => "Interviewer",
            Speaker::Expert => "Expert",
            Speaker::Reviewer => "Reviewer",
            Speaker::Summarizer => "Summarizer",
        };
        f.write_str(name)
    }
}

/// One utterance in a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// Explicit end-of-interview sentinel (structured termination only)
    #[serde(default)]
    pub signals_end: bool,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            signals_end: false,
        }
    }

    pub fn ending(mut self) -> Self {
        self.signals_end = true;
        self
    }
}

/// Ordered, append-only log of turns for one loop run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn count(&self, speaker: Speaker) -> usize {
        self.turns.iter().filter(|t| t.speaker == speaker).count()
    }

    /// Most recent turn by `speaker`
    pub fn last_from(&self, speaker: Speaker) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.speaker == speaker)
    }

    /// Plain-text rendering, one `Speaker: text` paragraph per turn
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Chat history as seen by `speaker`: its own turns are assistant
    /// messages, everyone else's are user messages.
    pub fn to_messages(&self, speaker: Speaker) -> Vec<Message> {
        self.turns
            .iter()
            .map(|t| {
                let message = if t.speaker == speaker {
                    Message::assistant(&t.text)
                } else {
                    Message::user(&t.text)
                };
                message.named(t.speaker.to_string())
            })
            .collect()
    }
}

/// How an interviewer signals that the interview is over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationSignal {
    /// Free-text turns; the interview ends when a turn contains this phrase
    /// (case-insensitive)
    Phrase(String),
    /// Structured `{question, done}` turns; `done` is the sentinel
    Structured,
}

impl Default for TerminationSignal {
    fn default() -> Self {
        TerminationSignal::Phrase(DEFAULT_END_PHRASE.to_string())
    }
}

impl TerminationSignal {
    pub fn phrase(&self) -> Option<&str> {
        match self {
            TerminationSignal::Phrase(p) => Some(p),
            TerminationSignal::Structured => None,
        }
    }
}

/// Loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Ceiling on expert turns
    pub max_steps: usize,
    /// Queries per expert answer
    pub max_queries: usize,
    pub termination: TerminationSignal,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_queries: DEFAULT_MAX_QUERIES,
            termination: TerminationSignal::default(),
        }
    }
}

impl ConvergenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries;
        self
    }

    pub fn with_termination(mut self, termination: TerminationSignal) -> Self {
        self.termination = termination;
        self
    }
}

/// Loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Ask,
    Route,
    SearchAndAnswer,
    Summarize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Expert turns reached `max_steps`
    StepBudget,
    /// The interviewer ended the interview
    InterviewerSignalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Continue,
    Summarize(StopReason),
}

/// Decide whether the interview goes on.
///
/// The step budget is checked first so the loop always terminates.
pub fn route(transcript: &Transcript, config: &ConvergenceConfig) -> RouteDecision {
    if transcript.count(Speaker::Expert) >= config.max_steps {
        return RouteDecision::Summarize(StopReason::StepBudget);
    }

    let Some(turn) = transcript.last_from(Speaker::Interviewer) else {
        return RouteDecision::Continue;
    };
    let phrase_hit = config
        .termination
        .phrase()
        .is_some_and(|p| turn.text.to_lowercase().contains(&p.to_lowercase()));
    if turn.signals_end || phrase_hit {
        return RouteDecision::Summarize(StopReason::InterviewerSignalled);
    }
    RouteDecision::Continue
}

/// A research topic for one interview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTopic {
    pub name: String,
    pub description: String,
}

impl ResearchTopic {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn financial_health() -> Self {
        Self::new(
            "Financial Health",
            "Gather and analyze financial health information for the company, \
             including revenue, expenses, and profitability.",
        )
    }

    pub fn market_position() -> Self {
        Self::new(
            "Market Position",
            "Gather and analyze the company's market position, including its \
             competitors, market share, and industry trends.",
        )
    }
}

/// What the interview is seeded with
#[derive(Debug, Clone, Default)]
pub struct TopicBrief {
    pub subject: String,
    /// Background research rendered as text
    pub background: String,
}

/// Distilled result of one interview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicReport {
    pub topic: String,
    pub report: String,
    pub expert_turns: usize,
    pub stop_reason: StopReason,
}

fn interviewer_shape() -> RecordShape {
    RecordShape::new("InterviewerTurn")
        .text("question", "Your next question, or closing remarks")
        .boolean("done", "True when the interview is over")
}

/// Interview loop over one topic
pub struct ConvergenceLoopAgent {
    topic: ResearchTopic,
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    config: ConvergenceConfig,
}

impl ConvergenceLoopAgent {
    pub fn new(
        topic: ResearchTopic,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: ConvergenceConfig,
    ) -> Self {
        Self {
            topic,
            llm,
            search,
            config,
        }
    }

    pub fn topic(&self) -> &ResearchTopic {
        &self.topic
    }

    /// Run the interview to completion and distill it
    pub async fn run(&self, brief: &TopicBrief) -> Result<TopicReport, AgentError> {
        let mut transcript = Transcript::new();
        let mut state = LoopState::Ask;
        let mut stop_reason = StopReason::StepBudget;

        loop {
            debug!(topic = %self.topic.name, ?state, turns = transcript.turns().len(), "Interview step");
            state = match state {
                LoopState::Ask => {
                    let turn = self.ask(brief, &transcript).await?;
                    transcript.push(turn);
                    LoopState::Route
                }
                LoopState::Route => match route(&transcript, &self.config) {
                    RouteDecision::Continue => LoopState::SearchAndAnswer,
                    RouteDecision::Summarize(reason) => {
                        stop_reason = reason;
                        LoopState::Summarize
                    }
                },
                LoopState::SearchAndAnswer => {
                    let turn = self.search_and_answer(brief, &transcript).await?;
                    transcript.push(turn);
                    LoopState::Ask
                }
                LoopState::Summarize => break,
            };
        }

        let report = self.summarize(brief, &transcript).await?;
        let expert_turns = transcript.count(Speaker::Expert);
        info!(topic = %self.topic.name, expert_turns, ?stop_reason, "Interview finished");

        Ok(TopicReport {
            topic: self.topic.name.clone(),
            report,
            expert_turns,
            stop_reason,
        })
    }

    async fn ask(&self, brief: &TopicBrief, transcript: &Transcript) -> Result<Turn, AgentError> {
        let mut messages = vec![Message::system(ResearchPrompts::interviewer(
            &brief.subject,
            &self.topic.name,
            &self.topic.description,
            &brief.background,
            self.config.termination.phrase(),
        ))];
        if transcript.turns().is_empty() {
            messages.push(Message::user("Please ask your first question."));
        } else {
            messages.extend(transcript.to_messages(Speaker::Interviewer));
        }

        match self.config.termination {
            TerminationSignal::Phrase(_) => {
                let text = self.llm.invoke(&messages).await?;
                Ok(Turn::new(Speaker::Interviewer, text.trim()))
            }
            TerminationSignal::Structured => {
                let value = self.llm.invoke_structured(&messages, &interviewer_shape()).await?;
                let question = value.get("question").and_then(|q| q.as_str()).unwrap_or_default();
                let turn = Turn::new(Speaker::Interviewer, question.trim());
                if value.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
                    Ok(turn.ending())
                } else {
                    Ok(turn)
                }
            }
        }
    }

    async fn search_and_answer(&self, brief: &TopicBrief, transcript: &Transcript) -> Result<Turn, AgentError> {
        let question = transcript
            .last_from(Speaker::Interviewer)
            .map(|t| t.text.clone())
            .unwrap_or_default();

        let messages = vec![
            Message::system(ResearchPrompts::interview_queries(&brief.subject, self.config.max_queries)),
            Message::user(question),
        ];
        let proposed = self.llm.invoke_structured(&messages, &queries_shape()).await?;
        let queries = clean_queries(&proposed, self.config.max_queries);
        if queries.is_empty() {
            return Err(AgentError::EmptySearchResults { queries });
        }

        let results = self.search.search(&queries).await?;
        if results.iter().all(|r| r.is_empty()) {
            return Err(AgentError::EmptySearchResults { queries });
        }
        debug!(topic = %self.topic.name, queries = queries.len(), "Expert searched");

        let mut messages = vec![Message::system(ResearchPrompts::expert(
            &brief.subject,
            &self.topic.name,
            &render_results(&results),
        ))];
        messages.extend(transcript.to_messages(Speaker::Expert));
        let answer = self.llm.invoke(&messages).await?;
        Ok(Turn::new(Speaker::Expert, answer.trim()))
    }

    async fn summarize(&self, brief: &TopicBrief, transcript: &Transcript) -> Result<String, AgentError> {
        let messages = ResearchPrompts::summary(
            &brief.subject,
            &self.topic.name,
            &self.topic.description,
            &transcript.render(),
        );
        let text = self.llm.invoke(&messages).await?;
        Ok(format!(
            "Summary of {} research for {}:\n{}",
            self.topic.name,
            brief.subject,
            text.trim()
        ))
    }
}
