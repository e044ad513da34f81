//! Prompt templates for the research agents
//!
//! Each agent step builds its messages here so the wording lives in one
//! place. Templates use `{name}` placeholders filled by [`PromptBuilder`].

use std::collections::HashMap;

use chrono::Utc;

use crate::llm::Message;

const GROUNDING_SYSTEM: &str = r#"You are a meticulous company analyst. For context, today's date is {date}.

Extract {focus} about {subject} into a "{record}" record.
Only use facts stated in the source content. Leave a field null when the
content does not state it. Never guess."#;

const GROUNDING_USER: &str = r#"Source content:
{content}"#;

const QUERY_SYSTEM: &str = r#"You plan web searches that fill gaps in a research record about {subject}.
Write at most {max_queries} short, specific web search queries. Each query
should target one missing field. Do not repeat a query."#;

const QUERY_USER: &str = r#"Current record:
{record}

Missing fields:
{missing}"#;

const MERGE_SYSTEM: &str = r#"You update a "{record}" research record about {subject} with new evidence.
Fill the missing fields using only the search results. Keep every value that
is already present exactly as it is. Leave a field null if the results do not
answer it."#;

const MERGE_USER: &str = r#"Current record:
{current}

Missing fields:
{missing}

Search results:
{results}"#;

const INTERVIEWER_SYSTEM: &str = r#"You are an analyst interviewing an expert about the {topic} of {subject}.
Research goal: {description}

Company background:
{background}

Ask one focused question at a time and build on the expert's previous answers.
{termination}"#;

const INTERVIEWER_PHRASE: &str = r#"When you have learned enough, say "{phrase}" to end the interview."#;

const INTERVIEWER_STRUCTURED: &str =
    r#"Set "done" to true when you have learned enough and have no further question."#;

const INTERVIEW_QUERY_SYSTEM: &str = r#"You help an expert answer questions about {subject}.
Turn the interviewer's latest question into at most {max_queries} web search queries."#;

const EXPERT_SYSTEM: &str = r#"You are an expert on the {topic} of {subject}.
Answer the interviewer's question using only the search results below. Cite
the source URL for each fact. Say so plainly when the results do not answer
the question.

Search results:
{results}"#;

const SUMMARY_SYSTEM: &str = r#"You write research reports on the {topic} of {subject}.
Write a report on the findings of the interview below. Include only facts the
expert stated and keep their source URLs.

Research goal: {description}"#;

const SUMMARY_USER: &str = r#"Interview:
{transcript}"#;

const SYNTHESIS_SYSTEM: &str = r#"You are a senior analyst writing the final research report on {subject}.
Combine the branch findings into the requested record. Ground every statement
in the findings. List concrete positive aspects and negative aspects of the
company. A branch marked unavailable produced nothing; do not invent its
content."#;

const SYNTHESIS_USER: &str = r#"Branch findings:

## Background
{background}

## Financial Health
{financial}

## Market Position
{market}"#;

/// Prompt templates for the company research agents
pub struct ResearchPrompts;

impl ResearchPrompts {
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Ground a record in crawled or cached page content
    pub fn grounding(subject: &str, focus: &str, record: &str, content: &str) -> Vec<Message> {
        vec![
            Message::system(
                PromptBuilder::new(GROUNDING_SYSTEM)
                    .with("date", Self::current_date())
                    .with("focus", focus)
                    .with("subject", subject)
                    .with("record", record)
                    .build(),
            ),
            Message::user(PromptBuilder::new(GROUNDING_USER).with("content", content).build()),
        ]
    }

    /// Ask for search queries targeting the missing fields of a record
    pub fn gap_queries(subject: &str, max_queries: usize, record: &str, missing: &[String]) -> Vec<Message> {
        vec![
            Message::system(
                PromptBuilder::new(QUERY_SYSTEM)
                    .with("subject", subject)
                    .with("max_queries", max_queries.to_string())
                    .build(),
            ),
            Message::user(
                PromptBuilder::new(QUERY_USER)
                    .with("record", record)
                    .with("missing", bullet_list(missing))
                    .build(),
            ),
        ]
    }

    /// Merge search evidence into an existing record
    pub fn gap_merge(
        subject: &str,
        record_name: &str,
        current: &str,
        missing: &[String],
        results: &str,
    ) -> Vec<Message> {
        vec![
            Message::system(
                PromptBuilder::new(MERGE_SYSTEM)
                    .with("record", record_name)
                    .with("subject", subject)
                    .build(),
            ),
            Message::user(
                PromptBuilder::new(MERGE_USER)
                    .with("current", current)
                    .with("missing", bullet_list(missing))
                    .with("results", results)
                    .build(),
            ),
        ]
    }

    /// Interviewer persona. `phrase` is the end-of-interview phrase, or `None`
    /// when the interviewer answers with a structured `done` flag.
    pub fn interviewer(
        subject: &str,
        topic: &str,
        description: &str,
        background: &str,
        phrase: Option<&str>,
    ) -> String {
        let termination = match phrase {
            Some(phrase) => PromptBuilder::new(INTERVIEWER_PHRASE).with("phrase", phrase).build(),
            None => INTERVIEWER_STRUCTURED.to_string(),
        };
        PromptBuilder::new(INTERVIEWER_SYSTEM)
            .with("topic", topic)
            .with("subject", subject)
            .with("description", description)
            .with("background", background)
            .with("termination", termination)
            .build()
    }

    /// System prompt for turning the latest question into search queries
    pub fn interview_queries(subject: &str, max_queries: usize) -> String {
        PromptBuilder::new(INTERVIEW_QUERY_SYSTEM)
            .with("subject", subject)
            .with("max_queries", max_queries.to_string())
            .build()
    }

    /// Expert persona, grounded in the rendered search results
    pub fn expert(subject: &str, topic: &str, results: &str) -> String {
        PromptBuilder::new(EXPERT_SYSTEM)
            .with("topic", topic)
            .with("subject", subject)
            .with("results", results)
            .build()
    }

    /// Distill a finished interview into a topic report
    pub fn summary(subject: &str, topic: &str, description: &str, transcript: &str) -> Vec<Message> {
        vec![
            Message::system(
                PromptBuilder::new(SUMMARY_SYSTEM)
                    .with("topic", topic)
                    .with("subject", subject)
                    .with("description", description)
                    .build(),
            ),
            Message::user(PromptBuilder::new(SUMMARY_USER).with("transcript", transcript).build()),
        ]
    }

    /// Combine every branch output into the final report
    pub fn synthesis(subject: &str, background: &str, financial: &str, market: &str) -> Vec<Message> {
        vec![
            Message::system(PromptBuilder::new(SYNTHESIS_SYSTEM).with("subject", subject).build()),
            Message::user(
                PromptBuilder::new(SYNTHESIS_USER)
                    .with("background", background)
                    .with("financial", financial)
                    .with("market", market)
                    .build(),
            ),
        ]
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt builder for dynamic template substitution
pub struct PromptBuilder {
    template: String,
    values: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a new prompt builder with the given template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            values: HashMap::new(),
        }
    }

    /// Substitute a placeholder with a value
    ///
    /// Placeholders are formatted as `{name}`
    pub fn with(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.values.insert(name.to_string(), value.as_ref().to_string());
        self
    }

    /// Build the final prompt string.
    ///
    /// Substitution is one pass over the template: inserted values are never
    /// scanned again, and braces that do not name a known placeholder are
    /// kept verbatim.
    pub fn build(self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after
                .find('}')
                .and_then(|close| self.values.get(&after[..close]).map(|v| (v, close)));
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_grounding_prompt_contains_content() {
        let messages = ResearchPrompts::grounding("Acme", "company background", "CompanyBackground", "Acme makes rockets");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("\"CompanyBackground\" record"));
        assert!(messages[0].content.contains("today's date is"));
        assert!(messages[1].content.starts_with("Source content:"));
        assert!(messages[1].content.contains("Acme makes rockets"));
    }

    #[test]
    fn test_gap_queries_lists_missing_fields() {
        let missing = vec!["industry".to_string(), "founded.at".to_string()];
        let messages = ResearchPrompts::gap_queries("Acme", 3, "{}", &missing);
        assert!(messages[0].content.contains("at most 3"));
        assert!(messages[1].content.contains("- industry\n- founded.at"));
    }

    #[test]
    fn test_interviewer_termination_variants() {
        let phrase = ResearchPrompts::interviewer("Acme", "Financial Health", "goal", "bg", Some("Thanks!"));
        assert!(phrase.contains(r#"say "Thanks!""#));

        let structured = ResearchPrompts::interviewer("Acme", "Financial Health", "goal", "bg", None);
        assert!(structured.contains(r#""done""#));
        assert!(!structured.contains("{termination}"));
    }

    #[test]
    fn test_synthesis_sections() {
        let messages = ResearchPrompts::synthesis("Acme", "bg", "fin", "unavailable");
        assert!(messages[1].content.contains("## Financial Health\nfin"));
        assert!(messages[1].content.contains("## Market Position\nunavailable"));
    }

    #[test]
    fn test_prompt_builder_multiple_same_placeholder() {
        let prompt = PromptBuilder::new("{x} + {x} = {result}")
            .with("x", "2")
            .with("result", "4")
            .build();

        assert_eq!(prompt, "2 + 2 = 4");
    }

    #[test]
    fn test_prompt_builder_leaves_inserted_text_alone() {
        let prompt = PromptBuilder::new("{a} | {b} | {\"json\": 1} | {unset}")
            .with("a", "mentions {b} literally")
            .with("b", "B")
            .build();

        assert_eq!(prompt, "mentions {b} literally | B | {\"json\": 1} | {unset}");
    }

    #[test]
    fn test_synthesis_keeps_placeholder_text_from_sources() {
        let messages = ResearchPrompts::synthesis("Acme", "Our wiki template says {financial}", "fin", "mkt");
        assert!(messages[1].content.contains("Our wiki template says {financial}"));
        assert!(messages[1].content.contains("## Financial Health\nfin"));
    }
}
