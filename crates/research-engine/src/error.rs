//! Error types
//!
//! `AgentError` is the taxonomy shared by both ports and both agent kinds.
//! `ResearchError` is what a caller of the orchestrator sees.

use thiserror::Error;

use crate::graph::{GraphError, WorkflowBuildError};

/// Errors raised by agents and by the ports they call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Grounding had nothing to ground. Fatal for the owning agent.
    #[error("no content available to ground record '{record}'")]
    NoContent { record: String },

    /// No search query produced any result, so an answer would be ungrounded.
    #[error("search returned no results for queries {queries:?}")]
    EmptySearchResults { queries: Vec<String> },

    /// Network or API failure in a port.
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// Structured model output failed to conform to the requested shape.
    #[error("output does not match shape '{shape}': {reason}")]
    ShapeMismatch { shape: String, reason: String },
}

impl AgentError {
    /// Create a no-content error for a record
    pub fn no_content(record: impl Into<String>) -> Self {
        Self::NoContent {
            record: record.into(),
        }
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(shape: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            shape: shape.into(),
            reason: reason.into(),
        }
    }

    /// Provider failures are the only errors a caller may fall back from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::Provider { .. })
    }
}

/// Top-level error for a research run
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("invalid research request: {0}")]
    InvalidRequest(String),

    #[error("workflow build error: {0}")]
    Build(#[from] WorkflowBuildError),

    #[error("workflow error: {0}")]
    Graph(#[from] GraphError),

    /// The run finished without producing a report.
    #[error("research produced no report ({} recorded errors)", .errors.len())]
    NoReport { errors: Vec<String> },
}
