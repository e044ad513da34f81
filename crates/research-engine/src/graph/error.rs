//! Error types for graph construction and execution

use thiserror::Error;

use super::node::NodeId;

/// Errors that can occur while building a workflow graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowBuildError {
    #[error("workflow entry point not set")]
    NoEntryPoint,
    #[error("unknown node id: {0}")]
    UnknownNode(String),
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("workflow contains a cycle through: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("node {0} is not reachable from the entry point")]
    Unreachable(String),
    /// Two nodes that may run concurrently both declare the same field.
    #[error("nodes {first} and {second} may run concurrently but both write '{field}'")]
    ConflictingWrites {
        field: String,
        first: String,
        second: String,
    },
}

/// Errors raised while invoking a compiled workflow
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node's computation failed
    #[error("node {node} failed: {message}")]
    NodeFailed {
        node: NodeId,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A node returned a patch touching a field it did not declare
    #[error("node {node} wrote undeclared field '{field}'")]
    UndeclaredWrite { node: NodeId, field: String },

    /// A spawned node task panicked or was cancelled
    #[error("task join error in {node}: {message}")]
    Join { node: NodeId, message: String },
}

impl GraphError {
    /// Create a node failure with a message
    pub fn node_failed(node: impl Into<NodeId>, message: impl Into<String>) -> Self {
        Self::NodeFailed {
            node: node.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a node failure wrapping the underlying error
    pub fn node_failed_with_source(
        node: impl Into<NodeId>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::NodeFailed {
            node: node.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Node the error belongs to
    pub fn node(&self) -> &NodeId {
        match self {
            GraphError::NodeFailed { node, .. }
            | GraphError::UndeclaredWrite { node, .. }
            | GraphError::Join { node, .. } => node,
        }
    }

    /// Underlying error of a node failure, if it is of type `E`
    pub fn source_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            GraphError::NodeFailed {
                source: Some(source),
                ..
            } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}
