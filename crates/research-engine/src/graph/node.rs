//! Node abstraction for workflow graphs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::GraphError;
use super::state::{Patch, WorkflowState};

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work in a workflow graph.
///
/// `writes` declares every field the node's patches may contain. Graph
/// construction uses it to reject concurrent writers of one field, and the
/// runtime rejects patches that stray outside it.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &NodeId;

    fn writes(&self) -> &[String];

    async fn run(&self, state: &WorkflowState) -> Result<Patch, GraphError>;
}

/// Type alias for a shared node
pub type BoxedNode = Arc<dyn Node>;

type Transform = dyn Fn(&WorkflowState) -> Result<Patch, GraphError> + Send + Sync;

/// Node backed by a plain synchronous transform
pub struct FnNode {
    id: NodeId,
    writes: Vec<String>,
    transform: Box<Transform>,
}

impl FnNode {
    pub fn new<F>(id: impl Into<NodeId>, writes: &[&str], transform: F) -> Self
    where
        F: Fn(&WorkflowState) -> Result<Patch, GraphError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            writes: writes.iter().map(|w| w.to_string()).collect(),
            transform: Box::new(transform),
        }
    }
}

#[async_trait]
impl Node for FnNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<Patch, GraphError> {
        (self.transform)(state)
    }
}

impl fmt::Debug for FnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode")
            .field("id", &self.id)
            .field("writes", &self.writes)
            .finish()
    }
}
