//! Workflow graph: DAG construction and execution
//!
//! Nodes read a shared [`WorkflowState`] and return [`Patch`]es. A graph is
//! built and validated with [`WorkflowGraph`], compiled once into a
//! [`CompiledWorkflow`], then invoked per request with fresh state.
//!
//! ```rust,ignore
//! let built = WorkflowGraph::new()
//!     .name("research")
//!     .node(background)
//!     .node(financial)
//!     .node(market)
//!     .node(synthesis)
//!     .entry("background")
//!     .edge("background", "financial_health")
//!     .edge("background", "market_position")
//!     .edge("financial_health", "synthesis")
//!     .edge("market_position", "synthesis")
//!     .edge("synthesis", END)
//!     .build()?;
//! let workflow = CompiledWorkflow::compile(built, GraphConfig::default());
//! let result = workflow.invoke(WorkflowState::new().with_field("company_name", "Acme")).await?;
//! ```

mod builder;
mod compiled;
mod config;
mod error;
mod node;
mod state;

pub use builder::{BuiltWorkflowGraph, GraphEdge, WorkflowGraph, END};
pub use compiled::{CompiledWorkflow, WorkflowResult};
pub use config::{ErrorPolicy, GraphConfig};
pub use error::{GraphError, WorkflowBuildError};
pub use node::{BoxedNode, FnNode, Node, NodeId};
pub use state::{Patch, WorkflowState};
