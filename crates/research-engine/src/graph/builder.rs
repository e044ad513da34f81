//! WorkflowGraph builder DSL.
//!
//! Provides a fluent API for adding nodes, edges and the entry point, then
//! validates the result: the graph must be acyclic, fully reachable from
//! the entry, and no two nodes that may run concurrently may declare the
//! same written field.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::error::WorkflowBuildError;
use super::node::{BoxedNode, Node, NodeId};

/// Sentinel target for terminal edges.
pub const END: &str = "END";

/// Edge definition for a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Builder for constructing workflow graphs with fluent API.
#[derive(Default)]
pub struct WorkflowGraph {
    name: String,
    nodes: Vec<BoxedNode>,
    edges: Vec<GraphEdge>,
    entry_point: Option<String>,
}

impl WorkflowGraph {
    /// Create a new workflow graph builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workflow name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a node.
    pub fn node(self, node: impl Node + 'static) -> Self {
        self.shared_node(Arc::new(node))
    }

    /// Add a node that is already shared.
    pub fn shared_node(mut self, node: BoxedNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set the entry point node.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry_point = Some(id.into());
        self
    }

    /// Add a direct edge between nodes.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(GraphEdge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Validate and build the workflow graph.
    pub fn build(self) -> Result<BuiltWorkflowGraph, WorkflowBuildError> {
        let entry_point = self.entry_point.ok_or(WorkflowBuildError::NoEntryPoint)?;

        let mut index: HashMap<NodeId, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.id().clone(), i).is_some() {
                return Err(WorkflowBuildError::DuplicateNode(node.id().to_string()));
            }
        }

        let entry = NodeId::new(entry_point);
        if !index.contains_key(&entry) {
            return Err(WorkflowBuildError::UnknownNode(entry.0));
        }

        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut terminal: HashSet<NodeId> = HashSet::new();
        for edge in &self.edges {
            let from = NodeId::new(edge.from.as_str());
            if !index.contains_key(&from) {
                return Err(WorkflowBuildError::UnknownNode(edge.from.clone()));
            }
            if edge.to == END {
                terminal.insert(from);
                continue;
            }
            let to = NodeId::new(edge.to.as_str());
            if !index.contains_key(&to) {
                return Err(WorkflowBuildError::UnknownNode(edge.to.clone()));
            }
            let targets = successors.entry(from).or_default();
            if !targets.contains(&to) {
                targets.push(to);
            }
        }

        let order: Vec<NodeId> = self.nodes.iter().map(|n| n.id().clone()).collect();
        check_acyclic(&order, &successors)?;

        let reachable = descendants(&entry, &successors);
        if let Some(orphan) = order.iter().find(|id| **id != entry && !reachable.contains(*id)) {
            return Err(WorkflowBuildError::Unreachable(orphan.to_string()));
        }

        check_concurrent_writes(&self.nodes, &successors)?;

        Ok(BuiltWorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            successors,
            terminal,
            entry,
        })
    }
}

/// Validated workflow graph, ready to compile.
pub struct BuiltWorkflowGraph {
    pub name: String,
    pub nodes: Vec<BoxedNode>,
    pub successors: HashMap<NodeId, Vec<NodeId>>,
    pub terminal: HashSet<NodeId>,
    pub entry: NodeId,
}

/// Every node reachable from `start`, excluding `start` itself.
fn descendants(start: &NodeId, successors: &HashMap<NodeId, Vec<NodeId>>) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&NodeId> = successors.get(start).map(|s| s.iter().collect()).unwrap_or_default();
    while let Some(id) = stack.pop() {
        if seen.insert(id.clone()) {
            if let Some(next) = successors.get(id) {
                stack.extend(next.iter());
            }
        }
    }
    seen
}

fn check_acyclic(
    order: &[NodeId],
    successors: &HashMap<NodeId, Vec<NodeId>>,
) -> Result<(), WorkflowBuildError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        id: &NodeId,
        successors: &HashMap<NodeId, Vec<NodeId>>,
        marks: &mut HashMap<NodeId, Mark>,
        path: &mut Vec<NodeId>,
    ) -> Result<(), WorkflowBuildError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(NodeId::to_string).collect();
                cycle.push(id.to_string());
                return Err(WorkflowBuildError::Cycle(cycle));
            }
            None => {}
        }

        marks.insert(id.clone(), Mark::Visiting);
        path.push(id.clone());
        for next in successors.get(id).into_iter().flatten() {
            visit(next, successors, marks, path)?;
        }
        path.pop();
        marks.insert(id.clone(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for id in order {
        visit(id, successors, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

/// Reject any field declared by two nodes neither of which precedes the other.
fn check_concurrent_writes(
    nodes: &[BoxedNode],
    successors: &HashMap<NodeId, Vec<NodeId>>,
) -> Result<(), WorkflowBuildError> {
    let reach: Vec<HashSet<NodeId>> = nodes
        .iter()
        .map(|n| descendants(n.id(), successors))
        .collect();

    for (i, a) in nodes.iter().enumerate() {
        for (j, b) in nodes.iter().enumerate().skip(i + 1) {
            let ordered = reach[i].contains(b.id()) || reach[j].contains(a.id());
            if ordered {
                continue;
            }
            if let Some(field) = a.writes().iter().find(|w| b.writes().contains(w)) {
                return Err(WorkflowBuildError::ConflictingWrites {
                    field: field.clone(),
                    first: a.id().to_string(),
                    second: b.id().to_string(),
                });
            }
        }
    }
    Ok(())
}
