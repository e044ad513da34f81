//! Compiled workflow and its scheduler
//!
//! A node becomes ready once every predecessor has finished and had its
//! patch merged. Ready nodes run as tokio tasks, bounded by a semaphore;
//! all nodes released by one completion see the same state snapshot.
//! Patches are merged only on the scheduler task, so the state has a single
//! writer for the whole invocation.
//!
//! A panicking node is an ordinary node failure and goes through the error
//! policy. Tasks still in flight when `invoke` returns early are aborted.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::builder::BuiltWorkflowGraph;
use super::config::{ErrorPolicy, GraphConfig};
use super::error::GraphError;
use super::node::{BoxedNode, NodeId};
use super::state::{Patch, WorkflowState};

/// Result of a workflow invocation
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    /// Final workflow state
    pub state: WorkflowState,
    /// Nodes whose patches were merged, in completion order
    pub completed: Vec<NodeId>,
    /// Nodes that failed and were recorded under `ErrorPolicy::Record`
    pub failed: Vec<NodeId>,
}

/// A validated graph bound to a runtime configuration.
///
/// Compile once, then `invoke` any number of times, concurrently if needed:
/// each invocation owns its own state.
pub struct CompiledWorkflow {
    name: String,
    nodes: HashMap<NodeId, BoxedNode>,
    order: Vec<NodeId>,
    successors: HashMap<NodeId, Vec<NodeId>>,
    in_degree: HashMap<NodeId, usize>,
    terminal: Vec<NodeId>,
    entry: NodeId,
    config: GraphConfig,
}

type NodeOutcome = (NodeId, Result<Patch, GraphError>);

impl CompiledWorkflow {
    pub fn compile(graph: BuiltWorkflowGraph, config: GraphConfig) -> Self {
        let order: Vec<NodeId> = graph.nodes.iter().map(|n| n.id().clone()).collect();

        let mut in_degree: HashMap<NodeId, usize> = order.iter().map(|id| (id.clone(), 0)).collect();
        for targets in graph.successors.values() {
            for target in targets {
                *in_degree.entry(target.clone()).or_default() += 1;
            }
        }

        let terminal = order
            .iter()
            .filter(|id| graph.terminal.contains(*id))
            .cloned()
            .collect();

        Self {
            name: graph.name,
            nodes: graph
                .nodes
                .into_iter()
                .map(|n| (n.id().clone(), n))
                .collect(),
            order,
            successors: graph.successors,
            in_degree,
            terminal,
            entry: graph.entry,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Drive `initial` through the graph to completion.
    pub async fn invoke(&self, initial: WorkflowState) -> Result<WorkflowResult, GraphError> {
        info!(workflow = %self.name, nodes = self.nodes.len(), "Workflow invocation started");

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut state = initial;
        let mut pending = self.in_degree.clone();
        let mut running: JoinSet<NodeOutcome> = JoinSet::new();
        let mut completed = Vec::new();
        let mut failed = Vec::new();

        let snapshot = Arc::new(state.clone());
        self.spawn(&mut running, &self.entry, snapshot, &semaphore);

        while let Some(joined) = running.join_next().await {
            // Node tasks catch their own panics, so only cancellation lands here
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    running.abort_all();
                    return Err(GraphError::Join {
                        node: NodeId::new(self.name.as_str()),
                        message: e.to_string(),
                    });
                }
            };

            match outcome.and_then(|patch| self.check_writes(&id, patch)) {
                Ok(patch) => {
                    debug!(node = %id, fields = ?patch.keys().collect::<Vec<_>>(), "Merging patch");
                    state.merge(id.as_str(), patch);
                    completed.push(id.clone());
                }
                Err(e) => match self.config.error_policy {
                    ErrorPolicy::Abort => {
                        warn!(node = %id, error = %e, "Node failed, aborting workflow");
                        running.abort_all();
                        return Err(e);
                    }
                    ErrorPolicy::Record => {
                        warn!(node = %id, error = %e, "Node failed, continuing without its patch");
                        state.record_error(id.as_str(), &e);
                        failed.push(id.clone());
                    }
                },
            }

            let released: Vec<&NodeId> = self
                .successors
                .get(&id)
                .into_iter()
                .flatten()
                .filter(|next| {
                    let remaining = pending.entry((*next).clone()).or_default();
                    *remaining = remaining.saturating_sub(1);
                    *remaining == 0
                })
                .collect();

            if !released.is_empty() {
                let snapshot = Arc::new(state.clone());
                for next in released {
                    self.spawn(&mut running, next, Arc::clone(&snapshot), &semaphore);
                }
            }
        }

        info!(
            workflow = %self.name,
            completed = completed.len(),
            failed = failed.len(),
            "Workflow invocation finished"
        );

        Ok(WorkflowResult {
            state,
            completed,
            failed,
        })
    }

    fn spawn(
        &self,
        running: &mut JoinSet<NodeOutcome>,
        id: &NodeId,
        state: Arc<WorkflowState>,
        semaphore: &Arc<Semaphore>,
    ) {
        let id = id.clone();
        let node = self.nodes.get(&id).cloned();
        let semaphore = Arc::clone(semaphore);

        running.spawn(async move {
            let Some(node) = node else {
                let err = GraphError::node_failed(id.clone(), "node not registered");
                return (id, Err(err));
            };
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (id.clone(), Err(GraphError::node_failed(id, e.to_string()))),
            };
            debug!(node = %id, "Node started");
            let result = AssertUnwindSafe(node.run(&state))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(GraphError::Join {
                        node: id.clone(),
                        message: format!("node panicked: {}", panic_message(panic.as_ref())),
                    })
                });
            (id, result)
        });
    }

    fn check_writes(&self, id: &NodeId, patch: Patch) -> Result<Patch, GraphError> {
        let declared = self.nodes.get(id).map(|n| n.writes()).unwrap_or_default();
        if let Some(field) = patch.keys().find(|k| !declared.iter().any(|d| d.as_str() == *k)) {
            return Err(GraphError::UndeclaredWrite {
                node: id.clone(),
                field: field.to_string(),
            });
        }
        Ok(patch)
    }

    /// Mermaid flowchart of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        out.push_str(&format!("    START([START]) --> {}\n", self.entry));
        for id in &self.order {
            for next in self.successors.get(id).into_iter().flatten() {
                out.push_str(&format!("    {} --> {}\n", id, next));
            }
        }
        for id in &self.terminal {
            out.push_str(&format!("    {} --> END([END])\n", id));
        }
        out
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl std::fmt::Debug for CompiledWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledWorkflow")
            .field("name", &self.name)
            .field("nodes", &self.order)
            .field("entry", &self.entry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FnNode, Node, WorkflowGraph, END};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Sleeps, then writes `value` to `field` and records what it saw
    struct SleepyNode {
        id: NodeId,
        writes: Vec<String>,
        delay: Duration,
    }

    impl SleepyNode {
        fn new(id: &str, delay_ms: u64) -> Self {
            Self {
                id: id.into(),
                writes: vec![id.to_string()],
                delay: Duration::from_millis(delay_ms),
            }
        }
    }

    #[async_trait]
    impl Node for SleepyNode {
        fn id(&self) -> &NodeId {
            &self.id
        }

        fn writes(&self) -> &[String] {
            &self.writes
        }

        async fn run(&self, _state: &WorkflowState) -> Result<Patch, GraphError> {
            tokio::time::sleep(self.delay).await;
            Ok(Patch::empty().set(self.id.as_str(), format!("{} done", self.id)))
        }
    }

    fn join_node() -> FnNode {
        FnNode::new("join", &["joined"], |state| {
            let x = state.get_str("x").unwrap_or("missing");
            let y = state.get_str("y").unwrap_or("missing");
            Ok(Patch::empty().set("joined", format!("{x} + {y}")))
        })
    }

    fn diamond(x_ms: u64, y_ms: u64) -> CompiledWorkflow {
        let built = WorkflowGraph::new()
            .name("diamond")
            .node(FnNode::new("start", &["seed"], |_| Ok(Patch::empty().set("seed", 1))))
            .node(SleepyNode::new("x", x_ms))
            .node(SleepyNode::new("y", y_ms))
            .node(join_node())
            .entry("start")
            .edge("start", "x")
            .edge("start", "y")
            .edge("x", "join")
            .edge("y", "join")
            .edge("join", END)
            .build()
            .unwrap();
        CompiledWorkflow::compile(built, GraphConfig::new().with_parallelism(4))
    }

    #[tokio::test]
    async fn test_fan_in_sees_both_branches_in_either_order() {
        for (x_ms, y_ms) in [(5, 40), (40, 5)] {
            let result = diamond(x_ms, y_ms).invoke(WorkflowState::new()).await.unwrap();

            assert_eq!(result.state.get_str("joined"), Some("x done + y done"));
            assert_eq!(result.completed.last().map(NodeId::as_str), Some("join"));
            assert_eq!(result.state.current_node(), Some("join"));
            assert!(result.failed.is_empty());
        }
    }

    /// Waits at a barrier shared with its sibling, so it only finishes when
    /// both run at the same time
    struct RendezvousNode {
        id: NodeId,
        writes: Vec<String>,
        barrier: Arc<Barrier>,
    }

    #[async_trait]
    impl Node for RendezvousNode {
        fn id(&self) -> &NodeId {
            &self.id
        }

        fn writes(&self) -> &[String] {
            &self.writes
        }

        async fn run(&self, _state: &WorkflowState) -> Result<Patch, GraphError> {
            tokio::time::timeout(Duration::from_secs(5), self.barrier.wait())
                .await
                .map_err(|_| GraphError::node_failed(self.id.clone(), "sibling never arrived"))?;
            Ok(Patch::empty().set(self.id.as_str(), true))
        }
    }

    #[tokio::test]
    async fn test_fan_out_branches_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let branch = |id: &str| RendezvousNode {
            id: id.into(),
            writes: vec![id.to_string()],
            barrier: Arc::clone(&barrier),
        };
        let built = WorkflowGraph::new()
            .node(FnNode::new("start", &[], |_| Ok(Patch::empty())))
            .node(branch("x"))
            .node(branch("y"))
            .entry("start")
            .edge("start", "x")
            .edge("start", "y")
            .build()
            .unwrap();
        let workflow = CompiledWorkflow::compile(
            built,
            GraphConfig::new()
                .with_parallelism(2)
                .with_error_policy(ErrorPolicy::Abort),
        );

        let result = workflow.invoke(WorkflowState::new()).await.unwrap();
        assert_eq!(result.state.get("x"), Some(&json!(true)));
        assert_eq!(result.state.get("y"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_linear_successor_sees_merged_patch() {
        let built = WorkflowGraph::new()
            .node(FnNode::new("first", &["n"], |_| Ok(Patch::empty().set("n", 1))))
            .node(FnNode::new("second", &["m"], |state| {
                let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(Patch::empty().set("m", n + 1))
            }))
            .entry("first")
            .edge("first", "second")
            .build()
            .unwrap();
        let workflow = CompiledWorkflow::compile(built, GraphConfig::default());

        let result = workflow.invoke(WorkflowState::new()).await.unwrap();
        assert_eq!(result.state.get("m"), Some(&json!(2)));
        assert_eq!(
            result.completed,
            vec![NodeId::from("first"), NodeId::from("second")]
        );
    }

    fn failing_branch_graph(policy: ErrorPolicy) -> CompiledWorkflow {
        let built = WorkflowGraph::new()
            .node(FnNode::new("start", &[], |_| Ok(Patch::empty())))
            .node(FnNode::new("x", &["x"], |_| {
                Err(GraphError::node_failed("x", "upstream exploded"))
            }))
            .node(SleepyNode::new("y", 1))
            .node(join_node())
            .entry("start")
            .edge("start", "x")
            .edge("start", "y")
            .edge("x", "join")
            .edge("y", "join")
            .build()
            .unwrap();
        CompiledWorkflow::compile(built, GraphConfig::new().with_error_policy(policy))
    }

    #[tokio::test]
    async fn test_failed_branch_is_recorded_and_join_still_runs() {
        let result = failing_branch_graph(ErrorPolicy::Record)
            .invoke(WorkflowState::new())
            .await
            .unwrap();

        assert_eq!(result.state.get_str("joined"), Some("missing + y done"));
        assert_eq!(result.failed, vec![NodeId::from("x")]);
        assert_eq!(result.state.errors(), ["x: node x failed: upstream exploded"]);
    }

    #[tokio::test]
    async fn test_abort_policy_returns_error() {
        let err = failing_branch_graph(ErrorPolicy::Abort)
            .invoke(WorkflowState::new())
            .await
            .unwrap_err();
        assert_eq!(err.node().as_str(), "x");
    }

    /// Sets `flag` once its sleep finishes
    struct SlowFlagNode {
        id: NodeId,
        writes: Vec<String>,
        flag: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Node for SlowFlagNode {
        fn id(&self) -> &NodeId {
            &self.id
        }

        fn writes(&self) -> &[String] {
            &self.writes
        }

        async fn run(&self, _state: &WorkflowState) -> Result<Patch, GraphError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.flag.store(true, Ordering::SeqCst);
            Ok(Patch::empty().set(self.id.as_str(), "y done"))
        }
    }

    fn panicking_branch_graph(policy: ErrorPolicy, flag: Arc<AtomicBool>) -> CompiledWorkflow {
        let built = WorkflowGraph::new()
            .node(FnNode::new("start", &[], |_| Ok(Patch::empty())))
            .node(FnNode::new("x", &["x"], |_| panic!("boom")))
            .node(SlowFlagNode {
                id: "y".into(),
                writes: vec!["y".to_string()],
                flag,
            })
            .node(join_node())
            .entry("start")
            .edge("start", "x")
            .edge("start", "y")
            .edge("x", "join")
            .edge("y", "join")
            .build()
            .unwrap();
        CompiledWorkflow::compile(
            built,
            GraphConfig::new().with_parallelism(4).with_error_policy(policy),
        )
    }

    #[tokio::test]
    async fn test_panicking_branch_is_recorded_and_join_still_runs() {
        let flag = Arc::new(AtomicBool::new(false));
        let result = panicking_branch_graph(ErrorPolicy::Record, Arc::clone(&flag))
            .invoke(WorkflowState::new())
            .await
            .unwrap();

        assert_eq!(result.state.get_str("joined"), Some("missing + y done"));
        assert_eq!(result.failed, vec![NodeId::from("x")]);
        assert!(result.state.errors()[0].starts_with("x: "));
        assert!(result.state.errors()[0].contains("boom"));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_abort_cancels_branches_still_running() {
        let flag = Arc::new(AtomicBool::new(false));
        let err = panicking_branch_graph(ErrorPolicy::Abort, Arc::clone(&flag))
            .invoke(WorkflowState::new())
            .await
            .unwrap_err();

        assert_eq!(err.node().as_str(), "x");
        assert!(err.to_string().contains("boom"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_undeclared_write_fails_node() {
        let built = WorkflowGraph::new()
            .node(FnNode::new("sneaky", &["allowed"], |_| {
                Ok(Patch::empty().set("allowed", 1).set("forbidden", 2))
            }))
            .entry("sneaky")
            .build()
            .unwrap();
        let workflow = CompiledWorkflow::compile(built, GraphConfig::default());

        let result = workflow.invoke(WorkflowState::new()).await.unwrap();
        assert!(!result.state.contains("allowed"));
        assert!(result.state.errors()[0].contains("undeclared field 'forbidden'"));
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_isolated() {
        let built = WorkflowGraph::new()
            .node(FnNode::new("echo", &["echo"], |state| {
                let name = state.get_str("name").unwrap_or_default().to_string();
                Ok(Patch::empty().set("echo", name))
            }))
            .entry("echo")
            .build()
            .unwrap();
        let workflow = Arc::new(CompiledWorkflow::compile(built, GraphConfig::default()));

        let runs = ["acme", "globex", "initech"].map(|name| {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                workflow
                    .invoke(WorkflowState::new().with_field("name", name))
                    .await
            })
        });

        for (handle, name) in futures::future::join_all(runs)
            .await
            .into_iter()
            .zip(["acme", "globex", "initech"])
        {
            let result = handle.unwrap().unwrap();
            assert_eq!(result.state.get_str("echo"), Some(name));
        }
    }

    #[test]
    fn test_mermaid_lists_edges() {
        let mermaid = diamond(1, 1).to_mermaid();
        assert!(mermaid.starts_with("graph TD\n    START([START]) --> start\n"));
        assert!(mermaid.contains("    start --> x\n"));
        assert!(mermaid.contains("    y --> join\n"));
        assert!(mermaid.contains("    join --> END([END])\n"));
    }
}
