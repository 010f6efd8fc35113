//! Topology scheduler (Kahn's algorithm).
//!
//! Nodes are released one at a time from a FIFO frontier seeded in node
//! declaration order, so the same graph always runs in the same order.
//! Each node sees the outputs of its already-computed parents.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;

use nodes::NodeInputs;
use serde_json::{Map, Value};

use crate::{EngineError, RunSignal, models::{NodeDefinition, Workflow}};

/// What a run of the graph would look like, computed without executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Node ids in the order they would be processed.
    pub order: Vec<String>,
    /// Nodes the frontier never reaches (cycle members and their
    /// descendants), in declaration order.
    pub blocked: Vec<String>,
}

impl Plan {
    pub fn is_complete(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// Result of a run in which every node was processed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Node id → output.
    pub outputs: HashMap<String, String>,
    /// Processing order.
    pub order: Vec<String>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.order.len()
    }

    /// The output table as a JSON object.
    pub fn output_json(&self) -> Value {
        let map: Map<String, Value> = self
            .outputs
            .iter()
            .map(|(id, out)| (id.clone(), Value::String(out.clone())))
            .collect();
        Value::Object(map)
    }
}

pub struct Scheduler<'w> {
    workflow: &'w Workflow,
    nodes: HashMap<&'w str, &'w NodeDefinition>,
    /// source → targets, in edge order.
    adjacency: HashMap<&'w str, Vec<&'w str>>,
    /// target → sources, in edge order.
    parents: HashMap<&'w str, Vec<&'w str>>,
    in_degree: HashMap<&'w str, usize>,
}

impl<'w> Scheduler<'w> {
    /// Index the graph.  Expects a workflow that passed `validate_graph`.
    pub fn new(workflow: &'w Workflow) -> Self {
        let mut nodes = HashMap::with_capacity(workflow.nodes.len());
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();

        for node in &workflow.nodes {
            nodes.insert(node.id.as_str(), node);
            in_degree.entry(node.id.as_str()).or_insert(0);
        }

        for edge in &workflow.edges {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
            parents
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.as_str());
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
        }

        Self { workflow, nodes, adjacency, parents, in_degree }
    }

    fn seed(&self) -> VecDeque<&'w str> {
        self.workflow
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| self.in_degree.get(id).copied() == Some(0))
            .collect()
    }

    /// Release `node_id`'s children whose in-degree drops to zero.
    fn release(&self, node_id: &str, in_degree: &mut HashMap<&'w str, usize>, frontier: &mut VecDeque<&'w str>) {
        let Some(children) = self.adjacency.get(node_id) else {
            return;
        };
        for &child in children {
            if let Some(deg) = in_degree.get_mut(child) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 && self.nodes.contains_key(child) {
                    frontier.push_back(child);
                }
            }
        }
    }

    /// Compute the processing order without running anything.
    pub fn plan(&self) -> Plan {
        let mut in_degree = self.in_degree.clone();
        let mut frontier = self.seed();
        let mut order = Vec::with_capacity(self.workflow.nodes.len());

        while let Some(node_id) = frontier.pop_front() {
            order.push(node_id.to_owned());
            self.release(node_id, &mut in_degree, &mut frontier);
        }

        let scheduled: HashSet<&str> = order.iter().map(String::as_str).collect();
        let blocked = self
            .workflow
            .nodes
            .iter()
            .filter(|n| !scheduled.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();

        Plan { order, blocked }
    }

    /// Drive the graph to completion, calling `process` for every node.
    ///
    /// `signal` is checked before each pop, bounds the node in flight, and
    /// is checked once more after the frontier drains.  The first failing
    /// node stops the run and its error is returned unchanged.
    ///
    /// # Errors
    /// The node's error, the signal's error, or
    /// [`EngineError::Unschedulable`] if nodes were left unprocessed.
    pub async fn run<F, Fut>(&self, signal: &RunSignal, mut process: F) -> Result<RunSummary, EngineError>
    where
        F: FnMut(&'w NodeDefinition, NodeInputs) -> Fut,
        Fut: Future<Output = Result<String, EngineError>>,
    {
        let mut in_degree = self.in_degree.clone();
        let mut frontier = self.seed();
        let mut summary = RunSummary::default();

        loop {
            signal.check()?;
            let Some(node_id) = frontier.pop_front() else {
                break;
            };
            let Some(&node) = self.nodes.get(node_id) else {
                continue;
            };

            let inputs: NodeInputs = self
                .parents
                .get(node_id)
                .into_iter()
                .flatten()
                .filter_map(|&p| summary.outputs.get(p).map(|out| (p.to_owned(), out.clone())))
                .collect();

            let output = signal.guard(process(node, inputs)).await??;
            summary.outputs.insert(node_id.to_owned(), output);
            summary.order.push(node_id.to_owned());
            self.release(node_id, &mut in_degree, &mut frontier);
        }

        let total = self.workflow.nodes.len();
        if summary.processed() < total {
            return Err(EngineError::Unschedulable {
                processed: summary.processed(),
                total,
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::models::Edge;

    fn workflow(ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        Workflow::new(
            "sched",
            ids.iter().map(|id| NodeDefinition::new(*id, "debug")).collect(),
            edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
        )
    }

    #[test]
    fn plan_follows_declaration_order_for_roots() {
        let wf = workflow(&["c", "a", "b"], &[]);
        let plan = Scheduler::new(&wf).plan();
        assert_eq!(plan.order, vec!["c", "a", "b"]);
        assert!(plan.is_complete());
    }

    #[test]
    fn plan_of_diamond_is_fifo() {
        let wf = workflow(&["a", "c", "b", "d"], &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert_eq!(Scheduler::new(&wf).plan().order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn plan_reports_blocked_nodes_of_a_cycle() {
        let wf = workflow(&["root", "x", "y", "tail"], &[("x", "y"), ("y", "x"), ("y", "tail")]);
        let plan = Scheduler::new(&wf).plan();
        assert_eq!(plan.order, vec!["root"]);
        assert_eq!(plan.blocked, vec!["x", "y", "tail"]);
    }

    #[tokio::test]
    async fn run_passes_parent_outputs() {
        let wf = workflow(&["a", "b", "c"], &[("a", "c"), ("b", "c")]);
        let mut seen = Vec::new();
        let summary = Scheduler::new(&wf)
            .run(&RunSignal::unbounded(), |node, inputs| {
                seen.push((node.id.clone(), inputs.clone()));
                let out = format!("{}:{}", node.id, inputs.len());
                async move { Ok(out) }
            })
            .await
            .unwrap();

        assert_eq!(summary.order, vec!["a", "b", "c"]);
        assert_eq!(summary.outputs["c"], "c:2");
        let (_, c_inputs) = &seen[2];
        assert_eq!(c_inputs.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(c_inputs["a"], "a:0");
        assert_eq!(summary.output_json()["b"], "b:0");
    }

    #[tokio::test]
    async fn run_stops_on_first_failure() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let mut calls = 0;
        let err = Scheduler::new(&wf)
            .run(&RunSignal::unbounded(), |node, _| {
                calls += 1;
                let fail = node.id == "b";
                async move {
                    if fail {
                        Err(EngineError::Fault("boom".into()))
                    } else {
                        Ok(String::new())
                    }
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fault(_)));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn run_on_cycle_is_unschedulable() {
        let wf = workflow(&["a", "b", "c"], &[("b", "c"), ("c", "b")]);
        let err = Scheduler::new(&wf)
            .run(&RunSignal::unbounded(), |_, _| async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unschedulable { processed: 1, total: 3 }));
    }

    #[tokio::test]
    async fn cancelled_signal_processes_nothing() {
        let wf = workflow(&["a"], &[]);
        let token = CancellationToken::new();
        token.cancel();
        let signal = RunSignal::new(token, Duration::from_secs(60));
        let err = Scheduler::new(&wf)
            .run(&signal, |_, _| async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn plan_of_long_chain_blocks_nothing() {
        let ids: Vec<String> = (0..500).map(|i| format!("n{i:03}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let edges: Vec<(&str, &str)> = refs.windows(2).map(|w| (w[0], w[1])).collect();
        let wf = workflow(&refs, &edges);
        let plan = Scheduler::new(&wf).plan();
        assert_eq!(plan.order, ids);
        assert!(plan.blocked.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_node_is_cut_off_at_the_deadline() {
        let wf = workflow(&["stuck", "after"], &[("stuck", "after")]);
        let signal = RunSignal::new(CancellationToken::new(), Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let mut calls = 0;
        let err = Scheduler::new(&wf)
            .run(&signal, |_, _| {
                calls += 1;
                async {
                    std::future::pending::<()>().await;
                    Ok(String::new())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_last_node_is_not_a_success() {
        let wf = workflow(&["only"], &[]);
        let signal = RunSignal::new(CancellationToken::new(), Duration::from_secs(1));
        let err = Scheduler::new(&wf)
            .run(&signal, |_, _| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(String::new())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TimedOut(_)));
    }
}
