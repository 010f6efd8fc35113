//! Graph validation. Run this before scheduling a workflow.
//!
//! Rules enforced, failing on the first violation:
//! 1. Every edge must reference valid node IDs (both `source` and `target`).
//! 2. No edge may connect a node to itself.
//! 3. Node IDs must be unique within the workflow.
//!
//! Cycles longer than one edge are not detected here; the scheduler reports
//! them when the frontier empties early.

use std::collections::HashSet;

use crate::{EngineError, models::Workflow};

/// Check the workflow's structure without touching it.
///
/// # Errors
/// - [`EngineError::DanglingEdge`] if an edge references a missing node.
/// - [`EngineError::SelfLoop`] if an edge's source equals its target.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
pub fn validate_graph(workflow: &Workflow) -> Result<(), EngineError> {
    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        for (node_id, side) in [(&edge.source, "source"), (&edge.target, "target")] {
            if !node_set.contains(node_id.as_str()) {
                return Err(EngineError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                    side,
                });
            }
        }
    }

    if let Some(edge) = workflow.edges.iter().find(|e| e.source == e.target) {
        return Err(EngineError::SelfLoop {
            edge_id: edge.id.clone(),
            node_id: edge.source.clone(),
        });
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    Ok(())
}
