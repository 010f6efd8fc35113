//! Engine-level error types.

use std::time::Duration;

use nodes::NodeError;
use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
///
/// Every variant ends a run in `FAILED`; the coordinator turns them into
/// log entries rather than returning them to a caller.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Structural errors ------

    /// An edge references a node id that doesn't exist in the workflow.
    #[error("edge '{edge_id}' references unknown node '{node_id}' ({side} side)")]
    DanglingEdge {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },

    /// An edge connects a node to itself.
    #[error("self-loop detected on node '{node_id}' (edge '{edge_id}')")]
    SelfLoop { edge_id: String, node_id: String },

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// The frontier emptied before every node ran: a cycle, or nodes that
    /// no zero-in-degree node reaches.
    #[error("cycle detected or unreachable nodes: processed {processed} of {total}")]
    Unschedulable { processed: usize, total: usize },

    // ------ Execution errors ------

    /// A node failed; the whole execution is aborted.
    #[error("node '{node_id}' failed: {source}")]
    NodeExecution {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution exceeded its {0:?} budget")]
    TimedOut(Duration),

    /// A panic caught at the run boundary.
    #[error("unexpected fault: {0}")]
    Fault(String),

    // ------ Boundary errors ------

    /// The stored definition does not deserialise into a graph.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}

impl EngineError {
    /// Coarse class used in log fields: `structural`, `node`,
    /// `cancellation`, `fault`, `definition` or `store`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::DanglingEdge { .. }
            | Self::SelfLoop { .. }
            | Self::DuplicateNodeId(_)
            | Self::Unschedulable { .. } => "structural",
            Self::NodeExecution { .. } => "node",
            Self::Cancelled | Self::TimedOut(_) => "cancellation",
            Self::Fault(_) => "fault",
            Self::InvalidDefinition(_) => "definition",
            Self::Store(_) => "store",
        }
    }

    /// Errors the validator raises before any node runs.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DanglingEdge { .. } | Self::SelfLoop { .. } | Self::DuplicateNodeId(_)
        )
    }
}
