//! The `ExecutableNode` trait: the contract every node kind must fulfil.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use store::{ExecutionStore, LogLevel};
use tracing::warn;
use uuid::Uuid;

use crate::{AgentFactory, NodeError};

/// Outputs of a node's direct predecessors, keyed by predecessor node id.
///
/// A `BTreeMap` so every consumer sees the ids in lexicographic order no
/// matter which predecessor finished first.
pub type NodeInputs = BTreeMap<String, String>;

/// Shared context passed to every node during one execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: Uuid,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// Sink for the execution's log trail.
    pub store: Arc<dyn ExecutionStore>,
    /// Creates language-model agents scoped to this execution.
    pub agents: Arc<dyn AgentFactory>,
}

impl ExecutionContext {
    /// Append an entry to the execution's log trail.
    ///
    /// Fire-and-forget: a failed write is reported through `tracing` and
    /// never affects the run.
    pub async fn log(&self, node_id: Option<&str>, level: LogLevel, message: &str) {
        if let Err(e) = self
            .store
            .append_log(self.execution_id, node_id, level, message)
            .await
        {
            warn!(
                execution_id = %self.execution_id,
                node_id = node_id.unwrap_or("SYSTEM"),
                error = %e,
                "failed to record execution log: {message}"
            );
        }
    }
}

/// The core node trait.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node with its predecessors' outputs and return this
    /// node's single textual output.
    async fn execute(
        &self,
        node_id: &str,
        inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<String, NodeError>;
}
