//! Node processor: resolves a definition into a `NodeKind` and runs it.

use nodes::{ExecutableNode, ExecutionContext, NodeInputs, NodeKind};
use store::LogLevel;
use tracing::debug;

use crate::{EngineError, models::NodeDefinition};

/// Runs individual nodes on behalf of one execution.
pub struct NodeProcessor {
    ctx: ExecutionContext,
}

impl NodeProcessor {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Process one node and return its output.
    ///
    /// # Errors
    /// [`EngineError::NodeExecution`] carrying the node id.
    pub async fn process(&self, node: &NodeDefinition, inputs: NodeInputs) -> Result<String, EngineError> {
        let label = node.label.as_deref().unwrap_or("Unknown");
        self.ctx
            .log(
                Some(&node.id),
                LogLevel::Info,
                &format!("Executing Node: {label} (Type: {})", node.node_type),
            )
            .await;

        let kind = NodeKind::from_definition(&node.node_type, &node.config);
        debug!(node_id = %node.id, kind = kind.tag(), inputs = inputs.len(), "dispatching node");

        kind.execute(&node.id, &inputs, &self.ctx)
            .await
            .map_err(|source| EngineError::NodeExecution {
                node_id: node.id.clone(),
                source,
            })
    }
}
