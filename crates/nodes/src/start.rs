//! `start`: entry marker of a workflow.

use async_trait::async_trait;

use crate::{ExecutableNode, ExecutionContext, NodeError, NodeInputs};

/// Output of every `start` node.
pub const START_MARKER: &str = "Workflow Started";

#[derive(Debug, Clone, Copy, Default)]
pub struct StartNode;

#[async_trait]
impl ExecutableNode for StartNode {
    async fn execute(
        &self,
        _node_id: &str,
        _inputs: &NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<String, NodeError> {
        Ok(START_MARKER.to_owned())
    }
}
