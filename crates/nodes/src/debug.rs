//! `debug`: echoes its inputs, for exercising the engine without a model.

use async_trait::async_trait;
use serde_json::Value;

use crate::{ExecutableNode, ExecutionContext, NodeError, NodeInputs};

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugNode;

impl DebugNode {
    /// `Debug Echo: {"<id>":"<output>",...}` with ids in sorted order.
    pub fn render(inputs: &NodeInputs) -> String {
        let map: serde_json::Map<String, Value> = inputs
            .iter()
            .map(|(id, output)| (id.clone(), Value::String(output.clone())))
            .collect();
        format!("Debug Echo: {}", Value::Object(map))
    }
}

#[async_trait]
impl ExecutableNode for DebugNode {
    async fn execute(
        &self,
        _node_id: &str,
        inputs: &NodeInputs,
        _ctx: &ExecutionContext,
    ) -> Result<String, NodeError> {
        Ok(Self::render(inputs))
    }
}
