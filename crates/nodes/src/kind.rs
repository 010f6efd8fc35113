//! The closed set of node kinds.
//!
//! A node's type tag is resolved once into a [`NodeKind`]; adding a kind
//! means adding a variant here and a match arm below.

use async_trait::async_trait;
use serde_json::Value;

use crate::debug::DebugNode;
use crate::llm::LlmNode;
use crate::start::StartNode;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeInputs};

#[derive(Debug, Clone)]
pub enum NodeKind {
    Start(StartNode),
    Debug(DebugNode),
    Llm(LlmNode),
    /// Unrecognised type tag.  Succeeds with an empty output.
    NoOp,
}

impl NodeKind {
    /// Resolve a type tag and configuration payload into a kind.
    pub fn from_definition(node_type: &str, config: &Value) -> Self {
        match node_type {
            "start" => Self::Start(StartNode),
            "debug" => Self::Debug(DebugNode),
            "llm" => Self::Llm(LlmNode::new(config.clone())),
            _ => Self::NoOp,
        }
    }

    /// Canonical tag of this kind (`"noop"` for unrecognised tags).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Debug(_) => "debug",
            Self::Llm(_) => "llm",
            Self::NoOp => "noop",
        }
    }
}

#[async_trait]
impl ExecutableNode for NodeKind {
    async fn execute(
        &self,
        node_id: &str,
        inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<String, NodeError> {
        match self {
            Self::Start(node) => node.execute(node_id, inputs, ctx).await,
            Self::Debug(node) => node.execute(node_id, inputs, ctx).await,
            Self::Llm(node) => node.execute(node_id, inputs, ctx).await,
            Self::NoOp => Ok(String::new()),
        }
    }
}
