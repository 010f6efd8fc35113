//! Node-level error type.

use thiserror::Error;

use crate::AgentError;

/// Errors returned by a node's `execute` method.
///
/// There is no retry policy: any variant fails the whole execution.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The language-model agent could not be constructed.
    #[error("agent creation failed: {0}")]
    AgentCreation(#[source] AgentError),

    /// The language-model agent returned an error.
    #[error("agent execution failed: {0}")]
    AgentExecution(#[source] AgentError),
}
