//! `nodes` crate: the node kinds a workflow can contain.
//!
//! Every kind implements [`ExecutableNode`]; [`NodeKind`] is the closed set
//! the engine dispatches over.  The language-model port ([`AgentFactory`])
//! and its Gemini implementation live here too, because only the `llm` kind
//! talks to it.

pub mod agent;
pub mod debug;
pub mod error;
pub mod gemini;
pub mod kind;
pub mod llm;
pub mod mock;
pub mod start;
pub mod traits;

pub use agent::{Agent, AgentError, AgentFactory, DisabledAgentFactory};
pub use error::NodeError;
pub use kind::NodeKind;
pub use traits::{ExecutableNode, ExecutionContext, NodeInputs};
