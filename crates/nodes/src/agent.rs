//! Language-model agent port.
//!
//! An [`AgentFactory`] is shared by every execution; each `llm` node asks it
//! for a fresh [`Agent`] bound to the execution id and a system prompt.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("language model is not configured: {0}")]
    NotConfigured(String),

    /// Transport failure.  Built through `From`, which strips the request
    /// URL from the error.
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("model api error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// A single conversational agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Send `prompt` and return the model's reply.
    async fn run(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Builds agents.  Must be cheap to call repeatedly and safe to share
/// between concurrent executions.
pub trait AgentFactory: Send + Sync {
    fn create_agent(
        &self,
        execution_id: Uuid,
        system_prompt: &str,
    ) -> Result<Box<dyn Agent>, AgentError>;
}

/// Factory used when no model credentials are configured.
///
/// Workflows without `llm` nodes still run; an `llm` node fails with
/// [`AgentError::NotConfigured`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAgentFactory;

impl AgentFactory for DisabledAgentFactory {
    fn create_agent(&self, _execution_id: Uuid, _system_prompt: &str) -> Result<Box<dyn Agent>, AgentError> {
        Err(AgentError::NotConfigured("no model api key set".into()))
    }
}
