//! `MockAgentFactory`: a test double for the language-model port.
//!
//! Useful in unit and integration tests where a real model is either
//! unavailable or irrelevant.  Every agent it hands out records the prompts
//! it receives into the factory's shared call log.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{Agent, AgentError, AgentFactory};

/// Behaviour injected into `MockAgentFactory` at construction time.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply with the prompt itself.
    Echo,
    /// Reply with the agent's system prompt.
    SystemPrompt,
    /// Reply with a fixed string.
    Fixed(String),
    /// Fail with [`AgentError::Other`].
    Fail(String),
    /// Panic inside `run`.
    Panic(String),
    /// Sleep, then behave like the inner reply.
    Slow(Duration, Box<MockReply>),
}

/// One recorded `Agent::run` call.
#[derive(Debug, Clone)]
pub struct AgentCall {
    pub execution_id: Uuid,
    pub system_prompt: String,
    pub prompt: String,
}

pub struct MockAgentFactory {
    reply: MockReply,
    calls: Arc<Mutex<Vec<AgentCall>>>,
}

impl MockAgentFactory {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All calls seen so far, in call order.
    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Calls made on behalf of one execution.
    pub fn calls_for(&self, execution_id: Uuid) -> Vec<AgentCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.execution_id == execution_id)
            .collect()
    }
}

impl AgentFactory for MockAgentFactory {
    fn create_agent(&self, execution_id: Uuid, system_prompt: &str) -> Result<Box<dyn Agent>, AgentError> {
        Ok(Box::new(MockAgent {
            execution_id,
            system_prompt: system_prompt.to_owned(),
            reply: self.reply.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct MockAgent {
    execution_id: Uuid,
    system_prompt: String,
    reply: MockReply,
    calls: Arc<Mutex<Vec<AgentCall>>>,
}

impl MockAgent {
    async fn respond(&self, reply: &MockReply, prompt: &str) -> Result<String, AgentError> {
        let mut reply = reply;
        while let MockReply::Slow(delay, inner) = reply {
            tokio::time::sleep(*delay).await;
            reply = &**inner;
        }
        match reply {
            MockReply::Echo => Ok(prompt.to_owned()),
            MockReply::SystemPrompt => Ok(self.system_prompt.clone()),
            MockReply::Fixed(text) => Ok(text.clone()),
            MockReply::Fail(msg) => Err(AgentError::Other(msg.clone())),
            MockReply::Panic(msg) => panic!("{msg}"),
            MockReply::Slow(..) => unreachable!("unwrapped above"),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(AgentCall {
            execution_id: self.execution_id,
            system_prompt: self.system_prompt.clone(),
            prompt: prompt.to_owned(),
        });
        self.respond(&self.reply, prompt).await
    }
}
