//! Google Gemini agent.
//!
//! One [`GeminiAgentFactory`] owns a single `reqwest::Client`; every agent it
//! creates clones that client (a cheap handle onto the shared connection
//! pool) and keeps its own conversation history, so memory is scoped to the
//! agent's execution and nothing leaks between concurrent runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{Agent, AgentError, AgentFactory};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Per-request timeout.  The key travels in a header, never in the URL.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_owned),
            parts: vec![Part { text: Some(text.to_owned()) }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Join every text part of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String, AgentError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(parts.into_iter().filter_map(|p| p.text).collect())
}

// ── Factory ──────────────────────────────────────────────────────

pub struct GeminiAgentFactory {
    http: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiAgentFactory {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl AgentFactory for GeminiAgentFactory {
    fn create_agent(&self, execution_id: Uuid, system_prompt: &str) -> Result<Box<dyn Agent>, AgentError> {
        if self.config.api_key.is_empty() {
            return Err(AgentError::NotConfigured("gemini api_key is empty".into()));
        }
        Ok(Box::new(GeminiAgent {
            name: format!("workflow-worker-{execution_id}"),
            http: self.http.clone(),
            config: self.config.clone(),
            system_instruction: Content::text(None, system_prompt),
            history: Mutex::new(Vec::new()),
        }))
    }
}

// ── Agent ────────────────────────────────────────────────────────

struct GeminiAgent {
    name: String,
    http: Client,
    config: Arc<GeminiConfig>,
    system_instruction: Content,
    history: Mutex<Vec<Content>>,
}

impl GeminiAgent {
    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request(&self, contents: &[Content]) -> RequestBuilder {
        let body = GenerateRequest {
            system_instruction: self.system_instruction.clone(),
            contents,
        };
        self.http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs.max(1)))
            .json(&body)
    }

    /// One `generateContent` round trip over `contents`.
    async fn exchange(&self, contents: &[Content]) -> Result<String, AgentError> {
        let response = self.request(contents).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api { status: status.as_u16(), body });
        }

        let parsed: GenerateResponse = response.json().await?;
        extract_text(parsed)
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        let mut history = self.history.lock().await;
        history.push(Content::text(Some("user"), prompt));

        debug!(agent = %self.name, model = %self.config.model, turns = history.len(), "gemini request");
        match self.exchange(&history).await {
            Ok(reply) => {
                history.push(Content::text(Some("model"), &reply));
                Ok(reply)
            }
            Err(e) => {
                // A failed turn leaves no trace in the conversation.
                history.pop();
                Err(e)
            }
        }
    }
}
