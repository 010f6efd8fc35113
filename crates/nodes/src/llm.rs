//! `llm`: sends the predecessors' outputs plus an instruction to a
//! language-model agent and returns its reply.

use async_trait::async_trait;
use serde_json::Value;
use store::LogLevel;
use tracing::{debug, warn};

use crate::{ExecutableNode, ExecutionContext, NodeError, NodeInputs};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful workflow assistant.";
pub const DEFAULT_USER_PROMPT: &str = "Hello AI";

const CONTEXT_HEADER: &str = "CONTEXT FROM PREVIOUS STEPS:\n";
const INSTRUCTION_HEADER: &str = "\nUSER INSTRUCTION:\n";

/// Prompts resolved from a node's configuration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub system_prompt: String,
    pub prompt: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            prompt: DEFAULT_USER_PROMPT.to_owned(),
        }
    }
}

impl LlmSettings {
    /// Read `system_prompt` and `prompt` from `config`.
    ///
    /// A `null` config yields the defaults.  Anything other than a JSON
    /// object is an error; the caller decides whether to fall back.
    pub fn from_config(config: &Value) -> Result<Self, serde_json::Error> {
        let mut settings = Self::default();
        if config.is_null() {
            return Ok(settings);
        }

        let map: serde_json::Map<String, Value> = serde_json::from_value(config.clone())?;
        if let Some(system_prompt) = map.get("system_prompt").and_then(render_value) {
            settings.system_prompt = system_prompt;
        }
        if let Some(prompt) = map.get("prompt").and_then(render_value) {
            settings.prompt = prompt;
        }
        Ok(settings)
    }
}

/// Strings are used verbatim, other scalars and structures as JSON text.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Assemble the prompt handed to the agent.
///
/// With at least one predecessor output the prompt opens with a context
/// block of `- <id>: <output>` lines.  The lines follow lexicographic id
/// order (the iteration order of [`NodeInputs`]) so the prompt is identical
/// across runs whatever order the predecessors completed in.
pub fn build_prompt(inputs: &NodeInputs, user_prompt: &str) -> String {
    if inputs.is_empty() {
        return user_prompt.to_owned();
    }

    let mut prompt = String::from(CONTEXT_HEADER);
    for (source_id, output) in inputs {
        prompt.push_str(&format!("- {source_id}: {output}\n"));
    }
    prompt.push_str(INSTRUCTION_HEADER);
    prompt.push_str(user_prompt);
    prompt
}

#[derive(Debug, Clone)]
pub struct LlmNode {
    config: Value,
}

impl LlmNode {
    pub fn new(config: Value) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutableNode for LlmNode {
    async fn execute(
        &self,
        node_id: &str,
        inputs: &NodeInputs,
        ctx: &ExecutionContext,
    ) -> Result<String, NodeError> {
        ctx.log(Some(node_id), LogLevel::Info, "Initializing Smart Agent...").await;

        let settings = match LlmSettings::from_config(&self.config) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(node_id, error = %e, "llm config unparsable, using defaults");
                ctx.log(Some(node_id), LogLevel::Warn, "Config parse error, using defaults").await;
                LlmSettings::default()
            }
        };

        let agent = ctx
            .agents
            .create_agent(ctx.execution_id, &settings.system_prompt)
            .map_err(NodeError::AgentCreation)?;

        let prompt = build_prompt(inputs, &settings.prompt);
        debug!(node_id, prompt_len = prompt.len(), "running agent");

        let reply = agent.run(&prompt).await.map_err(NodeError::AgentExecution)?;

        ctx.log(Some(node_id), LogLevel::Info, &format!("Agent Response: {reply}")).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_config_uses_defaults() {
        assert_eq!(LlmSettings::from_config(&Value::Null).unwrap(), LlmSettings::default());
    }

    #[test]
    fn overrides_are_read() {
        let settings = LlmSettings::from_config(&json!({
            "system_prompt": "You summarise.",
            "prompt": "Summarise the above",
            "temperature": 0.2,
        }))
        .unwrap();
        assert_eq!(settings.system_prompt, "You summarise.");
        assert_eq!(settings.prompt, "Summarise the above");
    }

    #[test]
    fn non_string_prompt_is_rendered_as_json() {
        let settings = LlmSettings::from_config(&json!({ "prompt": 42 })).unwrap();
        assert_eq!(settings.prompt, "42");
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn non_object_config_is_an_error() {
        assert!(LlmSettings::from_config(&json!(["not", "an", "object"])).is_err());
        assert!(LlmSettings::from_config(&json!("text")).is_err());
    }

    #[test]
    fn prompt_without_inputs_is_just_the_instruction() {
        assert_eq!(build_prompt(&NodeInputs::new(), "Do it"), "Do it");
    }

    #[test]
    fn context_block_is_sorted_by_source_id() {
        let mut inputs = NodeInputs::new();
        inputs.insert("c".into(), "from c".into());
        inputs.insert("b".into(), "from b".into());

        assert_eq!(
            build_prompt(&inputs, "Combine"),
            "CONTEXT FROM PREVIOUS STEPS:\n- b: from b\n- c: from c\n\nUSER INSTRUCTION:\nCombine"
        );
    }

    #[test]
    fn single_input_still_gets_a_context_block() {
        let inputs = NodeInputs::from([("start".to_string(), "Workflow Started".to_string())]);
        assert_eq!(
            build_prompt(&inputs, "Hello AI"),
            "CONTEXT FROM PREVIOUS STEPS:\n- start: Workflow Started\n\nUSER INSTRUCTION:\nHello AI"
        );
    }
}
