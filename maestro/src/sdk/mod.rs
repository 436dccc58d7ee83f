//! Boundary to the external LLM SDK.
//!
//! The runtime never talks to the model transport directly; it consumes a
//! [`SdkConnector`] that opens streaming [`SdkClient`] sessions and answers
//! stateless one-shot queries (used by the summarizer). The message grammar
//! here is the full external contract of that collaborator.

pub mod hooks;
mod mock;
mod process;

pub use hooks::{
    Hooks, PostToolUseEvent, PreCompactEvent, PreToolUseEvent, StopEvent, SubagentStopEvent,
    UserPromptSubmitEvent,
};
pub use mock::{MockConnector, ScriptEvent};
pub use process::ProcessConnector;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("stream: {0}")]
    Stream(String),
    #[error("hook: {0}")]
    Hook(String),
    #[error("tool: {0}")]
    Tool(String),
    #[error("request timeout")]
    Timeout,
}

impl SdkError {
    pub fn transport(msg: impl Into<String>) -> Self {
        SdkError::Transport(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        SdkError::Stream(msg.into())
    }

    pub fn hook(msg: impl Into<String>) -> Self {
        SdkError::Hook(msg.into())
    }
}

/// One content block of an assistant message.
#[derive(Clone, Debug)]
pub enum AssistantBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { name: String, input: Value, id: String },
}

/// Token usage reported by the turn-closing result message.
#[derive(Clone, Debug, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: Option<f64>,
}

/// Turn-closing result: session resume token plus usage accounting.
#[derive(Clone, Debug)]
pub struct ResultInfo {
    pub session_id: String,
    pub usage: Option<Usage>,
    /// Preferred cost source; `usage.total_cost_usd` is the fallback.
    pub total_cost_usd: Option<f64>,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub is_error: bool,
}

impl ResultInfo {
    /// Cost in USD, preferring the top-level field over the usage substructure.
    pub fn cost_usd(&self) -> f64 {
        match self.total_cost_usd {
            Some(c) if c > 0.0 => c,
            _ => self
                .usage
                .as_ref()
                .and_then(|u| u.total_cost_usd)
                .unwrap_or(0.0),
        }
    }

    /// (input, output) token counts; zero when the SDK reported no usage.
    pub fn token_counts(&self) -> (u64, u64) {
        self.usage
            .as_ref()
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0))
    }
}

/// One message from the SDK's per-turn stream; consumed exactly once.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    /// Informational; carries `{session_id, cwd, tools, model, ...}` data.
    System { subtype: String, data: Value },
    Assistant { blocks: Vec<AssistantBlock> },
    Result(ResultInfo),
}

/// Outcome of a management tool invocation, rendered back to the model.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }
}

pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ToolOutput> + Send + Sync>;

/// A virtual tool registered with the SDK: (name, schema, handler).
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool input, part of the session's external contract.
    pub schema: Value,
    pub handler: ToolHandler,
}

impl ToolDef {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ToolOutput> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Options for one streaming session.
#[derive(Clone, Default)]
pub struct AgentOptions {
    pub system_prompt: Option<String>,
    pub model: String,
    pub cwd: Option<String>,
    /// Resume token from a previous turn of the same conversation.
    pub resume: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub timeout: Option<Duration>,
    pub hooks: Hooks,
    pub tools: Vec<ToolDef>,
}

impl AgentOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Default::default() }
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("model", &self.model)
            .field("cwd", &self.cwd)
            .field("resume", &self.resume)
            .field("max_turns", &self.max_turns)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// An open streaming session. `next_message` yields the turn stream until
/// `None`; `interrupt` terminates the stream early (the stop hook still
/// fires on the SDK side).
#[async_trait]
pub trait SdkClient: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<(), SdkError>;
    async fn next_message(&self) -> Result<Option<StreamMessage>, SdkError>;
    async fn interrupt(&self) -> Result<(), SdkError>;
}

/// Factory for SDK sessions plus the stateless fast-model path.
#[async_trait]
pub trait SdkConnector: Send + Sync {
    async fn connect(&self, options: AgentOptions) -> Result<Arc<dyn SdkClient>, SdkError>;

    /// Single stateless completion, no session persistence. Used for
    /// summarization on the fast model tier.
    async fn one_shot(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> Result<String, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_prefers_top_level_field() {
        let info = ResultInfo {
            session_id: "s".into(),
            usage: Some(Usage { input_tokens: 10, output_tokens: 5, total_cost_usd: Some(0.5) }),
            total_cost_usd: Some(0.2),
            num_turns: 1,
            duration_ms: 100,
            is_error: false,
        };
        assert_eq!(info.cost_usd(), 0.2);
        assert_eq!(info.token_counts(), (10, 5));
    }

    #[test]
    fn cost_falls_back_to_usage() {
        let info = ResultInfo {
            session_id: "s".into(),
            usage: Some(Usage { input_tokens: 1, output_tokens: 2, total_cost_usd: Some(0.03) }),
            total_cost_usd: None,
            num_turns: 1,
            duration_ms: 1,
            is_error: false,
        };
        assert_eq!(info.cost_usd(), 0.03);
    }

    #[test]
    fn zero_top_level_cost_is_treated_as_missing() {
        let info = ResultInfo {
            session_id: "s".into(),
            usage: Some(Usage { input_tokens: 1, output_tokens: 2, total_cost_usd: Some(0.03) }),
            total_cost_usd: Some(0.0),
            num_turns: 1,
            duration_ms: 1,
            is_error: false,
        };
        assert_eq!(info.cost_usd(), 0.03);
    }
}
