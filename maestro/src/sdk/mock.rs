//! Scriptable in-process SDK used by tests: replays a scripted turn, firing
//! hooks and invoking registered tools the way the real SDK would.

use super::hooks::{
    PostToolUseEvent, PreCompactEvent, PreToolUseEvent, StopEvent, SubagentStopEvent,
    UserPromptSubmitEvent,
};
use super::{AgentOptions, SdkClient, SdkConnector, SdkError, StreamMessage, ToolDef};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One scripted occurrence inside a mock turn.
#[derive(Clone, Debug)]
pub enum ScriptEvent {
    /// Emitted from `next_message`.
    Message(StreamMessage),
    /// Fires the pre-tool hook.
    PreTool { name: String, input: Value, id: String },
    /// Fires the post-tool hook.
    PostTool { name: String, input: Value, result: Value, is_error: bool, id: String },
    /// Invokes a registered management tool by name.
    CallTool { name: String, input: Value },
    SubagentStop { subagent_id: String },
    PreCompact { tokens_before: u64 },
    /// Fires the stop hook (the real SDK fires it when a stream ends).
    Stop { reason: String, num_turns: u32, duration_ms: u64 },
    /// Pauses the stream; lets tests hold a turn in flight.
    Delay(std::time::Duration),
}

struct MockClient {
    script: Mutex<VecDeque<ScriptEvent>>,
    options: AgentOptions,
    interrupted: AtomicBool,
}

#[async_trait]
impl SdkClient for MockClient {
    async fn query(&self, prompt: &str) -> Result<(), SdkError> {
        self.options
            .hooks
            .fire_user_prompt_submit(UserPromptSubmitEvent { prompt: prompt.to_string() })
            .await
    }

    async fn next_message(&self) -> Result<Option<StreamMessage>, SdkError> {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let event = { self.script.lock().await.pop_front() };
            let Some(event) = event else {
                return Ok(None);
            };
            match event {
                ScriptEvent::Message(msg) => return Ok(Some(msg)),
                ScriptEvent::PreTool { name, input, id } => {
                    self.options
                        .hooks
                        .fire_pre_tool_use(PreToolUseEvent {
                            tool_name: name,
                            tool_input: input,
                            tool_use_id: Some(id),
                        })
                        .await?;
                }
                ScriptEvent::PostTool { name, input, result, is_error, id } => {
                    self.options
                        .hooks
                        .fire_post_tool_use(PostToolUseEvent {
                            tool_name: name,
                            tool_input: input,
                            result: Some(result),
                            is_error,
                            tool_use_id: Some(id),
                        })
                        .await?;
                }
                ScriptEvent::CallTool { name, input } => {
                    let tool = self
                        .options
                        .tools
                        .iter()
                        .find(|t| t.name == name)
                        .cloned()
                        .ok_or_else(|| SdkError::Tool(format!("unknown tool: {name}")))?;
                    let _ = (tool.handler)(input).await;
                }
                ScriptEvent::SubagentStop { subagent_id } => {
                    self.options
                        .hooks
                        .fire_subagent_stop(SubagentStopEvent { subagent_id })
                        .await?;
                }
                ScriptEvent::PreCompact { tokens_before } => {
                    self.options
                        .hooks
                        .fire_pre_compact(PreCompactEvent { tokens_before })
                        .await?;
                }
                ScriptEvent::Stop { reason, num_turns, duration_ms } => {
                    self.options
                        .hooks
                        .fire_stop(StopEvent { reason, num_turns, duration_ms })
                        .await?;
                }
                ScriptEvent::Delay(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    async fn interrupt(&self) -> Result<(), SdkError> {
        self.interrupted.store(true, Ordering::SeqCst);
        self.options
            .hooks
            .fire_stop(StopEvent { reason: "interrupted".into(), num_turns: 0, duration_ms: 0 })
            .await
    }
}

/// Connector handing out scripted sessions in FIFO order. Sessions beyond the
/// scripted ones get an empty stream.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<VecDeque<Vec<ScriptEvent>>>,
    connects: Mutex<Vec<AgentOptions>>,
    one_shot_reply: Mutex<String>,
    clients: Mutex<Vec<Arc<MockClient>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            one_shot_reply: Mutex::new("summary.".to_string()),
            ..Default::default()
        }
    }

    pub async fn push_script(&self, events: Vec<ScriptEvent>) {
        self.scripts.lock().await.push_back(events);
    }

    pub async fn set_one_shot_reply(&self, reply: impl Into<String>) {
        *self.one_shot_reply.lock().await = reply.into();
    }

    /// Options of every `connect` call so far, in order.
    pub async fn connect_options(&self) -> Vec<AgentOptions> {
        self.connects.lock().await.clone()
    }

    /// Convenience script: a single text reply plus a result message.
    pub fn simple_turn(session_id: &str, text: &str, input_tokens: u64, output_tokens: u64) -> Vec<ScriptEvent> {
        use super::{AssistantBlock, ResultInfo, Usage};
        vec![
            ScriptEvent::Message(StreamMessage::System {
                subtype: "init".into(),
                data: json!({"session_id": session_id, "model": "mock", "tools": []}),
            }),
            ScriptEvent::Message(StreamMessage::Assistant {
                blocks: vec![AssistantBlock::Text { text: text.to_string() }],
            }),
            ScriptEvent::Message(StreamMessage::Result(ResultInfo {
                session_id: session_id.to_string(),
                usage: Some(Usage {
                    input_tokens,
                    output_tokens,
                    total_cost_usd: None,
                }),
                total_cost_usd: Some(0.01),
                num_turns: 1,
                duration_ms: 25,
                is_error: false,
            })),
            ScriptEvent::Stop { reason: "end_turn".into(), num_turns: 1, duration_ms: 25 },
        ]
    }
}

#[async_trait]
impl SdkConnector for MockConnector {
    async fn connect(&self, options: AgentOptions) -> Result<Arc<dyn SdkClient>, SdkError> {
        let script = self.scripts.lock().await.pop_front().unwrap_or_default();
        self.connects.lock().await.push(options.clone());
        let client = Arc::new(MockClient {
            script: Mutex::new(script.into()),
            options,
            interrupted: AtomicBool::new(false),
        });
        self.clients.lock().await.push(client.clone());
        Ok(client)
    }

    async fn one_shot(
        &self,
        _model: &str,
        _system_prompt: Option<&str>,
        _prompt: &str,
    ) -> Result<String, SdkError> {
        Ok(self.one_shot_reply.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::AssistantBlock;

    #[tokio::test]
    async fn scripted_turn_replays_messages_and_hooks() {
        let connector = MockConnector::new();
        connector
            .push_script(MockConnector::simple_turn("sess-1", "hello", 10, 4))
            .await;

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let mut options = AgentOptions::for_model("mock");
        options.hooks = crate::sdk::Hooks::new().add_stop(move |_ev| {
            let f = fired_clone.clone();
            async move {
                f.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let client = connector.connect(options).await.unwrap();
        client.query("hi").await.unwrap();

        let mut texts = Vec::new();
        while let Some(msg) = client.next_message().await.unwrap() {
            if let StreamMessage::Assistant { blocks } = msg {
                for block in blocks {
                    if let AssistantBlock::Text { text } = block {
                        texts.push(text);
                    }
                }
            }
        }
        assert_eq!(texts, vec!["hello"]);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupt_short_circuits_stream() {
        let connector = MockConnector::new();
        connector
            .push_script(MockConnector::simple_turn("sess-2", "never seen", 1, 1))
            .await;
        let client = connector.connect(AgentOptions::for_model("mock")).await.unwrap();
        client.interrupt().await.unwrap();
        assert!(client.next_message().await.unwrap().is_none());
    }
}
