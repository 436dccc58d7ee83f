//! Subprocess transport for the SDK boundary: spawns the agent CLI and
//! speaks newline-delimited JSON over its stdio.
//!
//! Outbound lines: an `init` handshake (options + registered tool schemas),
//! `user` prompts, and `tool_result` answers. Inbound lines: `system`,
//! `assistant`, and `result` stream messages, `hook` lifecycle events, and
//! `tool_call` requests for the registered management tools.

use super::hooks::{
    PostToolUseEvent, PreCompactEvent, PreToolUseEvent, StopEvent, SubagentStopEvent,
};
use super::{
    AgentOptions, AssistantBlock, ResultInfo, SdkClient, SdkConnector, SdkError, StreamMessage,
    Usage,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};

/// Spawns `command` once per session. The binary is the external SDK's CLI;
/// everything beyond this file treats it as an opaque collaborator.
pub struct ProcessConnector {
    command: String,
}

impl ProcessConnector {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

struct ProcessClient {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    lines: Mutex<mpsc::Receiver<Value>>,
    options: AgentOptions,
}

fn parse_blocks(value: &Value) -> Vec<AssistantBlock> {
    let Some(blocks) = value.get("blocks").and_then(Value::as_array) else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter_map(|b| match b.get("type").and_then(Value::as_str) {
            Some("text") => Some(AssistantBlock::Text {
                text: b.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            Some("thinking") => Some(AssistantBlock::Thinking {
                thinking: b.get("thinking").and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            Some("tool_use") => Some(AssistantBlock::ToolUse {
                name: b.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                input: b.get("input").cloned().unwrap_or(Value::Null),
                id: b.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn parse_result(value: &Value) -> ResultInfo {
    let usage = value.get("usage").map(|u| Usage {
        input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        total_cost_usd: u.get("total_cost_usd").and_then(Value::as_f64),
    });
    ResultInfo {
        session_id: value
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        usage,
        total_cost_usd: value.get("total_cost_usd").and_then(Value::as_f64),
        num_turns: value.get("num_turns").and_then(Value::as_u64).unwrap_or(0) as u32,
        duration_ms: value.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
        is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
    }
}

impl ProcessClient {
    async fn write_line(&self, value: &Value) -> Result<(), SdkError> {
        let mut stdin = self.stdin.lock().await;
        let line = format!("{value}\n");
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SdkError::transport(format!("write to agent cli: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| SdkError::transport(format!("flush to agent cli: {e}")))
    }

    /// Fires the hook named in a `hook` line. Unknown hooks are ignored.
    async fn dispatch_hook(&self, value: &Value) -> Result<(), SdkError> {
        let hooks = &self.options.hooks;
        let data = value.get("data").cloned().unwrap_or_else(|| json!({}));
        match value.get("hook").and_then(Value::as_str) {
            Some("pre_tool_use") => {
                hooks
                    .fire_pre_tool_use(PreToolUseEvent {
                        tool_name: data
                            .get("tool_name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        tool_input: data.get("tool_input").cloned().unwrap_or(Value::Null),
                        tool_use_id: data
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .map(String::from),
                    })
                    .await
            }
            Some("post_tool_use") => {
                hooks
                    .fire_post_tool_use(PostToolUseEvent {
                        tool_name: data
                            .get("tool_name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        tool_input: data.get("tool_input").cloned().unwrap_or(Value::Null),
                        result: data.get("result").cloned(),
                        is_error: data.get("is_error").and_then(Value::as_bool).unwrap_or(false),
                        tool_use_id: data
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .map(String::from),
                    })
                    .await
            }
            Some("stop") => {
                hooks
                    .fire_stop(StopEvent {
                        reason: data
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        num_turns: data.get("num_turns").and_then(Value::as_u64).unwrap_or(0)
                            as u32,
                        duration_ms: data.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
                    })
                    .await
            }
            Some("subagent_stop") => {
                hooks
                    .fire_subagent_stop(SubagentStopEvent {
                        subagent_id: data
                            .get("subagent_id")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                    })
                    .await
            }
            Some("pre_compact") => {
                hooks
                    .fire_pre_compact(PreCompactEvent {
                        tokens_before: data
                            .get("tokens_before")
                            .and_then(Value::as_u64)
                            .unwrap_or(0),
                    })
                    .await
            }
            other => {
                tracing::debug!(hook = ?other, "ignoring unknown hook line");
                Ok(())
            }
        }
    }

    /// Answers a `tool_call` line with the registered handler's output.
    async fn dispatch_tool_call(&self, value: &Value) -> Result<(), SdkError> {
        let name = value.get("name").and_then(Value::as_str).unwrap_or("");
        let call_id = value.get("id").and_then(Value::as_str).unwrap_or("");
        let input = value.get("input").cloned().unwrap_or(Value::Null);

        let output = match self.options.tools.iter().find(|t| t.name == name) {
            Some(tool) => (tool.handler)(input).await,
            None => super::ToolOutput::error(format!("unknown tool: {name}")),
        };
        self.write_line(&json!({
            "type": "tool_result",
            "id": call_id,
            "output": output.text,
            "is_error": output.is_error,
        }))
        .await
    }
}

#[async_trait]
impl SdkClient for ProcessClient {
    async fn query(&self, prompt: &str) -> Result<(), SdkError> {
        self.options
            .hooks
            .fire_user_prompt_submit(super::hooks::UserPromptSubmitEvent {
                prompt: prompt.to_string(),
            })
            .await?;
        self.write_line(&json!({"type": "user", "prompt": prompt})).await
    }

    async fn next_message(&self) -> Result<Option<StreamMessage>, SdkError> {
        loop {
            let line = {
                let mut lines = self.lines.lock().await;
                match self.options.timeout {
                    Some(limit) => match tokio::time::timeout(limit, lines.recv()).await {
                        Ok(line) => line,
                        Err(_) => return Err(SdkError::Timeout),
                    },
                    None => lines.recv().await,
                }
            };
            let Some(value) = line else {
                return Ok(None);
            };
            match value.get("type").and_then(Value::as_str) {
                Some("system") => {
                    return Ok(Some(StreamMessage::System {
                        subtype: value
                            .get("subtype")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        data: value.get("data").cloned().unwrap_or_else(|| json!({})),
                    }));
                }
                Some("assistant") => {
                    return Ok(Some(StreamMessage::Assistant { blocks: parse_blocks(&value) }));
                }
                Some("result") => {
                    return Ok(Some(StreamMessage::Result(parse_result(&value))));
                }
                Some("hook") => self.dispatch_hook(&value).await?,
                Some("tool_call") => self.dispatch_tool_call(&value).await?,
                other => tracing::debug!(kind = ?other, "ignoring unknown stream line"),
            }
        }
    }

    async fn interrupt(&self) -> Result<(), SdkError> {
        {
            let mut child = self.child.lock().await;
            child
                .start_kill()
                .map_err(|e| SdkError::transport(format!("kill agent cli: {e}")))?;
        }
        self.options
            .hooks
            .fire_stop(StopEvent { reason: "interrupted".into(), num_turns: 0, duration_ms: 0 })
            .await
    }
}

#[async_trait]
impl SdkConnector for ProcessConnector {
    async fn connect(&self, options: AgentOptions) -> Result<Arc<dyn SdkClient>, SdkError> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("--stream-json")
            .arg("--model")
            .arg(&options.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(resume) = &options.resume {
            cmd.arg("--resume").arg(resume);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SdkError::transport(format!("spawn {}: {e}", self.command)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::transport("agent cli stdout unavailable"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SdkError::transport("agent cli stdin unavailable"))?;

        // Reader task: raw NDJSON lines into the session queue.
        let (tx, rx) = mpsc::channel::<Value>(128);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("unparseable agent cli line: {e}"),
                }
            }
        });

        let client = ProcessClient {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            lines: Mutex::new(rx),
            options,
        };

        // Handshake: options and tool schemas, minus the handlers.
        let tools: Vec<Value> = client
            .options
            .tools
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description, "schema": t.schema}))
            .collect();
        let init = json!({
            "type": "init",
            "system_prompt": client.options.system_prompt,
            "allowed_tools": client.options.allowed_tools,
            "disallowed_tools": client.options.disallowed_tools,
            "max_turns": client.options.max_turns,
            "tools": tools,
        });
        client.write_line(&init).await?;

        Ok(Arc::new(client))
    }

    async fn one_shot(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> Result<String, SdkError> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("--print").arg("--model").arg(model);
        if let Some(system) = system_prompt {
            cmd.arg("--system-prompt").arg(system);
        }
        cmd.arg(prompt).stdin(Stdio::null()).stderr(Stdio::null());

        let output = cmd
            .output()
            .await
            .map_err(|e| SdkError::transport(format!("spawn {}: {e}", self.command)))?;
        if !output.status.success() {
            return Err(SdkError::transport(format!(
                "agent cli exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blocks_maps_the_three_kinds() {
        let value = json!({"blocks": [
            {"type": "text", "text": "hi"},
            {"type": "thinking", "thinking": "hm"},
            {"type": "tool_use", "name": "Read", "input": {"file_path": "a"}, "id": "t1"},
            {"type": "mystery"},
        ]});
        let blocks = parse_blocks(&value);
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], AssistantBlock::Text { text } if text == "hi"));
        assert!(matches!(&blocks[2], AssistantBlock::ToolUse { name, .. } if name == "Read"));
    }

    #[test]
    fn parse_result_reads_usage_and_cost() {
        let info = parse_result(&json!({
            "session_id": "sess-9",
            "usage": {"input_tokens": 12, "output_tokens": 7},
            "total_cost_usd": 0.02,
            "num_turns": 3,
            "duration_ms": 450,
        }));
        assert_eq!(info.session_id, "sess-9");
        assert_eq!(info.token_counts(), (12, 7));
        assert_eq!(info.cost_usd(), 0.02);
        assert_eq!(info.num_turns, 3);
    }

    #[test]
    fn parse_result_tolerates_missing_fields() {
        let info = parse_result(&json!({}));
        assert_eq!(info.session_id, "");
        assert_eq!(info.token_counts(), (0, 0));
        assert_eq!(info.cost_usd(), 0.0);
    }
}
