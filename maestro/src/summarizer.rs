//! Best-effort one-sentence summaries over the fast model tier.
//!
//! Summaries fill the `summary` columns asynchronously; a failure anywhere
//! in this module degrades to a descriptive fallback and never reaches the
//! caller.

use crate::hub::EventHub;
use crate::sdk::SdkConnector;
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Content fed into the prompt is capped at this many characters.
const CONTENT_CAP: usize = 500;

fn truncate(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        text.to_string()
    } else {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

pub struct Summarizer {
    connector: Arc<dyn SdkConnector>,
    fast_model: String,
    system_prompt: String,
    /// User prompt template with `{event_type}` and `{details}` placeholders.
    user_template: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(
        connector: Arc<dyn SdkConnector>,
        fast_model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            fast_model: fast_model.into(),
            system_prompt: system_prompt.into(),
            user_template: user_template.into(),
            timeout,
        }
    }

    fn details_for(event_data: &Value, event_type: &str) -> (String, String) {
        match event_type {
            "PreToolUse" | "PostToolUse" => {
                let tool_name = event_data
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let input = event_data.get("tool_input").cloned().unwrap_or(Value::Null);
                (
                    format!("Tool: {tool_name}\nInput: {input}"),
                    format!("{event_type}: {tool_name}"),
                )
            }
            "text" | "thinking" => {
                let content = event_data.get("content").and_then(Value::as_str).unwrap_or("");
                let head = truncate(content, 50);
                (
                    format!("Content: {}", truncate(content, CONTENT_CAP)),
                    format!("{}: {head}...", capitalize(event_type)),
                )
            }
            "tool_use" | "tool_result" => {
                let fallback = match event_data.get("tool_name").and_then(Value::as_str) {
                    Some(name) => format!("Tool use: {name}"),
                    None => format!("Tool {event_type}"),
                };
                (format!("Data: {}", truncate(&event_data.to_string(), CONTENT_CAP)), fallback)
            }
            "Stop" | "SubagentStop" | "PreCompact" => {
                (format!("Data: {event_data}"), event_type.to_string())
            }
            "UserPromptSubmit" => (
                format!("Data: {}", truncate(&event_data.to_string(), CONTENT_CAP)),
                "User prompt submitted".to_string(),
            ),
            "FileChange" => {
                let detail = event_data.get("details").and_then(Value::as_str).unwrap_or("");
                (detail.to_string(), "File changed".to_string())
            }
            other => {
                tracing::warn!(event_type = other, "unknown event type for summarization");
                (
                    format!("Data: {}", truncate(&event_data.to_string(), CONTENT_CAP)),
                    format!("Event: {other}"),
                )
            }
        }
    }

    /// One-sentence summary of an event; the fallback string on any failure,
    /// timeout, or empty reply.
    pub async fn summarize_event(&self, event_data: &Value, event_type: &str) -> String {
        let (details, fallback) = Self::details_for(event_data, event_type);
        let prompt = self
            .user_template
            .replace("{event_type}", event_type)
            .replace("{details}", &details);

        let call = self
            .connector
            .one_shot(&self.fast_model, Some(&self.system_prompt), &prompt);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(Ok(_)) => fallback,
            Ok(Err(e)) => {
                tracing::warn!(event_type, "summarization failed: {e}");
                fallback
            }
            Err(_) => {
                tracing::warn!(event_type, "summarization timed out");
                fallback
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Background task: summarize an agent log row, store the summary, and
/// broadcast the agent's latest summary. Errors go to the log only.
pub fn spawn_agent_log_summary(
    summarizer: Arc<Summarizer>,
    store: Store,
    hub: Arc<EventHub>,
    log_id: Uuid,
    agent_id: Uuid,
    event_type: String,
    event_data: Value,
) {
    tokio::spawn(async move {
        let summary = summarizer.summarize_event(&event_data, &event_type).await;
        if let Err(e) = store.update_log_summary(log_id, &summary).await {
            tracing::warn!(%log_id, "failed to store log summary: {e}");
            return;
        }
        hub.broadcast_agent_summary_update(agent_id.to_string(), summary).await;
    });
}

/// Background task: summarize a chat row.
pub fn spawn_chat_summary(summarizer: Arc<Summarizer>, store: Store, chat_id: Uuid, text: String) {
    tokio::spawn(async move {
        let data = serde_json::json!({"content": text});
        let summary = summarizer.summarize_event(&data, "text").await;
        if let Err(e) = store.update_chat_summary(chat_id, &summary).await {
            tracing::warn!(%chat_id, "failed to store chat summary: {e}");
        }
    });
}

/// Background task: summarize a system log row (thinking/tool-use blocks).
pub fn spawn_system_log_summary(
    summarizer: Arc<Summarizer>,
    store: Store,
    log_id: Uuid,
    event_type: String,
    event_data: Value,
) {
    tokio::spawn(async move {
        let summary = summarizer.summarize_event(&event_data, &event_type).await;
        if let Err(e) = store.update_system_log_summary(log_id, &summary).await {
            tracing::warn!(%log_id, "failed to store system log summary: {e}");
        }
    });
}

/// Background task: summarize a persisted prompt.
pub fn spawn_prompt_summary(
    summarizer: Arc<Summarizer>,
    store: Store,
    prompt_id: Uuid,
    prompt_text: String,
) {
    tokio::spawn(async move {
        let data = serde_json::json!({"prompt": prompt_text});
        let summary = summarizer.summarize_event(&data, "UserPromptSubmit").await;
        if let Err(e) = store.update_prompt_summary(prompt_id, &summary).await {
            tracing::warn!(%prompt_id, "failed to store prompt summary: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::MockConnector;
    use serde_json::json;

    fn summarizer(connector: Arc<MockConnector>) -> Summarizer {
        Summarizer::new(
            connector,
            "fast-model",
            "Summarize in one sentence.",
            "Event: {event_type}\n{details}",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn returns_model_reply_when_present() {
        let connector = Arc::new(MockConnector::new());
        connector.set_one_shot_reply("Reading the config file.").await;
        let s = summarizer(connector);
        let out = s
            .summarize_event(
                &json!({"tool_name": "Read", "tool_input": {"file_path": "config.py"}}),
                "PreToolUse",
            )
            .await;
        assert_eq!(out, "Reading the config file.");
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_descriptive_default() {
        let connector = Arc::new(MockConnector::new());
        connector.set_one_shot_reply("  ").await;
        let s = summarizer(connector);
        let out = s
            .summarize_event(&json!({"tool_name": "Write", "tool_input": {}}), "PreToolUse")
            .await;
        assert_eq!(out, "PreToolUse: Write");
    }

    #[tokio::test]
    async fn stop_events_fall_back_to_event_type() {
        let connector = Arc::new(MockConnector::new());
        connector.set_one_shot_reply("").await;
        let s = summarizer(connector);
        let out = s.summarize_event(&json!({"reason": "end_turn"}), "Stop").await;
        assert_eq!(out, "Stop");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld".repeat(100);
        let cut = truncate(&text, 500);
        assert!(cut.len() <= 500);
        assert!(text.starts_with(&cut));
    }
}
