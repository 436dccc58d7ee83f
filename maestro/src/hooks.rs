//! Hook runtime: turns the SDK's six lifecycle hooks into persisted
//! `agent_logs` rows, `agent_log` broadcasts, and background summaries.
//!
//! Persistence failures abort the turn; summarization failures never do.

use crate::files::FileTracker;
use crate::hub::EventHub;
use crate::sdk::{
    Hooks, PostToolUseEvent, PreCompactEvent, PreToolUseEvent, SdkError, StopEvent,
    SubagentStopEvent, UserPromptSubmitEvent,
};
use crate::store::{LogCategory, Store};
use crate::summarizer::{spawn_agent_log_summary, Summarizer};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use ws_event::utc_now_rfc3339;

/// Tool results persisted into hook payloads are capped at this length.
const RESULT_CAP: usize = 500;
/// Prompts are capped at this length; the original length is recorded.
const PROMPT_CAP: usize = 1000;

fn cap(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Shared context of one task's hooks: ids, the per-task entry counter, and
/// the sinks every handler writes to.
pub struct HookRuntime {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub task_slug: String,
    pub session_id: Option<String>,
    counter: Arc<AtomicI32>,
    store: Store,
    hub: Arc<EventHub>,
    summarizer: Arc<Summarizer>,
    tracker: Option<Arc<FileTracker>>,
}

impl HookRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: Uuid,
        agent_name: impl Into<String>,
        task_slug: impl Into<String>,
        session_id: Option<String>,
        counter: Arc<AtomicI32>,
        store: Store,
        hub: Arc<EventHub>,
        summarizer: Arc<Summarizer>,
        tracker: Option<Arc<FileTracker>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent_id,
            agent_name: agent_name.into(),
            task_slug: task_slug.into(),
            session_id,
            counter,
            store,
            hub,
            summarizer,
            tracker,
        })
    }

    /// Builds the [`Hooks`] container the SDK session is opened with.
    pub fn install(self: &Arc<Self>) -> Hooks {
        let pre = Arc::clone(self);
        let post = Arc::clone(self);
        let prompt = Arc::clone(self);
        let stop = Arc::clone(self);
        let subagent = Arc::clone(self);
        let compact = Arc::clone(self);

        Hooks::new()
            .add_pre_tool_use(move |ev| {
                let rt = Arc::clone(&pre);
                async move { rt.on_pre_tool(ev).await }
            })
            .add_post_tool_use(move |ev| {
                let rt = Arc::clone(&post);
                async move { rt.on_post_tool(ev).await }
            })
            .add_user_prompt_submit(move |ev| {
                let rt = Arc::clone(&prompt);
                async move { rt.on_user_prompt(ev).await }
            })
            .add_stop(move |ev| {
                let rt = Arc::clone(&stop);
                async move { rt.on_stop(ev).await }
            })
            .add_subagent_stop(move |ev| {
                let rt = Arc::clone(&subagent);
                async move { rt.on_subagent_stop(ev).await }
            })
            .add_pre_compact(move |ev| {
                let rt = Arc::clone(&compact);
                async move { rt.on_pre_compact(ev).await }
            })
    }

    fn next_index(&self) -> i32 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Persists the hook row (fatal on failure), broadcasts the log frame,
    /// and schedules summarization.
    async fn record(
        &self,
        event_type: &str,
        content: String,
        broadcast_summary: String,
        payload: Value,
    ) -> Result<(), SdkError> {
        let entry_index = self.next_index();
        tracing::info!(
            agent = %self.agent_id,
            task = %self.task_slug,
            entry = entry_index,
            event = event_type,
            "hook"
        );

        let log_id = self
            .store
            .insert_agent_log(
                self.agent_id,
                &self.task_slug,
                entry_index,
                LogCategory::Hook,
                event_type,
                Some(&content),
                &payload,
                self.session_id.as_deref(),
            )
            .await
            .map_err(|e| SdkError::hook(e.to_string()))?;

        self.hub
            .broadcast_agent_log(json!({
                "id": log_id.to_string(),
                "agent_id": self.agent_id.to_string(),
                "agent_name": self.agent_name,
                "task_slug": self.task_slug,
                "entry_index": entry_index,
                "event_category": "hook",
                "event_type": event_type,
                "content": content,
                "summary": broadcast_summary,
                "payload": payload,
            }))
            .await;

        spawn_agent_log_summary(
            Arc::clone(&self.summarizer),
            self.store.clone(),
            Arc::clone(&self.hub),
            log_id,
            self.agent_id,
            event_type.to_string(),
            payload,
        );
        Ok(())
    }

    async fn on_pre_tool(&self, event: PreToolUseEvent) -> Result<(), SdkError> {
        let payload = json!({
            "tool_name": event.tool_name,
            "tool_input": event.tool_input,
            "tool_use_id": event.tool_use_id,
            "timestamp": utc_now_rfc3339(),
        });
        self.record(
            "PreToolUse",
            format!("Using tool: {}", event.tool_name),
            format!("Using tool: {}", event.tool_name),
            payload,
        )
        .await
    }

    async fn on_post_tool(&self, event: PostToolUseEvent) -> Result<(), SdkError> {
        let truncated_result = event.result.as_ref().map(|r| {
            let text = match r {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cap(&text, RESULT_CAP)
        });
        let payload = json!({
            "tool_name": event.tool_name,
            "result": truncated_result,
            "is_error": event.is_error,
            "tool_use_id": event.tool_use_id,
            "timestamp": utc_now_rfc3339(),
        });
        self.record(
            "PostToolUse",
            format!("Tool result: {}", event.tool_name),
            format!("Completed tool: {}", event.tool_name),
            payload,
        )
        .await?;

        if let Some(tracker) = &self.tracker {
            tracker.observe_tool(&event.tool_name, &event.tool_input);
        }
        Ok(())
    }

    async fn on_user_prompt(&self, event: UserPromptSubmitEvent) -> Result<(), SdkError> {
        let payload = json!({
            "prompt": cap(&event.prompt, PROMPT_CAP),
            "prompt_length": event.prompt.len(),
            "timestamp": utc_now_rfc3339(),
        });
        let preview = cap(&event.prompt, 50);
        self.record(
            "UserPromptSubmit",
            format!("User prompt: {preview}"),
            format!("User: {preview}"),
            payload,
        )
        .await
    }

    async fn on_stop(&self, event: StopEvent) -> Result<(), SdkError> {
        let payload = json!({
            "reason": event.reason,
            "num_turns": event.num_turns,
            "duration_ms": event.duration_ms,
            "timestamp": utc_now_rfc3339(),
        });
        self.record(
            "Stop",
            format!("Agent stopped: {}", event.reason),
            format!("Stopped after {} turns", event.num_turns),
            payload,
        )
        .await
    }

    async fn on_subagent_stop(&self, event: SubagentStopEvent) -> Result<(), SdkError> {
        let payload = json!({
            "subagent_id": event.subagent_id,
            "timestamp": utc_now_rfc3339(),
        });
        self.record(
            "SubagentStop",
            format!("Subagent {} completed", event.subagent_id),
            "Subagent completed".to_string(),
            payload,
        )
        .await
    }

    /// Pre-compact also zeroes the agent's token counters: after compaction
    /// the context-window accounting starts over.
    async fn on_pre_compact(&self, event: PreCompactEvent) -> Result<(), SdkError> {
        let payload = json!({
            "tokens_before": event.tokens_before,
            "timestamp": utc_now_rfc3339(),
        });
        self.record(
            "PreCompact",
            format!("Context compaction: {} tokens", event.tokens_before),
            "Context compaction triggered".to_string(),
            payload,
        )
        .await?;

        self.store
            .reset_agent_tokens(self.agent_id)
            .await
            .map_err(|e| SdkError::hook(e.to_string()))?;
        tracing::info!(agent = %self.agent_id, "reset token counters after pre-compact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_preserves_short_strings() {
        assert_eq!(cap("short", 500), "short");
    }

    #[test]
    fn cap_truncates_on_char_boundary() {
        let text = "ü".repeat(400);
        let capped = cap(&text, 501);
        assert!(capped.len() <= 501);
        assert!(text.starts_with(&capped));
    }
}
