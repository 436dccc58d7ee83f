//! Per-agent message pump: consumes one SDK turn stream, persisting every
//! assistant block to `agent_logs` and fanning it out as `agent_log` frames.
//! The closing result message yields the session token and usage, and
//! triggers the file-change dossier attachment.

use crate::files::FileTracker;
use crate::hub::EventHub;
use crate::sdk::{AssistantBlock, SdkClient, StreamMessage};
use crate::store::{LogCategory, Store};
use crate::summarizer::{spawn_agent_log_summary, Summarizer};
use crate::RuntimeError;
use serde_json::json;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What one consumed stream produced.
#[derive(Debug, Default)]
pub struct PumpOutcome {
    pub session_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

pub struct MessagePump {
    pub store: Store,
    pub hub: Arc<EventHub>,
    pub summarizer: Arc<Summarizer>,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub task_slug: String,
    pub counter: Arc<AtomicI32>,
    pub tracker: Option<Arc<FileTracker>>,
}

impl MessagePump {
    /// Consumes the stream to completion. Store failures abort the turn.
    pub async fn run(&self, client: &Arc<dyn SdkClient>) -> Result<PumpOutcome, RuntimeError> {
        let mut outcome = PumpOutcome::default();
        let mut last_text_block_id: Option<Uuid> = None;
        let (mut text_blocks, mut thinking_blocks, mut tool_blocks) = (0u32, 0u32, 0u32);

        while let Some(message) = client.next_message().await.map_err(RuntimeError::Sdk)? {
            match message {
                StreamMessage::System { subtype, data } => {
                    tracing::debug!(agent = %self.agent_name, subtype, ?data, "system message");
                }
                StreamMessage::Assistant { blocks } => {
                    for block in blocks {
                        let entry_index = self.counter.fetch_add(1, Ordering::SeqCst);
                        match block {
                            AssistantBlock::Text { text } => {
                                text_blocks += 1;
                                let id = self
                                    .persist_block(
                                        entry_index,
                                        "text",
                                        Some(&text),
                                        json!({"text": text}),
                                    )
                                    .await?;
                                last_text_block_id = Some(id);
                                self.broadcast_block(
                                    id,
                                    entry_index,
                                    "TextBlock",
                                    &text,
                                    &text,
                                    json!({"text": text}),
                                )
                                .await;
                                spawn_agent_log_summary(
                                    Arc::clone(&self.summarizer),
                                    self.store.clone(),
                                    Arc::clone(&self.hub),
                                    id,
                                    self.agent_id,
                                    "text".to_string(),
                                    json!({"content": text}),
                                );
                            }
                            AssistantBlock::Thinking { thinking } => {
                                thinking_blocks += 1;
                                let id = self
                                    .persist_block(
                                        entry_index,
                                        "thinking",
                                        Some(&thinking),
                                        json!({"thinking": thinking}),
                                    )
                                    .await?;
                                self.broadcast_block(
                                    id,
                                    entry_index,
                                    "ThinkingBlock",
                                    &thinking,
                                    "[Agent is thinking]",
                                    json!({"thinking": thinking}),
                                )
                                .await;
                                spawn_agent_log_summary(
                                    Arc::clone(&self.summarizer),
                                    self.store.clone(),
                                    Arc::clone(&self.hub),
                                    id,
                                    self.agent_id,
                                    "thinking".to_string(),
                                    json!({"content": thinking}),
                                );
                            }
                            AssistantBlock::ToolUse { name, input, id: tool_use_id } => {
                                tool_blocks += 1;
                                let payload = json!({
                                    "tool_name": name,
                                    "tool_input": input,
                                    "tool_use_id": tool_use_id,
                                });
                                let id = self
                                    .persist_block(entry_index, "tool_use", None, payload.clone())
                                    .await?;
                                self.broadcast_block(
                                    id,
                                    entry_index,
                                    "ToolUseBlock",
                                    &format!("[Tool] {name}"),
                                    &format!("Using tool: {name}"),
                                    payload.clone(),
                                )
                                .await;
                                spawn_agent_log_summary(
                                    Arc::clone(&self.summarizer),
                                    self.store.clone(),
                                    Arc::clone(&self.hub),
                                    id,
                                    self.agent_id,
                                    "tool_use".to_string(),
                                    json!({"tool_name": name, "tool_input": input}),
                                );
                            }
                        }
                    }
                }
                StreamMessage::Result(info) => {
                    outcome.session_id = Some(info.session_id.clone());
                    let (input, output) = info.token_counts();
                    outcome.input_tokens = input;
                    outcome.output_tokens = output;
                    outcome.cost_usd = info.cost_usd();

                    if let Some(block_id) = last_text_block_id {
                        self.attach_file_dossier(block_id).await;
                    }
                }
            }
        }

        self.apply_costs(&outcome).await;

        tracing::info!(
            agent = %self.agent_name,
            task = %self.task_slug,
            text_blocks,
            thinking_blocks,
            tool_blocks,
            "processed agent stream"
        );
        Ok(outcome)
    }

    async fn persist_block(
        &self,
        entry_index: i32,
        block_type: &str,
        content: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<Uuid, RuntimeError> {
        let id = self
            .store
            .insert_agent_log(
                self.agent_id,
                &self.task_slug,
                entry_index,
                LogCategory::Response,
                block_type,
                content,
                &payload,
                None,
            )
            .await?;
        Ok(id)
    }

    async fn broadcast_block(
        &self,
        id: Uuid,
        entry_index: i32,
        event_type: &str,
        content: &str,
        summary: &str,
        payload: serde_json::Value,
    ) {
        self.hub
            .broadcast_agent_log(json!({
                "id": id.to_string(),
                "agent_id": self.agent_id.to_string(),
                "agent_name": self.agent_name,
                "task_slug": self.task_slug,
                "entry_index": entry_index,
                "event_category": "response",
                "event_type": event_type,
                "content": content,
                "summary": summary,
                "payload": payload,
            }))
            .await;
    }

    /// On the closing message: merge the file-change dossier into the last
    /// text block's payload and emit a synthetic `FileTrackingBlock`.
    /// Best-effort; failures are logged and the turn continues.
    async fn attach_file_dossier(&self, block_id: Uuid) {
        let Some(tracker) = &self.tracker else { return };
        if !tracker.has_activity() {
            return;
        }

        let changes = tracker.generate_file_changes(&self.summarizer).await;
        let reads = tracker.generate_read_files().await;
        if changes.is_empty() && reads.is_empty() {
            return;
        }
        let dossier = FileTracker::dossier(&changes, &reads);

        if let Err(e) = self.store.update_log_payload(block_id, &dossier).await {
            tracing::error!(%block_id, "failed to persist file dossier: {e}");
            return;
        }

        self.hub
            .broadcast_agent_log(json!({
                "id": Uuid::new_v4().to_string(),
                "parent_log_id": block_id.to_string(),
                "agent_id": self.agent_id.to_string(),
                "agent_name": self.agent_name,
                "task_slug": self.task_slug,
                "event_category": "file_tracking",
                "event_type": "FileTrackingBlock",
                "content": format!("{} modified, {} read", changes.len(), reads.len()),
                "summary": format!(
                    "File tracking: {} modified, {} read",
                    changes.len(),
                    reads.len()
                ),
                "payload": dossier,
            }))
            .await;
        tracing::info!(
            agent = %self.agent_name,
            modified = changes.len(),
            read = reads.len(),
            "file dossier attached"
        );
    }

    /// Applies turn usage to the agent row and broadcasts the fresh totals.
    /// A failed cost write is logged, not fatal.
    async fn apply_costs(&self, outcome: &PumpOutcome) {
        if outcome.input_tokens == 0 && outcome.output_tokens == 0 {
            return;
        }
        let update = self
            .store
            .update_agent_costs(
                self.agent_id,
                outcome.input_tokens as i64,
                outcome.output_tokens as i64,
                outcome.cost_usd,
            )
            .await;
        if let Err(e) = update {
            tracing::error!(agent = %self.agent_id, "failed to update agent costs: {e}");
            return;
        }
        match self.store.get_agent(self.agent_id).await {
            Ok(Some(agent)) => {
                self.hub
                    .broadcast_agent_updated(
                        self.agent_id.to_string(),
                        json!({
                            "input_tokens": agent.input_tokens,
                            "output_tokens": agent.output_tokens,
                            "total_cost": agent.total_cost,
                        }),
                    )
                    .await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(agent = %self.agent_id, "failed to reload agent: {e}"),
        }
    }
}
