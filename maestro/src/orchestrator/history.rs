//! Chat-history loader: merges chat rows with the orchestrator's
//! thinking/tool-use action blocks into one chronological view, cached per
//! `(owner, limit)` until the next message invalidates it.

use super::OrchestratorService;
use crate::store::{ChatRow, SystemLogRow};
use crate::RuntimeError;
use serde_json::{json, Value};
use uuid::Uuid;

fn chat_row_json(row: &ChatRow) -> Value {
    json!({
        "id": row.id.to_string(),
        "orchestrator_agent_id": row.orchestrator_agent_id.to_string(),
        "sender_type": row.sender_type,
        "receiver_type": row.receiver_type,
        "message": row.message,
        "agent_id": row.agent_id.map(|id| id.to_string()),
        "metadata": row.metadata,
        "summary": row.summary,
        "created_at": row.created_at.to_rfc3339(),
        "updated_at": row.updated_at.to_rfc3339(),
    })
}

/// Renders a thinking/tool-use system log in the chat-message shape the UI
/// expects: empty text, typed metadata.
fn action_block_json(block: &SystemLogRow, owner: Uuid) -> Option<Value> {
    let metadata = match block.metadata.get("type").and_then(Value::as_str) {
        Some("thinking_block") => json!({
            "type": "thinking",
            "thinking": block.metadata.get("thinking").cloned().unwrap_or(Value::Null),
        }),
        Some("tool_use_block") => json!({
            "type": "tool_use",
            "tool_name": block.metadata.get("tool_name").cloned().unwrap_or(Value::Null),
            "tool_input": block.metadata.get("tool_input").cloned().unwrap_or(Value::Null),
        }),
        _ => return None,
    };
    Some(json!({
        "id": block.id.to_string(),
        "orchestrator_agent_id": owner.to_string(),
        "sender_type": "orchestrator",
        "receiver_type": "user",
        "message": "",
        "agent_id": Value::Null,
        "metadata": metadata,
        "created_at": block.timestamp.to_rfc3339(),
        "updated_at": block.timestamp.to_rfc3339(),
    }))
}

impl OrchestratorService {
    pub(super) fn history_cache_key(owner: Uuid, limit: i64) -> String {
        format!("chat_history:{owner}:{limit}")
    }

    pub(super) fn history_cache_prefix(owner: Uuid) -> String {
        format!("chat_history:{owner}:")
    }

    /// Last `limit` messages plus action blocks, ascending by timestamp,
    /// with the turn count. Served from the response cache when possible.
    pub async fn load_chat_history(
        &self,
        orchestrator_agent_id: Uuid,
        limit: i64,
    ) -> Result<Value, RuntimeError> {
        let cache_key = Self::history_cache_key(orchestrator_agent_id, limit);
        if let Some(economy) = self.economy() {
            if let Some(cached) = economy.cache.get(&cache_key).await {
                return Ok(cached);
            }
        }

        let messages = self.store().chat_history(orchestrator_agent_id, limit, 0, None).await?;
        let blocks = self
            .store()
            .get_orchestrator_action_blocks(orchestrator_agent_id, limit, 0)
            .await?;
        let turn_count = self.store().turn_count(orchestrator_agent_id).await?;

        let mut merged: Vec<Value> = messages.iter().map(chat_row_json).collect();
        merged.extend(
            blocks
                .iter()
                .filter_map(|b| action_block_json(b, orchestrator_agent_id)),
        );
        // RFC 3339 strings sort chronologically.
        merged.sort_by(|a, b| {
            let a_ts = a["created_at"].as_str().unwrap_or("");
            let b_ts = b["created_at"].as_str().unwrap_or("");
            a_ts.cmp(b_ts)
        });

        let result = json!({"messages": merged, "turn_count": turn_count});
        if let Some(economy) = self.economy() {
            economy.cache.set(&cache_key, result.clone()).await;
        }
        Ok(result)
    }

    /// Drops every cached history view of this orchestrator. Called when a
    /// new message lands.
    pub(super) async fn invalidate_history_cache(&self, orchestrator_agent_id: Uuid) {
        if let Some(economy) = self.economy() {
            economy
                .cache
                .clear_pattern(&Self::history_cache_prefix(orchestrator_agent_id))
                .await;
        }
    }
}
