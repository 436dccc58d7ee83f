//! Chat message operations. Append-only; summaries are filled in later by
//! the background summarizer.

use super::models::{ChatRow, SenderKind};
use super::{Store, StoreError};
use serde_json::Value;
use uuid::Uuid;

impl Store {
    /// Inserts one chat row. `agent_id` must be present exactly when either
    /// party is an agent.
    pub async fn insert_chat_message(
        &self,
        orchestrator_agent_id: Uuid,
        sender: SenderKind,
        receiver: SenderKind,
        message: &str,
        agent_id: Option<Uuid>,
        metadata: &Value,
    ) -> Result<Uuid, StoreError> {
        let agent_involved = sender == SenderKind::Agent || receiver == SenderKind::Agent;
        if agent_involved && agent_id.is_none() {
            return Err(StoreError::MissingAgentId);
        }
        if !agent_involved && agent_id.is_some() {
            return Err(StoreError::UnexpectedAgentId);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO orchestrator_chat
                (id, orchestrator_agent_id, sender_type, receiver_type, message, agent_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7::jsonb)
            "#,
        )
        .bind(id)
        .bind(orchestrator_agent_id)
        .bind(sender.as_str())
        .bind(receiver.as_str())
        .bind(message)
        .bind(agent_id)
        .bind(metadata)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Last `limit` messages in chronological order: queried DESC with
    /// LIMIT/OFFSET, then reversed.
    pub async fn chat_history(
        &self,
        orchestrator_agent_id: Uuid,
        limit: i64,
        offset: i64,
        agent_id: Option<Uuid>,
    ) -> Result<Vec<ChatRow>, StoreError> {
        let mut rows = match agent_id {
            Some(agent) => {
                sqlx::query_as::<_, ChatRow>(
                    "SELECT * FROM orchestrator_chat \
                     WHERE orchestrator_agent_id = $1 AND agent_id = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                )
                .bind(orchestrator_agent_id)
                .bind(agent)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatRow>(
                    "SELECT * FROM orchestrator_chat \
                     WHERE orchestrator_agent_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(orchestrator_agent_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
        };
        rows.reverse();
        Ok(rows)
    }

    /// Newest-first page of chat rows, for the event stream endpoint.
    pub async fn list_chat_desc(
        &self,
        orchestrator_agent_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatRow>, StoreError> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT * FROM orchestrator_chat \
             WHERE orchestrator_agent_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(orchestrator_agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Total message count; the UI derives the turn counter from it.
    pub async fn turn_count(&self, orchestrator_agent_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orchestrator_chat WHERE orchestrator_agent_id = $1",
        )
        .bind(orchestrator_agent_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Deletes every chat row of an orchestrator, returning the count.
    pub async fn delete_chat_history(
        &self,
        orchestrator_agent_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM orchestrator_chat WHERE orchestrator_agent_id = $1")
                .bind(orchestrator_agent_id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_chat_summary(&self, chat_id: Uuid, summary: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE orchestrator_chat SET summary = $1 WHERE id = $2")
            .bind(summary)
            .bind(chat_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
