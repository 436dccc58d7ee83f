//! Agent log operations. Rows are append-only; only `summary` and the JSONB
//! `payload` (merge) are ever updated after insertion.

use super::models::{AgentLogRow, LogCategory, TailEntry};
use super::{Store, StoreError};
use serde_json::Value;
use uuid::Uuid;

impl Store {
    /// Inserts one log row (hook event or response block).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_agent_log(
        &self,
        agent_id: Uuid,
        task_slug: &str,
        entry_index: i32,
        category: LogCategory,
        event_type: &str,
        content: Option<&str>,
        payload: &Value,
        session_id: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO agent_logs
                (id, agent_id, session_id, task_slug, entry_index,
                 event_category, event_type, content, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb)
            "#,
        )
        .bind(id)
        .bind(agent_id)
        .bind(session_id)
        .bind(task_slug)
        .bind(entry_index)
        .bind(category.as_str())
        .bind(event_type)
        .bind(content)
        .bind(payload)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    pub async fn update_log_summary(&self, log_id: Uuid, summary: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE agent_logs SET summary = $1 WHERE id = $2")
            .bind(summary)
            .bind(log_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// JSONB-merges into the stored payload (file-change dossier attachment).
    pub async fn update_log_payload(&self, log_id: Uuid, payload: &Value) -> Result<(), StoreError> {
        sqlx::query("UPDATE agent_logs SET payload = payload || $1::jsonb WHERE id = $2")
            .bind(payload)
            .bind(log_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Logs for one agent. With a task slug: ascending by entry index.
    /// Without: newest first across tasks.
    pub async fn get_agent_logs(
        &self,
        agent_id: Uuid,
        task_slug: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AgentLogRow>, StoreError> {
        let rows = match task_slug {
            Some(slug) => {
                sqlx::query_as::<_, AgentLogRow>(
                    "SELECT * FROM agent_logs \
                     WHERE agent_id = $1 AND task_slug = $2 \
                     ORDER BY entry_index ASC LIMIT $3 OFFSET $4",
                )
                .bind(agent_id)
                .bind(slug)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, AgentLogRow>(
                    "SELECT * FROM agent_logs WHERE agent_id = $1 \
                     ORDER BY timestamp DESC LIMIT $2 OFFSET $3",
                )
                .bind(agent_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    /// All logs of an orchestrator's agents, newest first.
    pub async fn list_owner_agent_logs(
        &self,
        orchestrator_agent_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AgentLogRow>, StoreError> {
        let rows = sqlx::query_as::<_, AgentLogRow>(
            r#"
            SELECT al.* FROM agent_logs al
            JOIN agents a ON al.agent_id = a.id
            WHERE a.orchestrator_agent_id = $1
            ORDER BY al.timestamp DESC LIMIT $2 OFFSET $3
            "#,
        )
        .bind(orchestrator_agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Last `count` summarized events of one task, oldest first on return.
    pub async fn get_tail_summaries(
        &self,
        agent_id: Uuid,
        task_slug: &str,
        count: i64,
        offset: i64,
    ) -> Result<Vec<TailEntry>, StoreError> {
        let mut rows = sqlx::query_as::<_, TailEntry>(
            "SELECT entry_index, event_category, event_type, NULL::text as content, \
                    NULL::jsonb as payload, summary, timestamp \
             FROM agent_logs \
             WHERE agent_id = $1 AND task_slug = $2 AND summary IS NOT NULL \
             ORDER BY entry_index DESC LIMIT $3 OFFSET $4",
        )
        .bind(agent_id)
        .bind(task_slug)
        .bind(count)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Last `count` events of one task with full payloads, oldest first.
    pub async fn get_tail_raw(
        &self,
        agent_id: Uuid,
        task_slug: &str,
        count: i64,
        offset: i64,
    ) -> Result<Vec<TailEntry>, StoreError> {
        let mut rows = sqlx::query_as::<_, TailEntry>(
            "SELECT entry_index, event_category, event_type, content, \
                    payload, summary, timestamp \
             FROM agent_logs \
             WHERE agent_id = $1 AND task_slug = $2 \
             ORDER BY entry_index DESC LIMIT $3 OFFSET $4",
        )
        .bind(agent_id)
        .bind(task_slug)
        .bind(count)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Most recently active task slug of an agent.
    pub async fn get_latest_task_slug(&self, agent_id: Uuid) -> Result<Option<String>, StoreError> {
        let slug: Option<String> = sqlx::query_scalar(
            "SELECT task_slug FROM agent_logs WHERE agent_id = $1 \
             GROUP BY task_slug ORDER BY MAX(timestamp) DESC LIMIT 1",
        )
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(slug)
    }
}
