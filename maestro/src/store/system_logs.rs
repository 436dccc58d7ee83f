//! System log operations: application events plus the orchestrator's own
//! thinking/tool-use blocks (typed through `metadata.type`).

use super::models::SystemLogRow;
use super::{Store, StoreError};
use serde_json::Value;
use uuid::Uuid;

impl Store {
    pub async fn insert_system_log(
        &self,
        level: &str,
        message: &str,
        metadata: &Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO system_logs (id, level, message, metadata) \
             VALUES ($1, $2, $3, $4::jsonb)",
        )
        .bind(id)
        .bind(level)
        .bind(message)
        .bind(metadata)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Newest-first page with optional case-insensitive message filter and
    /// level equality.
    pub async fn list_system_logs(
        &self,
        limit: i64,
        offset: i64,
        message_contains: Option<&str>,
        level: Option<&str>,
    ) -> Result<Vec<SystemLogRow>, StoreError> {
        let message_filter = message_contains
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let level_filter = level
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase);

        let rows = sqlx::query_as::<_, SystemLogRow>(
            r#"
            SELECT * FROM system_logs
            WHERE ($1::text IS NULL OR message ILIKE $1)
              AND ($2::text IS NULL OR level = $2)
            ORDER BY timestamp DESC LIMIT $3 OFFSET $4
            "#,
        )
        .bind(message_filter)
        .bind(level_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// The orchestrator's thinking/tool-use blocks, newest first.
    pub async fn get_orchestrator_action_blocks(
        &self,
        orchestrator_agent_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SystemLogRow>, StoreError> {
        let rows = sqlx::query_as::<_, SystemLogRow>(
            r#"
            SELECT * FROM system_logs
            WHERE metadata->>'orchestrator_agent_id' = $1
              AND metadata->>'type' IN ('thinking_block', 'tool_use_block')
            ORDER BY timestamp DESC LIMIT $2 OFFSET $3
            "#,
        )
        .bind(orchestrator_agent_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_system_log_summary(
        &self,
        log_id: Uuid,
        summary: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE system_logs SET summary = $1 WHERE id = $2")
            .bind(summary)
            .bind(log_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
