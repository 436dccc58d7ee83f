//! Worker agent CRUD. `(owner, name)` is unique among non-archived agents;
//! the partial unique index enforces it and duplicates surface as a typed
//! error.

use super::models::{AgentRow, AgentStatus};
use super::{Store, StoreError};
use serde_json::Value;
use uuid::Uuid;

fn map_unique_violation(err: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return StoreError::DuplicateAgentName(name.to_string());
        }
    }
    StoreError::Database(err)
}

impl Store {
    pub async fn create_agent(
        &self,
        orchestrator_agent_id: Uuid,
        name: &str,
        model: &str,
        system_prompt: &str,
        working_dir: &str,
        metadata: &Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO agents (id, orchestrator_agent_id, name, model, system_prompt,
                                working_dir, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, 'idle', $7::jsonb)
            "#,
        )
        .bind(id)
        .bind(orchestrator_agent_id)
        .bind(name)
        .bind(model)
        .bind(system_prompt)
        .bind(working_dir)
        .bind(metadata)
        .execute(self.pool())
        .await
        .map_err(|e| map_unique_violation(e, name))?;
        Ok(id)
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Option<AgentRow>, StoreError> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT * FROM agents WHERE id = $1 AND archived = FALSE",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Lookup by name, scoped to the owning orchestrator.
    pub async fn get_agent_by_name(
        &self,
        orchestrator_agent_id: Uuid,
        name: &str,
    ) -> Result<Option<AgentRow>, StoreError> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT * FROM agents \
             WHERE orchestrator_agent_id = $1 AND name = $2 AND archived = FALSE",
        )
        .bind(orchestrator_agent_id)
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Owner's agents, newest first.
    pub async fn list_agents(
        &self,
        orchestrator_agent_id: Uuid,
        archived: bool,
    ) -> Result<Vec<AgentRow>, StoreError> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT * FROM agents \
             WHERE orchestrator_agent_id = $1 AND archived = $2 \
             ORDER BY created_at DESC",
        )
        .bind(orchestrator_agent_id)
        .bind(archived)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_agent_status(
        &self,
        id: Uuid,
        status: AgentStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_agent_session(
        &self,
        id: Uuid,
        session_id: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET session_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(session_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Adds to the agent's cumulative counters.
    pub async fn update_agent_costs(
        &self,
        id: Uuid,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE agents
            SET input_tokens = input_tokens + $1,
                output_tokens = output_tokens + $2,
                total_cost = total_cost + $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(cost_usd)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Zeroes the agent's counters. Invoked from the pre-compact hook.
    pub async fn reset_agent_tokens(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE agents SET input_tokens = 0, output_tokens = 0, total_cost = 0, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Soft delete: sets `archived = TRUE`, freeing the name for reuse.
    pub async fn soft_delete_agent(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET archived = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn merge_agent_metadata(&self, id: Uuid, updates: &Value) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE agents SET metadata = metadata || $1::jsonb, updated_at = NOW() WHERE id = $2",
        )
        .bind(updates)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Number of log rows per agent, for list enrichment.
    pub async fn count_agent_logs(&self, agent_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM agent_logs WHERE agent_id = $1")
                .bind(agent_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}
