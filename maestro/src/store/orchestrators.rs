//! Orchestrator operations. At most one non-archived orchestrator exists per
//! process lifetime; the session token is set exactly once.

use super::models::{AgentStatus, CostTotals, OrchestratorRow};
use super::{Store, StoreError};
use serde_json::Value;
use uuid::Uuid;

impl Store {
    /// The active (non-archived) orchestrator, if any.
    pub async fn get_active_orchestrator(&self) -> Result<Option<OrchestratorRow>, StoreError> {
        let row = sqlx::query_as::<_, OrchestratorRow>(
            "SELECT * FROM orchestrator_agents WHERE archived = FALSE LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_orchestrator_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<OrchestratorRow>, StoreError> {
        let row = sqlx::query_as::<_, OrchestratorRow>(
            "SELECT * FROM orchestrator_agents WHERE id = $1 AND archived = FALSE",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Resolves the orchestrator owning the given SDK session token.
    pub async fn get_orchestrator_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrchestratorRow>, StoreError> {
        let row = sqlx::query_as::<_, OrchestratorRow>(
            "SELECT * FROM orchestrator_agents WHERE session_id = $1 AND archived = FALSE",
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Always creates a new orchestrator; the session token starts NULL and
    /// is filled in after the first turn.
    pub async fn create_orchestrator(
        &self,
        system_prompt: &str,
        working_dir: &str,
    ) -> Result<OrchestratorRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO orchestrator_agents (id, session_id, system_prompt, status, working_dir, metadata)
            VALUES ($1, NULL, $2, 'idle', $3, '{}'::jsonb)
            "#,
        )
        .bind(id)
        .bind(system_prompt)
        .bind(working_dir)
        .execute(self.pool())
        .await?;

        self.get_orchestrator_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("orchestrator {id}")))
    }

    /// Sets the SDK session token, but only while the stored token is NULL.
    /// Affects zero or one rows; returns the fresh record either way.
    pub async fn update_orchestrator_session(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<Option<OrchestratorRow>, StoreError> {
        sqlx::query(
            r#"
            UPDATE orchestrator_agents
            SET session_id = $1, updated_at = NOW()
            WHERE id = $2 AND session_id IS NULL
            "#,
        )
        .bind(session_id)
        .bind(id)
        .execute(self.pool())
        .await?;
        self.get_orchestrator_by_id(id).await
    }

    /// Adds to the cumulative token/cost counters of exactly this
    /// orchestrator and returns rows-affected plus the new totals.
    pub async fn update_orchestrator_costs(
        &self,
        id: Uuid,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Result<CostTotals, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orchestrator_agents
            SET input_tokens = input_tokens + $1,
                output_tokens = output_tokens + $2,
                total_cost = total_cost + $3,
                updated_at = NOW()
            WHERE id = $4 AND archived = FALSE
            "#,
        )
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(cost_usd)
        .bind(id)
        .execute(self.pool())
        .await?;

        let row = self
            .get_orchestrator_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("orchestrator {id}")))?;

        Ok(CostTotals {
            rows_updated: result.rows_affected(),
            id: row.id,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            total_cost: row.total_cost,
            updated_at: row.updated_at,
        })
    }

    pub async fn update_orchestrator_status(
        &self,
        id: Uuid,
        status: AgentStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orchestrator_agents SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND archived = FALSE",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// JSONB-merges the given map into the orchestrator metadata.
    pub async fn merge_orchestrator_metadata(
        &self,
        id: Uuid,
        updates: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orchestrator_agents SET metadata = metadata || $1::jsonb, updated_at = NOW() \
             WHERE id = $2 AND archived = FALSE",
        )
        .bind(updates)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
