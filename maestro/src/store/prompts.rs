//! Prompt rows: every command dispatched to a worker is recorded verbatim.

use super::models::PromptAuthor;
use super::{Store, StoreError};
use uuid::Uuid;

impl Store {
    pub async fn insert_prompt(
        &self,
        agent_id: Uuid,
        task_slug: &str,
        author: PromptAuthor,
        prompt_text: &str,
        session_id: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO prompts (id, agent_id, task_slug, author, prompt_text, session_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(agent_id)
        .bind(task_slug)
        .bind(author.as_str())
        .bind(prompt_text)
        .bind(session_id)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    pub async fn update_prompt_summary(
        &self,
        prompt_id: Uuid,
        summary: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE prompts SET summary = $1 WHERE id = $2")
            .bind(summary)
            .bind(prompt_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
