//! Postgres-backed store adapter: typed CRUD over orchestrators, agents,
//! chat, agent logs, system logs and prompts behind one shared pool.
//!
//! All operations are scoped by the owning orchestrator id where relevant.
//! Soft delete only; nothing is ever physically removed at runtime.

mod agent_logs;
mod agents;
mod chat;
mod models;
mod orchestrators;
mod prompts;
mod system_logs;

pub use models::{
    AgentLogRow, AgentRow, AgentStatus, ChatRow, CostTotals, LogCategory, OrchestratorRow,
    PromptAuthor, SenderKind, SystemLogRow, TailEntry,
};

use config::Settings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("agent name '{0}' is already in use")]
    DuplicateAgentName(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("agent_id is required when sender or receiver is 'agent'")]
    MissingAgentId,
    #[error("agent_id must be absent when neither sender nor receiver is 'agent'")]
    UnexpectedAgentId,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orchestrator_agents (
    id UUID PRIMARY KEY,
    session_id TEXT UNIQUE,
    system_prompt TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'idle',
    working_dir TEXT,
    input_tokens BIGINT NOT NULL DEFAULT 0,
    output_tokens BIGINT NOT NULL DEFAULT 0,
    total_cost DOUBLE PRECISION NOT NULL DEFAULT 0,
    archived BOOLEAN NOT NULL DEFAULT FALSE,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS agents (
    id UUID PRIMARY KEY,
    orchestrator_agent_id UUID NOT NULL REFERENCES orchestrator_agents(id),
    name TEXT NOT NULL,
    model TEXT NOT NULL,
    system_prompt TEXT NOT NULL,
    working_dir TEXT,
    status TEXT NOT NULL DEFAULT 'idle',
    session_id TEXT,
    input_tokens BIGINT NOT NULL DEFAULT 0,
    output_tokens BIGINT NOT NULL DEFAULT 0,
    total_cost DOUBLE PRECISION NOT NULL DEFAULT 0,
    archived BOOLEAN NOT NULL DEFAULT FALSE,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_agents_owner_name
    ON agents (orchestrator_agent_id, name) WHERE NOT archived;

CREATE TABLE IF NOT EXISTS orchestrator_chat (
    id UUID PRIMARY KEY,
    orchestrator_agent_id UUID NOT NULL REFERENCES orchestrator_agents(id),
    sender_type TEXT NOT NULL,
    receiver_type TEXT NOT NULL,
    message TEXT NOT NULL,
    agent_id UUID REFERENCES agents(id),
    summary TEXT,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_chat_owner_created
    ON orchestrator_chat (orchestrator_agent_id, created_at);

CREATE TABLE IF NOT EXISTS agent_logs (
    id UUID PRIMARY KEY,
    agent_id UUID NOT NULL REFERENCES agents(id),
    session_id TEXT,
    task_slug TEXT NOT NULL,
    entry_index INT NOT NULL,
    event_category TEXT NOT NULL,
    event_type TEXT NOT NULL,
    content TEXT,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    summary TEXT,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_agent_logs_agent_task
    ON agent_logs (agent_id, task_slug, entry_index);

CREATE TABLE IF NOT EXISTS system_logs (
    id UUID PRIMARY KEY,
    file_path TEXT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    summary TEXT,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_system_logs_timestamp ON system_logs (timestamp);

CREATE TABLE IF NOT EXISTS prompts (
    id UUID PRIMARY KEY,
    agent_id UUID NOT NULL REFERENCES agents(id),
    task_slug TEXT NOT NULL,
    author TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    summary TEXT,
    session_id TEXT,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Shared store over a pooled Postgres connection.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connects the pool and bootstraps the schema. Idempotent.
    pub async fn connect(settings: &Settings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(settings.db_min_connections)
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(settings.db_acquire_timeout_secs))
            .connect(&settings.database_url)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Wraps an already-connected pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drains the pool. Call on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
