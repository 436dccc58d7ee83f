//! Row types and the small closed vocabularies used across the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Execution status shared by orchestrators and agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Executing,
    Waiting,
    Blocked,
    Complete,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Executing => "executing",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Blocked => "blocked",
            AgentStatus::Complete => "complete",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Party of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderKind {
    User,
    Orchestrator,
    Agent,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::User => "user",
            SenderKind::Orchestrator => "orchestrator",
            SenderKind::Agent => "agent",
        }
    }
}

/// Category of an agent log row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCategory {
    Hook,
    Response,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Hook => "hook",
            LogCategory::Response => "response",
        }
    }
}

/// Author of a persisted prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptAuthor {
    Engineer,
    OrchestratorAgent,
}

impl PromptAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptAuthor::Engineer => "engineer",
            PromptAuthor::OrchestratorAgent => "orchestrator_agent",
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrchestratorRow {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub system_prompt: String,
    pub status: String,
    pub working_dir: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub archived: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub orchestrator_agent_id: Uuid,
    pub name: String,
    pub model: String,
    pub system_prompt: String,
    pub working_dir: Option<String>,
    pub status: String,
    pub session_id: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub archived: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ChatRow {
    pub id: Uuid,
    pub orchestrator_agent_id: Uuid,
    pub sender_type: String,
    pub receiver_type: String,
    pub message: String,
    pub agent_id: Option<Uuid>,
    pub summary: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct AgentLogRow {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub session_id: Option<String>,
    pub task_slug: String,
    pub entry_index: i32,
    pub event_category: String,
    pub event_type: String,
    pub content: Option<String>,
    pub payload: Value,
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct SystemLogRow {
    pub id: Uuid,
    pub file_path: Option<String>,
    pub level: String,
    pub message: String,
    pub summary: Option<String>,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// Tail entry of one task: either summaries only or the raw payload view.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct TailEntry {
    pub entry_index: i32,
    pub event_category: String,
    pub event_type: String,
    pub content: Option<String>,
    pub payload: Option<Value>,
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of an incremental cost update: rows touched plus fresh totals.
#[derive(Clone, Debug, Serialize)]
pub struct CostTotals {
    pub rows_updated: u64,
    pub id: Uuid,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost: f64,
    pub updated_at: DateTime<Utc>,
}
