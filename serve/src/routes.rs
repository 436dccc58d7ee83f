//! REST handlers: thin adapters from requests to the runtime components.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use maestro::{AgentManager, RuntimeError, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use ws_event::utc_now_rfc3339;

use super::app::AppState;

pub(crate) struct ApiError(StatusCode, String);

impl ApiError {
    fn internal(msg: impl Into<String>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, msg.into())
    }

    fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }

    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({"status": "error", "detail": self.1}))).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "maestro",
        "websocket_connections": state.hub.connection_count().await,
    }))
}

/// Fresh orchestrator record plus discovered slash commands, agent
/// templates, and the management tool signatures.
pub(crate) async fn get_orchestrator(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let orch = state
        .store
        .get_orchestrator_by_id(state.orchestrator_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Orchestrator not found"))?;

    let working_dir = state.manager.working_dir().clone();
    let slash_commands = maestro::commands::discover_slash_commands(&working_dir);
    let templates = state.manager.templates().list();

    // Until the first turn captures a system message, serve a fallback.
    let mut metadata = orch.metadata.clone();
    if metadata.get("system_message_info").map_or(true, Value::is_null) {
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert(
                "system_message_info".to_string(),
                json!({
                    "session_id": orch.session_id,
                    "cwd": orch.working_dir.clone()
                        .unwrap_or_else(|| working_dir.to_string_lossy().into_owned()),
                    "captured_at": Value::Null,
                    "subtype": "fallback",
                }),
            );
        }
    }

    Ok(Json(json!({
        "status": "success",
        "orchestrator": {
            "id": orch.id.to_string(),
            "session_id": orch.session_id,
            "status": orch.status,
            "working_dir": orch.working_dir,
            "input_tokens": orch.input_tokens,
            "output_tokens": orch.output_tokens,
            "total_cost": orch.total_cost,
            "metadata": metadata,
        },
        "slash_commands": slash_commands,
        "agent_templates": templates,
        "orchestrator_tools": AgentManager::tool_signatures(),
    })))
}

pub(crate) async fn get_headers(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "cwd": state.manager.working_dir().to_string_lossy(),
    }))
}

#[derive(Deserialize)]
pub(crate) struct LoadChatRequest {
    orchestrator_agent_id: String,
    limit: Option<i64>,
}

pub(crate) async fn load_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let owner = parse_uuid(&request.orchestrator_agent_id)?;
    let limit = request.limit.unwrap_or(state.settings.chat_history_limit);
    let result = state.service.load_chat_history(owner, limit).await?;
    Ok(Json(json!({
        "status": "success",
        "messages": result["messages"],
        "turn_count": result["turn_count"],
    })))
}

#[derive(Deserialize)]
pub(crate) struct SendChatRequest {
    message: String,
    orchestrator_agent_id: String,
}

/// Schedules the turn and returns immediately; streaming happens over WS.
pub(crate) async fn send_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let owner = parse_uuid(&request.orchestrator_agent_id)?;
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        if let Err(e) = service.process_user_message(&request.message, owner).await {
            tracing::error!("orchestrator turn failed: {e}");
        }
    });
    Ok(Json(json!({
        "status": "success",
        "message": "Message received, processing with streaming",
    })))
}

#[derive(Deserialize)]
pub(crate) struct EventsQuery {
    agent_id: Option<String>,
    task_slug: Option<String>,
    #[serde(default = "default_event_types")]
    event_types: String,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_event_types() -> String {
    "all".to_string()
}

fn default_limit() -> i64 {
    50
}

fn event_sort_key(event: &Value) -> String {
    event
        .get("timestamp")
        .or_else(|| event.get("created_at"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Merged event stream: agent logs and orchestrator chat by default, system
/// logs on request. Sorted newest-first for limiting, returned oldest-first.
pub(crate) async fn get_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let requested: Vec<&str> = if query.event_types == "all" {
        vec!["agent_logs", "orchestrator_chat"]
    } else {
        query.event_types.split(',').map(str::trim).collect()
    };

    let mut events: Vec<Value> = Vec::new();

    if requested.contains(&"agent_logs") {
        let logs = match &query.agent_id {
            Some(raw) => {
                let agent_id = parse_uuid(raw)?;
                state
                    .store
                    .get_agent_logs(agent_id, query.task_slug.as_deref(), query.limit, query.offset)
                    .await?
            }
            None => {
                state
                    .store
                    .list_owner_agent_logs(state.orchestrator_id, query.limit, query.offset)
                    .await?
            }
        };
        for log in logs {
            let mut value = serde_json::to_value(log).map_err(|e| ApiError::internal(e.to_string()))?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("sourceType".to_string(), json!("agent_log"));
            }
            events.push(value);
        }
    }

    if requested.contains(&"system_logs") {
        let logs = state
            .store
            .list_system_logs(query.limit, query.offset, None, None)
            .await?;
        for log in logs {
            let mut value = serde_json::to_value(log).map_err(|e| ApiError::internal(e.to_string()))?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("sourceType".to_string(), json!("system_log"));
            }
            events.push(value);
        }
    }

    if requested.contains(&"orchestrator_chat") {
        let rows = state
            .store
            .list_chat_desc(state.orchestrator_id, query.limit, query.offset)
            .await?;
        for row in rows {
            let mut value = serde_json::to_value(row).map_err(|e| ApiError::internal(e.to_string()))?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("sourceType".to_string(), json!("orchestrator_chat"));
            }
            events.push(value);
        }
    }

    events.sort_by(|a, b| event_sort_key(b).cmp(&event_sort_key(a)));
    events.truncate(query.limit.max(0) as usize);
    events.reverse();

    Ok(Json(json!({
        "status": "success",
        "count": events.len(),
        "events": events,
    })))
}

/// Non-archived agents enriched with their log counts.
pub(crate) async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let agents = state.store.list_agents(state.orchestrator_id, false).await?;
    let mut enriched = Vec::with_capacity(agents.len());
    for agent in agents {
        let log_count = state.store.count_agent_logs(agent.id).await?;
        let mut value = serde_json::to_value(agent).map_err(|e| ApiError::internal(e.to_string()))?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("log_count".to_string(), json!(log_count));
        }
        enriched.push(value);
    }
    Ok(Json(json!({"status": "success", "agents": enriched})))
}

/// Clears caches and rate state, reloads the orchestrator. Never creates a
/// new orchestrator.
pub(crate) async fn reset_orchestrator(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    state.service.reset_context().await;
    let orch = state
        .store
        .get_orchestrator_by_id(state.orchestrator_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Orchestrator not found"))?;
    Ok(Json(json!({
        "success": true,
        "message": "Orchestrator context reset successfully",
        "orchestrator_id": orch.id.to_string(),
        "session_id": orch.session_id,
        "timestamp": utc_now_rfc3339(),
    })))
}

pub(crate) async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.service.economy() {
        Some(economy) => {
            let cleared = economy.cache.clear().await;
            Json(json!({"success": true, "entries_cleared": cleared}))
        }
        None => Json(json!({"success": false, "error": "Response cache not available"})),
    }
}

pub(crate) async fn token_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.service.economy() {
        Some(economy) => Json(economy.token_metrics().await),
        None => Json(json!({"enabled": false, "error": "Token economy disabled"})),
    }
}

pub(crate) async fn cache_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.service.economy() {
        Some(economy) => Json(json!({
            "enabled": true,
            "stats": economy.cache.stats().await,
            "timestamp": utc_now_rfc3339(),
        })),
        None => Json(json!({"enabled": false, "error": "Response cache not available"})),
    }
}

pub(crate) async fn cost_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.service.economy() {
        Some(economy) => Json(json!({
            "enabled": true,
            "costs": economy.cost_tracker.global_stats().await,
            "budget": economy.budget.stats().await,
            "timestamp": utc_now_rfc3339(),
        })),
        None => Json(json!({"enabled": false, "error": "Cost tracker not available"})),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid UUID: {raw}")))
}
