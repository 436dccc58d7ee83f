//! Orchestrator service: the three-phase turn.
//!
//! Phase 1 persists the user message and preempts any in-flight turn. Phase
//! 2 streams the SDK session, persisting and broadcasting every block.
//! Phase 3 reconciles session token, usage, and costs. At most one turn is
//! in flight; a newer turn interrupts the older one.

mod history;

use crate::commands::discover_slash_commands;
use crate::economy::{estimate_tokens, ContextMessage, TaskKind, TokenEconomy};
use crate::hub::EventHub;
use crate::manager::AgentManager;
use crate::sdk::{
    AgentOptions, AssistantBlock, Hooks, ResultInfo, SdkClient, SdkConnector, StreamMessage,
};
use crate::store::{SenderKind, Store};
use crate::summarizer::{
    spawn_chat_summary, spawn_system_log_summary, Summarizer,
};
use crate::RuntimeError;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;
use ws_event::{utc_now_rfc3339, WsEvent};

/// Messages of history considered when estimating context tokens for the
/// rate-limit gate.
const RATE_CONTEXT_MESSAGES: i64 = 20;
/// Messages hashed into the response-cache key.
const CACHE_CONTEXT_MESSAGES: i64 = 5;

/// What one completed turn produced.
#[derive(Debug, Default)]
pub struct TurnReport {
    pub response: String,
    pub session_id: Option<String>,
    pub tools_used: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub from_cache: bool,
    pub budget_refused: bool,
}

#[derive(Default)]
struct TurnState {
    active_client: Option<Arc<dyn SdkClient>>,
    is_executing: bool,
}

pub struct OrchestratorService {
    store: Store,
    hub: Arc<EventHub>,
    summarizer: Arc<Summarizer>,
    connector: Arc<dyn SdkConnector>,
    manager: Arc<AgentManager>,
    economy: Option<Arc<TokenEconomy>>,
    working_dir: PathBuf,
    system_prompt: String,
    default_model: String,
    sdk_timeout: Duration,
    /// Current SDK resume token; mirrors the persisted one after phase 3.
    session_id: Mutex<Option<String>>,
    /// True when the process was booted with `--session`: the stored token
    /// is authoritative and must not be rewritten.
    started_with_session: bool,
    system_message_captured: AtomicBool,
    turn: Mutex<TurnState>,
}

impl OrchestratorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        hub: Arc<EventHub>,
        summarizer: Arc<Summarizer>,
        connector: Arc<dyn SdkConnector>,
        manager: Arc<AgentManager>,
        economy: Option<Arc<TokenEconomy>>,
        working_dir: PathBuf,
        system_prompt: String,
        default_model: String,
        sdk_timeout: Duration,
        session_id: Option<String>,
    ) -> Arc<Self> {
        let started_with_session = session_id.is_some();
        Arc::new(Self {
            store,
            hub,
            summarizer,
            connector,
            manager,
            economy,
            working_dir,
            system_prompt,
            default_model,
            sdk_timeout,
            session_id: Mutex::new(session_id),
            started_with_session,
            system_message_captured: AtomicBool::new(false),
            turn: Mutex::new(TurnState::default()),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn economy(&self) -> Option<&Arc<TokenEconomy>> {
        self.economy.as_ref()
    }

    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    /// True while a turn's stream is being consumed.
    pub async fn is_executing(&self) -> bool {
        self.turn.lock().await.is_executing
    }

    /// True when an SDK client is registered as the active turn.
    pub async fn has_active_client(&self) -> bool {
        self.turn.lock().await.active_client.is_some()
    }

    /// Clears the response cache and the rate-limit window; the persisted
    /// session token is untouched. Backs `/api/orchestrator/reset`.
    pub async fn reset_context(&self) {
        if let Some(economy) = self.economy() {
            let cleared = economy.cache.clear().await;
            economy.rate_limiter.reset().await;
            tracing::info!(cleared, "orchestrator context reset");
        }
    }

    /// Runs one user turn end to end.
    pub async fn process_user_message(
        self: &Arc<Self>,
        user_message: &str,
        orchestrator_agent_id: Uuid,
    ) -> Result<TurnReport, RuntimeError> {
        // Phase 1: persist the user message. The UI renders its own send
        // optimistically, so no frame is broadcast for it.
        self.invalidate_history_cache(orchestrator_agent_id).await;
        let chat_id = self
            .store
            .insert_chat_message(
                orchestrator_agent_id,
                SenderKind::User,
                SenderKind::Orchestrator,
                user_message,
                None,
                &json!({}),
            )
            .await?;
        spawn_chat_summary(
            Arc::clone(&self.summarizer),
            self.store.clone(),
            chat_id,
            user_message.to_string(),
        );

        self.interrupt_previous_turn().await;

        // Model tier for this turn.
        let (model, task_kind) = match self.economy() {
            Some(economy) => {
                let tier = economy.selector.select(user_message).await;
                let kind = match tier {
                    crate::economy::ModelTier::Cheap => TaskKind::Simple,
                    crate::economy::ModelTier::Mid => TaskKind::Moderate,
                    crate::economy::ModelTier::Premium => TaskKind::Complex,
                };
                (tier.model().to_string(), kind)
            }
            None => (self.default_model.clone(), TaskKind::Moderate),
        };

        // Phase 2, with the execution state always reset afterwards.
        let executed = self
            .execute_turn(user_message, orchestrator_agent_id, &model, task_kind)
            .await;
        {
            let mut turn = self.turn.lock().await;
            turn.is_executing = false;
            turn.active_client = None;
        }
        let mut report = match executed {
            Ok(report) => report,
            Err(e) => {
                self.hub
                    .broadcast_error(
                        "Orchestrator execution failed",
                        json!({"error": e.to_string()}),
                    )
                    .await;
                self.hub
                    .set_typing_indicator(orchestrator_agent_id.to_string(), false)
                    .await;
                return Err(e);
            }
        };

        if !report.from_cache && !report.budget_refused {
            // Phase 3: session, usage accounting, costs.
            self.reconcile_turn(orchestrator_agent_id, &model, &mut report).await;
        }
        self.hub
            .set_typing_indicator(orchestrator_agent_id.to_string(), false)
            .await;
        Ok(report)
    }

    /// Best-effort interrupt of an in-flight turn; the new turn proceeds
    /// regardless of the outcome.
    async fn interrupt_previous_turn(&self) {
        let client = {
            let turn = self.turn.lock().await;
            if turn.is_executing { turn.active_client.clone() } else { None }
        };
        let Some(client) = client else { return };

        tracing::warn!("orchestrator busy with previous task - interrupting");
        match client.interrupt().await {
            Ok(()) => {
                self.hub
                    .broadcast_system_log(json!({
                        "level": "WARNING",
                        "message":
                            "Previous orchestrator task interrupted - refocusing on new message",
                    }))
                    .await;
            }
            Err(e) => tracing::error!("failed to interrupt orchestrator: {e}"),
        }
    }

    async fn execute_turn(
        self: &Arc<Self>,
        user_message: &str,
        owner: Uuid,
        model: &str,
        task_kind: TaskKind,
    ) -> Result<TurnReport, RuntimeError> {
        let owner_str = owner.to_string();
        self.hub.set_typing_indicator(owner_str.clone(), true).await;

        let cache_key = self.response_cache_key(user_message, owner).await?;
        if let Some(report) = self.try_cached_response(&cache_key, owner).await? {
            return Ok(report);
        }

        if let Some(economy) = self.economy() {
            let estimated = self.estimate_turn_tokens(user_message, owner).await?;

            let (allowed, warning) = economy.budget.check_budget(estimated, task_kind).await;
            if let Some(warning) = &warning {
                self.hub
                    .broadcast_system_log(json!({"level": "WARNING", "message": warning}))
                    .await;
            }
            if !allowed {
                tracing::warn!(estimated, "turn refused by session budget");
                return Ok(TurnReport {
                    response: warning.unwrap_or_else(|| "BUDGET EXCEEDED".to_string()),
                    budget_refused: true,
                    ..Default::default()
                });
            }

            let check = economy.rate_limiter.check_and_wait(estimated).await;
            if check.waited {
                tracing::info!(wait = check.wait_seconds, "proceeding after rate backoff");
            }
        }

        // Open the streaming session.
        let mut options = AgentOptions::for_model(model);
        options.system_prompt = Some(self.system_prompt.clone());
        options.cwd = Some(self.working_dir.to_string_lossy().into_owned());
        options.resume = self.current_session_id().await;
        options.timeout = Some(self.sdk_timeout);
        options.tools = self.manager.management_tools();
        options.hooks = self.orchestrator_hooks();

        let client = self.connector.connect(options).await?;
        {
            let mut turn = self.turn.lock().await;
            turn.active_client = Some(Arc::clone(&client));
            turn.is_executing = true;
        }
        client.query(user_message).await?;

        let mut report = TurnReport::default();
        let mut result: Option<ResultInfo> = None;
        while let Some(message) = client.next_message().await? {
            match message {
                StreamMessage::System { subtype, data } => {
                    self.capture_system_message(owner, &subtype, &data).await?;
                }
                StreamMessage::Assistant { blocks } => {
                    for block in blocks {
                        self.process_block(owner, block, &mut report).await;
                    }
                }
                StreamMessage::Result(info) => result = Some(info),
            }
        }

        self.hub.broadcast_chat_stream(owner_str, String::new(), true).await;

        if let Some(info) = result {
            report.session_id = Some(info.session_id.clone());
            let (input, output) = info.token_counts();
            report.input_tokens = input;
            report.output_tokens = output;
            report.cost_usd = info.cost_usd();
            tracing::info!(
                turns = info.num_turns,
                cost = report.cost_usd,
                "orchestrator turn complete"
            );
        }

        if let Some(economy) = self.economy() {
            economy
                .cache
                .set(
                    &cache_key,
                    json!({
                        "message": report.response,
                        "tools_used": report.tools_used,
                        "usage": {
                            "input_tokens": report.input_tokens,
                            "output_tokens": report.output_tokens,
                            "total_cost_usd": report.cost_usd,
                        },
                    }),
                )
                .await;
        }
        Ok(report)
    }

    /// Orchestrator-side hooks: tool use and stream termination are traced;
    /// the persisted record of orchestrator activity comes from the
    /// assistant blocks themselves.
    fn orchestrator_hooks(&self) -> Hooks {
        Hooks::new()
            .add_pre_tool_use(|ev| async move {
                tracing::info!(tool = %ev.tool_name, "orchestrator pre-tool");
                Ok(())
            })
            .add_post_tool_use(|ev| async move {
                tracing::info!(tool = %ev.tool_name, is_error = ev.is_error, "orchestrator post-tool");
                Ok(())
            })
            .add_stop(|ev| async move {
                tracing::info!(reason = %ev.reason, turns = ev.num_turns, "orchestrator stop");
                Ok(())
            })
    }

    /// Response-cache key: user text plus an MD5 of the last few messages.
    async fn response_cache_key(
        &self,
        user_message: &str,
        owner: Uuid,
    ) -> Result<String, RuntimeError> {
        if self.economy().is_none() {
            return Ok(String::new());
        }
        let recent = self
            .store
            .chat_history(owner, CACHE_CONTEXT_MESSAGES, 0, None)
            .await?;
        let serialized: Vec<String> = recent
            .iter()
            .map(|m| format!("{}:{}", m.sender_type, m.message))
            .collect();
        let context_hash = format!("{:x}", md5::compute(serialized.join("\n").as_bytes()));
        Ok(crate::economy::ResponseCache::generate_key(
            user_message,
            Some(&context_hash),
        ))
    }

    /// Cache hit short-circuits the turn: broadcast the cached body and
    /// close the stream without opening an SDK session.
    async fn try_cached_response(
        &self,
        cache_key: &str,
        owner: Uuid,
    ) -> Result<Option<TurnReport>, RuntimeError> {
        let Some(economy) = self.economy() else { return Ok(None) };
        let Some(cached) = economy.cache.get(cache_key).await else {
            return Ok(None);
        };
        let message = cached.get("message").and_then(Value::as_str).unwrap_or("").to_string();
        tracing::info!("serving orchestrator response from cache");

        let chat_id = self
            .store
            .insert_chat_message(
                owner,
                SenderKind::Orchestrator,
                SenderKind::User,
                &message,
                None,
                &json!({"type": "text_chunk", "cached": true}),
            )
            .await?;
        self.hub
            .broadcast(WsEvent::OrchestratorChat {
                message: json!({
                    "id": chat_id.to_string(),
                    "orchestrator_agent_id": owner.to_string(),
                    "sender_type": "orchestrator",
                    "receiver_type": "user",
                    "message": message,
                    "agent_id": Value::Null,
                    "metadata": {"type": "text_chunk", "cached": true},
                }),
            })
            .await;
        self.hub
            .broadcast_chat_stream(owner.to_string(), String::new(), true)
            .await;

        Ok(Some(TurnReport {
            response: message,
            from_cache: true,
            ..Default::default()
        }))
    }

    /// Context estimate for the rate-limit/budget gates: recent history,
    /// windowed by the trimmer, at four characters per token, plus the new
    /// message.
    async fn estimate_turn_tokens(
        &self,
        user_message: &str,
        owner: Uuid,
    ) -> Result<u64, RuntimeError> {
        let recent = self
            .store
            .chat_history(owner, RATE_CONTEXT_MESSAGES, 0, None)
            .await?;
        let mut history: Vec<ContextMessage> = recent
            .iter()
            .map(|m| ContextMessage::new(m.sender_type.clone(), m.message.clone()))
            .collect();
        if let Some(economy) = self.economy() {
            history = economy.trimmer.trim(&history);
        }
        let context_tokens: u64 = history.iter().map(|m| estimate_tokens(&m.text)).sum();
        Ok(context_tokens + estimate_tokens(user_message))
    }

    /// One stream block: persist, broadcast, schedule summarization.
    /// Failures here are logged; the stream keeps going.
    async fn process_block(&self, owner: Uuid, block: AssistantBlock, report: &mut TurnReport) {
        match block {
            AssistantBlock::Text { text } => {
                report.response.push_str(&text);
                let inserted = self
                    .store
                    .insert_chat_message(
                        owner,
                        SenderKind::Orchestrator,
                        SenderKind::User,
                        &text,
                        None,
                        &json!({"type": "text_chunk"}),
                    )
                    .await;
                let chat_id = match inserted {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("failed to save text chunk: {e}");
                        return;
                    }
                };
                spawn_chat_summary(
                    Arc::clone(&self.summarizer),
                    self.store.clone(),
                    chat_id,
                    text.clone(),
                );
                self.hub
                    .broadcast(WsEvent::OrchestratorChat {
                        message: json!({
                            "id": chat_id.to_string(),
                            "orchestrator_agent_id": owner.to_string(),
                            "sender_type": "orchestrator",
                            "receiver_type": "user",
                            "message": text,
                            "agent_id": Value::Null,
                            "metadata": {"type": "text_chunk"},
                        }),
                    })
                    .await;
            }
            AssistantBlock::Thinking { thinking } => {
                let head: String = thinking.chars().take(100).collect();
                let inserted = self
                    .store
                    .insert_system_log(
                        "INFO",
                        &format!("Orchestrator thinking: {head}..."),
                        &json!({
                            "type": "thinking_block",
                            "thinking": thinking,
                            "orchestrator_agent_id": owner.to_string(),
                        }),
                    )
                    .await;
                let log_id = match inserted {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("failed to save thinking block: {e}");
                        return;
                    }
                };
                spawn_system_log_summary(
                    Arc::clone(&self.summarizer),
                    self.store.clone(),
                    log_id,
                    "thinking".to_string(),
                    json!({"content": thinking}),
                );
                self.hub
                    .broadcast(WsEvent::ThinkingBlock {
                        data: json!({
                            "id": log_id.to_string(),
                            "orchestrator_agent_id": owner.to_string(),
                            "thinking": thinking,
                        }),
                    })
                    .await;
            }
            AssistantBlock::ToolUse { name, input, id } => {
                report.tools_used.push(name.clone());
                tracing::info!(tool = %name, "orchestrator using tool");
                let inserted = self
                    .store
                    .insert_system_log(
                        "INFO",
                        &format!("Orchestrator using tool: {name}"),
                        &json!({
                            "type": "tool_use_block",
                            "tool_name": name,
                            "tool_input": input,
                            "tool_use_id": id,
                            "orchestrator_agent_id": owner.to_string(),
                        }),
                    )
                    .await;
                let log_id = match inserted {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("failed to save tool use block: {e}");
                        return;
                    }
                };
                spawn_system_log_summary(
                    Arc::clone(&self.summarizer),
                    self.store.clone(),
                    log_id,
                    "tool_use".to_string(),
                    json!({"tool_name": name, "tool_input": input}),
                );
                self.hub
                    .broadcast(WsEvent::ToolUseBlock {
                        data: json!({
                            "id": log_id.to_string(),
                            "orchestrator_agent_id": owner.to_string(),
                            "tool_name": name,
                            "tool_input": input,
                            "tool_use_id": id,
                        }),
                    })
                    .await;
            }
        }
    }

    /// First system message of the process: capture session metadata and
    /// discovered slash commands into the orchestrator's metadata.
    async fn capture_system_message(
        &self,
        owner: Uuid,
        subtype: &str,
        data: &Value,
    ) -> Result<(), RuntimeError> {
        if self.system_message_captured.load(Ordering::SeqCst) {
            tracing::debug!("system message already captured");
            return Ok(());
        }
        let slash_commands = discover_slash_commands(&self.working_dir);
        let info = json!({
            "session_id": data.get("session_id").cloned().unwrap_or(Value::Null),
            "cwd": data.get("cwd").cloned().unwrap_or(Value::Null),
            "tools": data.get("tools").cloned().unwrap_or_else(|| json!([])),
            "model": data.get("model").cloned().unwrap_or(Value::Null),
            "subtype": subtype,
            "captured_at": utc_now_rfc3339(),
            "slash_commands": slash_commands,
        });
        self.store
            .merge_orchestrator_metadata(owner, &json!({"system_message_info": info}))
            .await?;
        self.system_message_captured.store(true, Ordering::SeqCst);
        tracing::info!("stored system message info in orchestrator metadata");
        Ok(())
    }

    /// Phase 3: persist the session token (first turn only), record usage
    /// against the economy, and apply the cost delta. Cost-update failures
    /// log and continue; accounting is derivable from the SDK result.
    async fn reconcile_turn(&self, owner: Uuid, model: &str, report: &mut TurnReport) {
        if let Some(session) = report.session_id.clone() {
            *self.session_id.lock().await = Some(session.clone());
            if !self.started_with_session {
                match self.store.update_orchestrator_session(owner, &session).await {
                    Ok(_) => tracing::info!("persisted orchestrator session token"),
                    Err(e) => tracing::error!("failed to persist session token: {e}"),
                }
            }
        }

        if let Some(economy) = self.economy() {
            let total_tokens = report.input_tokens + report.output_tokens;
            economy.rate_limiter.record_usage(total_tokens).await;
            economy.budget.record_usage(total_tokens).await;
            let (_, _, alert) = economy
                .cost_tracker
                .record_usage(&owner.to_string(), report.input_tokens, report.output_tokens, model)
                .await;
            if let Some(alert) = alert {
                self.hub.broadcast_cost_alert(alert.to_payload()).await;
            }
        }

        let update = self
            .store
            .update_orchestrator_costs(
                owner,
                report.input_tokens as i64,
                report.output_tokens as i64,
                report.cost_usd,
            )
            .await;
        match update {
            Ok(totals) => {
                self.hub
                    .broadcast_orchestrator_updated(json!({
                        "id": totals.id.to_string(),
                        "input_tokens": totals.input_tokens,
                        "output_tokens": totals.output_tokens,
                        "total_cost": totals.total_cost,
                        "updated_at": totals.updated_at.to_rfc3339(),
                    }))
                    .await;
            }
            Err(e) => tracing::error!("failed to update orchestrator costs: {e}"),
        }
    }
}
