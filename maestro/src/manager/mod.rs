//! Agent manager: worker lifecycle, the active-clients registry, and the
//! eight management tools the orchestrator drives workers with.

mod pump;
mod tools;

pub use pump::{MessagePump, PumpOutcome};

use crate::files::FileTracker;
use crate::hooks::HookRuntime;
use crate::hub::EventHub;
use crate::sdk::{AgentOptions, SdkClient, SdkConnector};
use crate::slug::task_slug;
use crate::store::{AgentRow, AgentStatus, PromptAuthor, Store};
use crate::summarizer::{spawn_prompt_summary, Summarizer};
use crate::RuntimeError;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::templates::TemplateRegistry;

/// Default tool surface for workers created without a template.
const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Read", "Write", "Edit", "Bash", "Glob", "Grep", "Task", "WebFetch", "WebSearch",
    "BashOutput", "SlashCommand", "TodoWrite", "KillShell", "AskUserQuestion", "Skill",
];
const DEFAULT_DISALLOWED_TOOLS: &[&str] = &["NotebookEdit", "ExitPlanMode"];

/// Greeting used for the initial turn that captures a session token.
const GREETING_PROMPT: &str = "Ready. Awaiting instructions.";

fn resolve_model_alias(model: &str) -> String {
    match model.to_lowercase().as_str() {
        "sonnet" => "claude-sonnet-4-5-20250929".to_string(),
        "haiku" | "fast" => "claude-haiku-4-5-20251001".to_string(),
        _ => model.to_string(),
    }
}

/// Result of a successful `create_agent`.
#[derive(Debug)]
pub struct CreatedAgent {
    pub agent_id: Uuid,
    pub session_id: Option<String>,
    pub model: String,
}

pub struct AgentManager {
    pub orchestrator_agent_id: Uuid,
    store: Store,
    hub: Arc<EventHub>,
    summarizer: Arc<Summarizer>,
    connector: Arc<dyn SdkConnector>,
    working_dir: PathBuf,
    default_agent_model: String,
    max_agent_turns: u32,
    max_context_tokens: u64,
    sdk_timeout: Duration,
    /// Agents currently executing, keyed by name. Guards interrupts.
    active_clients: Mutex<HashMap<String, Arc<dyn SdkClient>>>,
    file_trackers: DashMap<Uuid, Arc<FileTracker>>,
    templates: TemplateRegistry,
}

impl AgentManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator_agent_id: Uuid,
        store: Store,
        hub: Arc<EventHub>,
        summarizer: Arc<Summarizer>,
        connector: Arc<dyn SdkConnector>,
        working_dir: PathBuf,
        default_agent_model: String,
        max_agent_turns: u32,
        max_context_tokens: u64,
        sdk_timeout: Duration,
    ) -> Arc<Self> {
        let templates = TemplateRegistry::discover(&working_dir);
        if templates.is_empty() {
            tracing::warn!("no subagent templates available; agents must be created manually");
        }
        Arc::new(Self {
            orchestrator_agent_id,
            store,
            hub,
            summarizer,
            connector,
            working_dir,
            default_agent_model,
            max_agent_turns,
            max_context_tokens,
            sdk_timeout,
            active_clients: Mutex::new(HashMap::new()),
            file_trackers: DashMap::new(),
            templates,
        })
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    fn tracker_for(&self, agent_id: Uuid, agent_name: &str, working_dir: &str) -> Arc<FileTracker> {
        self.file_trackers
            .entry(agent_id)
            .or_insert_with(|| Arc::new(FileTracker::new(agent_id, agent_name, working_dir)))
            .clone()
    }

    fn build_runtime(
        self: &Arc<Self>,
        agent_id: Uuid,
        agent_name: &str,
        task_slug: &str,
        session_id: Option<String>,
        counter: Arc<AtomicI32>,
        tracker: Option<Arc<FileTracker>>,
    ) -> Arc<HookRuntime> {
        HookRuntime::new(
            agent_id,
            agent_name,
            task_slug,
            session_id,
            counter,
            self.store.clone(),
            Arc::clone(&self.hub),
            Arc::clone(&self.summarizer),
            tracker,
        )
    }

    fn pump_for(
        self: &Arc<Self>,
        agent_id: Uuid,
        agent_name: &str,
        task_slug: &str,
        counter: Arc<AtomicI32>,
        tracker: Option<Arc<FileTracker>>,
    ) -> MessagePump {
        MessagePump {
            store: self.store.clone(),
            hub: Arc::clone(&self.hub),
            summarizer: Arc::clone(&self.summarizer),
            agent_id,
            agent_name: agent_name.to_string(),
            task_slug: task_slug.to_string(),
            counter,
            tracker,
        }
    }

    /// Creates a worker: validates the name, applies a template when given,
    /// persists the row, runs the greeting turn to capture a session token,
    /// and broadcasts the creation.
    pub async fn create_agent(
        self: &Arc<Self>,
        name: &str,
        system_prompt: &str,
        model: Option<&str>,
        subagent_template: Option<&str>,
    ) -> Result<CreatedAgent, RuntimeError> {
        let mut system_prompt = system_prompt.to_string();
        let mut model = model.map(resolve_model_alias);
        let mut allowed_tools: Option<Vec<String>> = None;
        let mut metadata = json!({});

        if let Some(template_name) = subagent_template {
            let Some(template) = self.templates.get(template_name) else {
                let available = self.templates.available_names();
                let listed = if available.is_empty() {
                    "None - create templates in .claude/agents/".to_string()
                } else {
                    available.join(", ")
                };
                return Err(RuntimeError::invalid(format!(
                    "Template '{template_name}' not found. Available: {listed}"
                )));
            };
            system_prompt = template.prompt_body.clone();
            if let Some(template_model) = &template.frontmatter.model {
                model = Some(resolve_model_alias(template_model));
            }
            if !template.frontmatter.tools.is_empty() {
                allowed_tools = Some(template.frontmatter.tools.clone());
            }
            metadata = json!({
                "template_name": template.frontmatter.name,
                "template_color": template.frontmatter.color,
                "allowed_tools": template.frontmatter.tools,
            });
        }

        if system_prompt.is_empty() {
            return Err(RuntimeError::invalid(
                "Either 'system_prompt' or 'subagent_template' must be provided",
            ));
        }

        if self
            .store
            .get_agent_by_name(self.orchestrator_agent_id, name)
            .await?
            .is_some()
        {
            tracing::warn!(name, "attempted to create agent with duplicate name");
            return Err(RuntimeError::invalid(format!(
                "Agent name '{name}' is already in use. Please choose a different name."
            )));
        }

        let model = model.unwrap_or_else(|| self.default_agent_model.clone());
        let working_dir = self.working_dir.to_string_lossy().into_owned();
        let agent_id = self
            .store
            .create_agent(
                self.orchestrator_agent_id,
                name,
                &model,
                &system_prompt,
                &working_dir,
                &metadata,
            )
            .await?;

        let tracker = self.tracker_for(agent_id, name, &working_dir);

        // Initial greeting turn: obtains the worker's session token.
        let slug = format!("{name}-greeting");
        let counter = Arc::new(AtomicI32::new(0));
        let runtime =
            self.build_runtime(agent_id, name, &slug, None, Arc::clone(&counter), Some(tracker.clone()));

        let mut options = AgentOptions::for_model(&model);
        options.system_prompt = Some(system_prompt);
        options.cwd = Some(working_dir);
        options.allowed_tools = allowed_tools.unwrap_or_else(|| {
            DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect()
        });
        options.disallowed_tools =
            DEFAULT_DISALLOWED_TOOLS.iter().map(|t| t.to_string()).collect();
        options.timeout = Some(self.sdk_timeout);
        options.hooks = runtime.install();

        let client = self.connector.connect(options).await?;
        client.query(GREETING_PROMPT).await?;
        let outcome = self
            .pump_for(agent_id, name, &slug, counter, Some(tracker))
            .run(&client)
            .await?;

        if let Some(session) = outcome.session_id.as_deref() {
            self.store.update_agent_session(agent_id, Some(session)).await?;
        }

        self.hub
            .broadcast_agent_created(json!({
                "id": agent_id.to_string(),
                "name": name,
                "model": model,
                "status": "idle",
            }))
            .await;
        tracing::info!(name, %agent_id, "created agent");

        Ok(CreatedAgent { agent_id, session_id: outcome.session_id, model })
    }

    /// Executes one command on a worker. Runs to completion; callers that
    /// need fire-and-forget semantics spawn this. Status transitions:
    /// `executing` on entry, `idle` on clean exit, `blocked` on error; the
    /// active-clients entry is removed on both paths.
    pub async fn command_agent(
        self: &Arc<Self>,
        agent_id: Uuid,
        command: &str,
        slug: &str,
    ) -> Result<(), RuntimeError> {
        let agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| RuntimeError::invalid("Agent not found"))?;

        let result = self.run_command(&agent, command, slug).await;
        if let Err(e) = &result {
            tracing::error!(agent = %agent.name, "command failed: {e}");
            self.active_clients.lock().await.remove(&agent.name);
            self.store.update_agent_status(agent_id, AgentStatus::Blocked).await?;
        }
        result
    }

    async fn run_command(
        self: &Arc<Self>,
        agent: &AgentRow,
        command: &str,
        slug: &str,
    ) -> Result<(), RuntimeError> {
        let working_dir = agent
            .working_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.to_string_lossy().into_owned());
        let tracker = self.tracker_for(agent.id, &agent.name, &working_dir);
        let counter = Arc::new(AtomicI32::new(0));

        let prompt_id = self
            .store
            .insert_prompt(
                agent.id,
                slug,
                PromptAuthor::OrchestratorAgent,
                command,
                agent.session_id.as_deref(),
            )
            .await?;
        spawn_prompt_summary(
            Arc::clone(&self.summarizer),
            self.store.clone(),
            prompt_id,
            command.to_string(),
        );

        let runtime = self.build_runtime(
            agent.id,
            &agent.name,
            slug,
            agent.session_id.clone(),
            Arc::clone(&counter),
            Some(tracker.clone()),
        );

        let mut options = AgentOptions::for_model(&agent.model);
        options.system_prompt = Some(agent.system_prompt.clone());
        options.cwd = Some(working_dir);
        options.resume = agent.session_id.clone();
        options.max_turns = Some(self.max_agent_turns);
        options.allowed_tools =
            DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect();
        options.disallowed_tools =
            DEFAULT_DISALLOWED_TOOLS.iter().map(|t| t.to_string()).collect();
        options.timeout = Some(self.sdk_timeout);
        options.hooks = runtime.install();

        self.store.update_agent_status(agent.id, AgentStatus::Executing).await?;
        self.hub
            .broadcast_agent_status_change(agent.id.to_string(), "idle", "executing")
            .await;

        let client = self.connector.connect(options).await?;
        self.active_clients
            .lock()
            .await
            .insert(agent.name.clone(), Arc::clone(&client));

        client.query(command).await?;
        let outcome = self
            .pump_for(agent.id, &agent.name, slug, counter, Some(tracker))
            .run(&client)
            .await?;

        self.active_clients.lock().await.remove(&agent.name);

        if let Some(session) = outcome.session_id.as_deref() {
            self.store.update_agent_session(agent.id, Some(session)).await?;
        }
        self.store.update_agent_status(agent.id, AgentStatus::Idle).await?;
        self.hub
            .broadcast_agent_status_change(agent.id.to_string(), "executing", "idle")
            .await;

        tracing::info!(agent = %agent.name, task = slug, "agent completed task");
        Ok(())
    }

    /// Dispatches a command in the background and returns its task slug
    /// immediately.
    pub async fn dispatch_command(
        self: &Arc<Self>,
        agent_name: &str,
        command: &str,
    ) -> Result<String, RuntimeError> {
        let agent = self
            .store
            .get_agent_by_name(self.orchestrator_agent_id, agent_name)
            .await?
            .ok_or_else(|| RuntimeError::invalid(format!("Agent '{agent_name}' not found")))?;

        let slug = task_slug(command);
        let manager = Arc::clone(self);
        let command = command.to_string();
        let slug_for_task = slug.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.command_agent(agent.id, &command, &slug_for_task).await {
                tracing::error!(agent = %agent.name, "background command failed: {e}");
            }
        });
        Ok(slug)
    }

    /// Text report of an agent's status plus the tail of its latest task.
    pub async fn agent_status_report(
        &self,
        agent_name: &str,
        tail_count: i64,
        offset: i64,
        verbose: bool,
    ) -> Result<String, RuntimeError> {
        let agent = self
            .store
            .get_agent_by_name(self.orchestrator_agent_id, agent_name)
            .await?
            .ok_or_else(|| RuntimeError::invalid(format!("Agent '{agent_name}' not found")))?;

        let mut lines = vec![
            format!("Agent Status: {}", agent.name),
            format!("Status: {}", agent.status),
            format!("Model: {}", agent.model),
            format!("Tokens: {}", agent.input_tokens + agent.output_tokens),
            format!("Cost: ${:.4}", agent.total_cost),
        ];

        match self.store.get_latest_task_slug(agent.id).await? {
            Some(slug) => {
                lines.push(format!("\nRecent Activity (Task: {slug}):"));
                if verbose {
                    let logs = self.store.get_tail_raw(agent.id, &slug, tail_count, offset).await?;
                    for log in logs {
                        lines.push(format!(
                            "- [{}] {}\n  Payload: {}",
                            log.event_type,
                            log.content.as_deref().unwrap_or("No content"),
                            log.payload.unwrap_or(Value::Null),
                        ));
                    }
                } else {
                    let logs =
                        self.store.get_tail_summaries(agent.id, &slug, tail_count, offset).await?;
                    for log in logs {
                        lines.push(format!(
                            "- [{}] {}",
                            log.event_type,
                            log.summary.as_deref().unwrap_or("No summary"),
                        ));
                    }
                }
            }
            None => lines.push("\nNo recent activity".to_string()),
        }
        Ok(lines.join("\n"))
    }

    /// Soft-deletes a worker, frees its tracker, and broadcasts the removal.
    pub async fn delete_agent(&self, agent_name: &str) -> Result<(), RuntimeError> {
        let agent = self
            .store
            .get_agent_by_name(self.orchestrator_agent_id, agent_name)
            .await?
            .ok_or_else(|| RuntimeError::invalid(format!("Agent '{agent_name}' not found")))?;

        self.store.soft_delete_agent(agent.id).await?;
        self.file_trackers.remove(&agent.id);
        self.hub.broadcast_agent_deleted(agent.id.to_string()).await;
        Ok(())
    }

    /// Interrupts a running worker. Returns false (a benign notice, not an
    /// error) when the agent is not currently executing.
    pub async fn interrupt_agent(&self, agent_name: &str) -> Result<bool, RuntimeError> {
        let client = self.active_clients.lock().await.remove(agent_name);
        match client {
            Some(client) => {
                client.interrupt().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cost report over the active orchestrator, including context usage
    /// against the configured window capacity.
    pub async fn cost_report(&self) -> Result<String, RuntimeError> {
        let orch = self
            .store
            .get_active_orchestrator()
            .await?
            .ok_or_else(|| RuntimeError::invalid("Orchestrator not found"))?;

        let total_tokens = orch.input_tokens + orch.output_tokens;
        let context_percent = total_tokens as f64 / self.max_context_tokens as f64 * 100.0;

        let mut lines = vec![
            "Orchestrator Cost Report:".to_string(),
            format!("Session ID: {}", orch.session_id.as_deref().unwrap_or("Not set yet")),
            format!("Status: {}", orch.status),
            format!("Total Cost: ${:.4}", orch.total_cost),
            format!("Input Tokens: {}", orch.input_tokens),
            format!("Output Tokens: {}", orch.output_tokens),
            format!("Total Tokens: {total_tokens}"),
            format!("Context Usage: {context_percent:.1}%"),
        ];
        if context_percent >= 80.0 {
            lines.push(format!(
                "Warning: context usage at {context_percent:.1}% - consider compacting soon"
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Formatted listing of the owner's non-archived agents.
    pub async fn list_agents_report(&self) -> Result<String, RuntimeError> {
        let agents = self.store.list_agents(self.orchestrator_agent_id, false).await?;
        if agents.is_empty() {
            return Ok("No agents found".to_string());
        }
        let mut lines = vec!["Active Agents:".to_string()];
        for agent in agents {
            lines.push(format!(
                "- {} (ID: {})\n  Status: {}\n  Model: {}\n  Tokens: {}\n  Cost: ${:.4}",
                agent.name,
                agent.id,
                agent.status,
                agent.model,
                agent.input_tokens + agent.output_tokens,
                agent.total_cost,
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Formatted system log page with optional filters.
    pub async fn system_logs_report(
        &self,
        offset: i64,
        limit: i64,
        message_contains: Option<&str>,
        level: Option<&str>,
    ) -> Result<String, RuntimeError> {
        let logs = self
            .store
            .list_system_logs(limit, offset, message_contains, level)
            .await?;
        if logs.is_empty() {
            return Ok("No system logs found matching the criteria".to_string());
        }
        let mut lines = vec![format!("System Logs (showing {} of max {limit}):", logs.len())];
        for log in logs {
            let display = log.summary.as_deref().unwrap_or(&log.message);
            lines.push(format!("[{}] {}: {}", log.timestamp.to_rfc3339(), log.level, display));
        }
        Ok(lines.join("\n"))
    }
}
