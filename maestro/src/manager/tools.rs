//! The eight management tools registered with the orchestrator's SDK
//! session. Handlers validate inputs and delegate to the manager; every
//! failure comes back as an error tool output, never a panic.

use super::AgentManager;
use crate::sdk::{ToolDef, ToolOutput};
use serde_json::{json, Value};
use std::sync::Arc;

fn str_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn int_arg(input: &Value, key: &str, default: i64) -> i64 {
    input.get(key).and_then(Value::as_i64).unwrap_or(default)
}

impl AgentManager {
    /// Tool signatures in TypeScript notation, part of the session contract
    /// surfaced to the UI.
    pub fn tool_signatures() -> Vec<&'static str> {
        vec![
            "create_agent(name: string, system_prompt?: string, model?: string, subagent_template?: string)",
            "list_agents()",
            "command_agent(agent_name: string, command: string)",
            "check_agent_status(agent_name: string, tail_count = 10, offset = 0, verbose_logs = false)",
            "delete_agent(agent_name: string)",
            "interrupt_agent(agent_name: string)",
            "read_system_logs(offset = 0, limit = 50, message_contains?: string, level?: string)",
            "report_cost()",
        ]
    }

    /// Builds the tool list bound into the orchestrator's session.
    pub fn management_tools(self: &Arc<Self>) -> Vec<ToolDef> {
        vec![
            self.create_agent_tool(),
            self.list_agents_tool(),
            self.command_agent_tool(),
            self.check_agent_status_tool(),
            self.delete_agent_tool(),
            self.interrupt_agent_tool(),
            self.read_system_logs_tool(),
            self.report_cost_tool(),
        ]
    }

    fn create_agent_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "create_agent",
            "Create a new agent. REQUIRED: name. OPTIONAL: system_prompt (can be empty if using \
             template), model, subagent_template. Use 'fast' for the haiku model. If \
             subagent_template is provided, the template's system prompt, tools, and model are \
             applied automatically.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "system_prompt": {"type": "string"},
                    "model": {"type": "string"},
                    "subagent_template": {"type": "string"},
                },
                "required": ["name"],
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let Some(name) = str_arg(&input, "name") else {
                        return ToolOutput::error("Error: 'name' is required");
                    };
                    let system_prompt = str_arg(&input, "system_prompt").unwrap_or("");
                    let model = str_arg(&input, "model");
                    let template = str_arg(&input, "subagent_template");
                    if system_prompt.is_empty() && template.is_none() {
                        return ToolOutput::error(
                            "Error: Either 'system_prompt' or 'subagent_template' must be provided",
                        );
                    }
                    match manager.create_agent(name, system_prompt, model, template).await {
                        Ok(created) => ToolOutput::ok(format!(
                            "Created agent '{name}'\nID: {}\nSession: {}\nModel: {}",
                            created.agent_id,
                            created.session_id.as_deref().unwrap_or("pending"),
                            created.model,
                        )),
                        Err(e) => ToolOutput::error(format!("Failed: {e}")),
                    }
                }
            },
        )
    }

    fn list_agents_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "list_agents",
            "List all active agents",
            json!({"type": "object", "properties": {}}),
            move |_input| {
                let manager = Arc::clone(&manager);
                async move {
                    match manager.list_agents_report().await {
                        Ok(report) => ToolOutput::ok(report),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn command_agent_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "command_agent",
            "Send a command to an agent. REQUIRED: agent_name, command.",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string"},
                    "command": {"type": "string"},
                },
                "required": ["agent_name", "command"],
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let (Some(agent_name), Some(command)) =
                        (str_arg(&input, "agent_name"), str_arg(&input, "command"))
                    else {
                        return ToolOutput::error(
                            "Error: 'agent_name' and 'command' are required",
                        );
                    };
                    match manager.dispatch_command(agent_name, command).await {
                        Ok(slug) => {
                            let head: String = command.chars().take(100).collect();
                            let ellipsis = if command.len() > 100 { "..." } else { "" };
                            ToolOutput::ok(format!(
                                "Command dispatched to '{agent_name}'\nTask: {slug}\n\
                                 Command: {head}{ellipsis}\nAgent will execute in background.",
                            ))
                        }
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn check_agent_status_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "check_agent_status",
            "Check agent status and recent activity. REQUIRED: agent_name.",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string"},
                    "tail_count": {"type": "integer"},
                    "offset": {"type": "integer"},
                    "verbose_logs": {"type": "boolean"},
                },
                "required": ["agent_name"],
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let Some(agent_name) = str_arg(&input, "agent_name") else {
                        return ToolOutput::error("Error: 'agent_name' is required");
                    };
                    let tail_count = int_arg(&input, "tail_count", 10);
                    let offset = int_arg(&input, "offset", 0);
                    let verbose = input
                        .get("verbose_logs")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    match manager
                        .agent_status_report(agent_name, tail_count, offset, verbose)
                        .await
                    {
                        Ok(report) => ToolOutput::ok(report),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn delete_agent_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "delete_agent",
            "Delete an agent. REQUIRED: agent_name.",
            json!({
                "type": "object",
                "properties": {"agent_name": {"type": "string"}},
                "required": ["agent_name"],
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let Some(agent_name) = str_arg(&input, "agent_name") else {
                        return ToolOutput::error("Error: 'agent_name' is required");
                    };
                    match manager.delete_agent(agent_name).await {
                        Ok(()) => ToolOutput::ok(format!("Deleted agent '{agent_name}'")),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn interrupt_agent_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "interrupt_agent",
            "Interrupt a running agent. REQUIRED: agent_name.",
            json!({
                "type": "object",
                "properties": {"agent_name": {"type": "string"}},
                "required": ["agent_name"],
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let Some(agent_name) = str_arg(&input, "agent_name") else {
                        return ToolOutput::error("Error: 'agent_name' is required");
                    };
                    match manager.interrupt_agent(agent_name).await {
                        Ok(true) => ToolOutput::ok(format!("Interrupted agent '{agent_name}'")),
                        Ok(false) => ToolOutput::ok(format!(
                            "Agent '{agent_name}' is not currently running"
                        )),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn read_system_logs_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "read_system_logs",
            "Read recent system logs with filtering",
            json!({
                "type": "object",
                "properties": {
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "message_contains": {"type": "string"},
                    "level": {"type": "string"},
                },
            }),
            move |input| {
                let manager = Arc::clone(&manager);
                async move {
                    let offset = int_arg(&input, "offset", 0);
                    let limit = int_arg(&input, "limit", 50);
                    let message_contains = str_arg(&input, "message_contains");
                    let level = str_arg(&input, "level");
                    match manager
                        .system_logs_report(offset, limit, message_contains, level)
                        .await
                    {
                        Ok(report) => ToolOutput::ok(report),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }

    fn report_cost_tool(self: &Arc<Self>) -> ToolDef {
        let manager = Arc::clone(self);
        ToolDef::new(
            "report_cost",
            "Report orchestrator's costs, tokens, and session ID",
            json!({"type": "object", "properties": {}}),
            move |_input| {
                let manager = Arc::clone(&manager);
                async move {
                    match manager.cost_report().await {
                        Ok(report) => ToolOutput::ok(report),
                        Err(e) => ToolOutput::error(format!("Error: {e}")),
                    }
                }
            },
        )
    }
}
