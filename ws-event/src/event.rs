//! Typed frames the server pushes to UI clients (type + payload).
//! Row-shaped payloads use `serde_json::Value`; the producers serialize store
//! rows into that before handing the frame to the hub.

use serde::Serialize;
use serde_json::Value;

/// One server-initiated WebSocket frame. The `type` tag on the wire is the
/// snake_case variant name; envelope (`timestamp`) is applied separately.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    ConnectionEstablished {
        client_id: String,
        message: String,
    },
    Ping {},
    Heartbeat {
        active_connections: usize,
    },
    /// Full chat row (id, sender/receiver, text, metadata) as persisted.
    OrchestratorChat {
        message: Value,
    },
    /// Only used to flag stream completion (`chunk` is empty then).
    ChatStream {
        orchestrator_agent_id: String,
        chunk: String,
        is_complete: bool,
    },
    ChatTyping {
        orchestrator_agent_id: String,
        is_typing: bool,
    },
    ThinkingBlock {
        data: Value,
    },
    ToolUseBlock {
        data: Value,
    },
    AgentCreated {
        agent: Value,
    },
    AgentUpdated {
        agent_id: String,
        agent: Value,
    },
    AgentDeleted {
        agent_id: String,
    },
    AgentStatusChanged {
        agent_id: String,
        old_status: String,
        new_status: String,
    },
    /// Agent log row: event_category, event_type, entry_index, payload,
    /// optional summary.
    AgentLog {
        log: Value,
    },
    AgentSummaryUpdate {
        agent_id: String,
        summary: String,
    },
    OrchestratorUpdated {
        orchestrator: Value,
    },
    SystemLog {
        data: Value,
    },
    CostAlert {
        data: Value,
    },
    Error {
        message: String,
        details: Value,
    },
}

impl WsEvent {
    /// Serializes this frame to a JSON object (type + payload; no timestamp).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Wire tag of this frame, e.g. `"orchestrator_chat"`.
    pub fn kind(&self) -> &'static str {
        match self {
            WsEvent::ConnectionEstablished { .. } => "connection_established",
            WsEvent::Ping {} => "ping",
            WsEvent::Heartbeat { .. } => "heartbeat",
            WsEvent::OrchestratorChat { .. } => "orchestrator_chat",
            WsEvent::ChatStream { .. } => "chat_stream",
            WsEvent::ChatTyping { .. } => "chat_typing",
            WsEvent::ThinkingBlock { .. } => "thinking_block",
            WsEvent::ToolUseBlock { .. } => "tool_use_block",
            WsEvent::AgentCreated { .. } => "agent_created",
            WsEvent::AgentUpdated { .. } => "agent_updated",
            WsEvent::AgentDeleted { .. } => "agent_deleted",
            WsEvent::AgentStatusChanged { .. } => "agent_status_changed",
            WsEvent::AgentLog { .. } => "agent_log",
            WsEvent::AgentSummaryUpdate { .. } => "agent_summary_update",
            WsEvent::OrchestratorUpdated { .. } => "orchestrator_updated",
            WsEvent::SystemLog { .. } => "system_log",
            WsEvent::CostAlert { .. } => "cost_alert",
            WsEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_is_snake_case_variant() {
        let ev = WsEvent::ChatTyping {
            orchestrator_agent_id: "o1".into(),
            is_typing: true,
        };
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "chat_typing");
        assert_eq!(v["is_typing"], true);
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let events = vec![
            WsEvent::Ping {},
            WsEvent::AgentDeleted { agent_id: "a".into() },
            WsEvent::OrchestratorChat { message: json!({}) },
            WsEvent::ChatStream {
                orchestrator_agent_id: "o".into(),
                chunk: String::new(),
                is_complete: true,
            },
            WsEvent::CostAlert { data: json!({}) },
        ];
        for ev in events {
            let v = ev.to_value().unwrap();
            assert_eq!(v["type"], ev.kind());
        }
    }

    #[test]
    fn embedded_rows_pass_through() {
        let row = json!({"id": "m1", "sender_type": "orchestrator", "message": "hi"});
        let v = WsEvent::OrchestratorChat { message: row.clone() }
            .to_value()
            .unwrap();
        assert_eq!(v["message"], row);
    }
}
