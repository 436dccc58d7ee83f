//! Event hub: fan-out of typed frames to every connected UI client.
//!
//! Each client gets its own bounded queue; a forwarder task in the serve
//! layer drains it into the socket. That keeps broadcasts per-client ordered
//! (single queue) and lets dead or stalled clients be evicted without
//! touching the socket here.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use ws_event::{stamp, WsEvent};

/// Frames queued per client before it is considered stalled.
const CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
struct Client {
    label: String,
    tx: mpsc::Sender<String>,
}

struct Registry {
    clients: HashMap<u64, Client>,
    next_id: u64,
}

pub struct EventHub {
    registry: Mutex<Registry>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    ping_interval: Duration,
    connection_timeout: Duration,
}

impl EventHub {
    pub fn new(ping_interval: Duration, connection_timeout: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry { clients: HashMap::new(), next_id: 1 }),
            keepalive: Mutex::new(None),
            ping_interval,
            connection_timeout,
        }
    }

    /// Registers a client and returns its id plus the queue the socket
    /// forwarder drains. The welcome frame is already enqueued.
    pub async fn connect(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let (id, label) = {
            let mut reg = self.registry.lock().await;
            let id = reg.next_id;
            reg.next_id += 1;
            let label = format!("client_{id}");
            reg.clients.insert(id, Client { label: label.clone(), tx: tx.clone() });
            (id, label)
        };

        let welcome = WsEvent::ConnectionEstablished {
            client_id: label.clone(),
            message: "Connected to Maestro".to_string(),
        };
        if let Ok(mut value) = welcome.to_value() {
            stamp(&mut value);
            let _ = tx.try_send(value.to_string());
        }
        let total = self.connection_count().await;
        tracing::info!(client = %label, total, "ws client connected");
        (id, rx)
    }

    pub async fn disconnect(&self, client_id: u64) {
        let removed = self.registry.lock().await.clients.remove(&client_id);
        if let Some(client) = removed {
            tracing::info!(client = %client.label, "ws client disconnected");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.clients.len()
    }

    /// Stamps, serializes once, and fans the frame out to every client.
    /// Clients whose queue is closed or full are evicted after the loop.
    pub async fn broadcast(&self, event: WsEvent) {
        let mut value = match event.to_value() {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(kind = event.kind(), "failed to serialize frame: {e}");
                return;
            }
        };
        stamp(&mut value);
        let frame = value.to_string();

        let snapshot: Vec<(u64, Client)> = {
            let reg = self.registry.lock().await;
            reg.clients.iter().map(|(id, c)| (*id, c.clone())).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        for (id, client) in &snapshot {
            if let Err(e) = client.tx.try_send(frame.clone()) {
                tracing::warn!(client = %client.label, "dropping ws client: {e}");
                dead.push(*id);
            }
        }
        for id in dead {
            self.disconnect(id).await;
        }
        tracing::debug!(kind = event.kind(), clients = snapshot.len(), "broadcast");
    }

    // Typed helpers, one per event class the runtime emits.

    pub async fn broadcast_agent_created(&self, agent: Value) {
        self.broadcast(WsEvent::AgentCreated { agent }).await;
    }

    pub async fn broadcast_agent_updated(&self, agent_id: String, agent: Value) {
        self.broadcast(WsEvent::AgentUpdated { agent_id, agent }).await;
    }

    pub async fn broadcast_agent_deleted(&self, agent_id: String) {
        self.broadcast(WsEvent::AgentDeleted { agent_id }).await;
    }

    pub async fn broadcast_agent_status_change(
        &self,
        agent_id: String,
        old_status: &str,
        new_status: &str,
    ) {
        self.broadcast(WsEvent::AgentStatusChanged {
            agent_id,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
        })
        .await;
    }

    pub async fn broadcast_agent_log(&self, log: Value) {
        self.broadcast(WsEvent::AgentLog { log }).await;
    }

    pub async fn broadcast_agent_summary_update(&self, agent_id: String, summary: String) {
        self.broadcast(WsEvent::AgentSummaryUpdate { agent_id, summary }).await;
    }

    pub async fn broadcast_orchestrator_updated(&self, orchestrator: Value) {
        self.broadcast(WsEvent::OrchestratorUpdated { orchestrator }).await;
    }

    pub async fn broadcast_system_log(&self, data: Value) {
        self.broadcast(WsEvent::SystemLog { data }).await;
    }

    pub async fn broadcast_error(&self, message: &str, details: Value) {
        self.broadcast(WsEvent::Error { message: message.to_string(), details }).await;
    }

    pub async fn broadcast_cost_alert(&self, data: Value) {
        self.broadcast(WsEvent::CostAlert { data }).await;
    }

    pub async fn broadcast_chat_stream(
        &self,
        orchestrator_agent_id: String,
        chunk: String,
        is_complete: bool,
    ) {
        self.broadcast(WsEvent::ChatStream { orchestrator_agent_id, chunk, is_complete }).await;
    }

    pub async fn set_typing_indicator(&self, orchestrator_agent_id: String, is_typing: bool) {
        self.broadcast(WsEvent::ChatTyping { orchestrator_agent_id, is_typing }).await;
    }

    pub async fn send_heartbeat(&self) {
        let count = self.connection_count().await;
        self.broadcast(WsEvent::Heartbeat { active_connections: count }).await;
    }

    /// Spawns the keepalive loop: a ping to every client each
    /// `ping_interval`, with `connection_timeout` as the per-client send
    /// deadline. Timed-out clients are evicted on that tick.
    pub async fn start_keepalive(self: &Arc<Self>) {
        let mut guard = self.keepalive.lock().await;
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let hub = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(hub.ping_interval).await;
                hub.ping_tick().await;
            }
        }));
        tracing::info!(interval = ?self.ping_interval, "ws keepalive started");
    }

    pub async fn stop_keepalive(&self) {
        if let Some(handle) = self.keepalive.lock().await.take() {
            handle.abort();
            tracing::info!("ws keepalive stopped");
        }
    }

    async fn ping_tick(&self) {
        let snapshot: Vec<(u64, Client)> = {
            let reg = self.registry.lock().await;
            reg.clients.iter().map(|(id, c)| (*id, c.clone())).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let frame = {
            let mut value = match (WsEvent::Ping {}).to_value() {
                Ok(v) => v,
                Err(_) => json!({"type": "ping"}),
            };
            stamp(&mut value);
            value.to_string()
        };

        let mut dead = Vec::new();
        for (id, client) in snapshot {
            let send = client.tx.send(frame.clone());
            match tokio::time::timeout(self.connection_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => dead.push(id),
                Err(_) => {
                    tracing::warn!(client = %client.label, "ping timeout, evicting");
                    dead.push(id);
                }
            }
        }
        for id in dead {
            self.disconnect(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hub() -> Arc<EventHub> {
        Arc::new(EventHub::new(Duration::from_secs(30), Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn connect_sends_welcome_frame() {
        let hub = hub();
        let (_id, mut rx) = hub.connect().await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "connection_established");
        assert!(frame["timestamp"].is_string());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client_in_order() {
        let hub = hub();
        let (_a, mut rx_a) = hub.connect().await;
        let (_b, mut rx_b) = hub.connect().await;
        // Drain welcomes.
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        hub.broadcast_agent_deleted("agent-1".into()).await;
        hub.broadcast_system_log(json!({"message": "second"})).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(first["type"], "agent_deleted");
            assert_eq!(second["type"], "system_log");
        }
    }

    #[tokio::test]
    async fn closed_client_is_evicted_on_broadcast() {
        let hub = hub();
        let (_id, rx) = hub.connect().await;
        drop(rx);
        assert_eq!(hub.connection_count().await, 1);
        hub.broadcast_agent_deleted("agent-1".into()).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn ping_tick_reaps_dead_clients() {
        let hub = hub();
        let (_alive, mut rx_alive) = hub.connect().await;
        let (_dead, rx_dead) = hub.connect().await;
        rx_alive.recv().await.unwrap();
        drop(rx_dead);

        hub.ping_tick().await;
        assert_eq!(hub.connection_count().await, 1);
        let frame: Value = serde_json::from_str(&rx_alive.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "ping");
    }

    #[tokio::test]
    async fn heartbeat_reports_connection_count() {
        let hub = hub();
        let (_a, mut rx) = hub.connect().await;
        let (_b, _rx_b) = hub.connect().await;
        rx.recv().await.unwrap();

        hub.send_heartbeat().await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "heartbeat");
        assert_eq!(frame["active_connections"], 2);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let hub = hub();
        let (id, _rx) = hub.connect().await;
        hub.disconnect(id).await;
        hub.disconnect(id).await;
        assert_eq!(hub.connection_count().await, 0);
    }
}
