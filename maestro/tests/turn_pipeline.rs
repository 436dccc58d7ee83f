//! End-to-end turn tests over the mock SDK: frame ordering, interruption,
//! budget refusal, cache short-circuit, agent creation and command flow.
//! Run with `cargo test -- --ignored` and a disposable DATABASE_URL.

mod common;

use config::EconomySettings;
use maestro::economy::TokenEconomy;
use maestro::hooks::HookRuntime;
use maestro::sdk::{MockConnector, PreCompactEvent, ScriptEvent, SdkConnector};
use maestro::{AgentManager, EventHub, OrchestratorService, Store, Summarizer};
use serde_json::{json, Value};
use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    store: Store,
    hub: Arc<EventHub>,
    connector: Arc<MockConnector>,
    manager: Arc<AgentManager>,
    service: Arc<OrchestratorService>,
    summarizer: Arc<Summarizer>,
    owner: Uuid,
    frames: mpsc::Receiver<String>,
    _workdir: tempfile::TempDir,
}

fn test_economy(budget: u64) -> EconomySettings {
    EconomySettings {
        enabled: true,
        max_context_tokens: 200_000,
        trim_max_messages: 50,
        trim_max_tokens: 50_000,
        cache_max_size: 100,
        cache_ttl_secs: 3600,
        tokens_per_minute: 1_000_000,
        backoff_threshold: 0.8,
        cost_alert_threshold: 10.0,
        cost_critical_threshold: 50.0,
        session_budget_tokens: budget,
        budget_simple_tokens: 5_000,
        budget_moderate_tokens: 15_000,
        budget_complex_tokens: 30_000,
    }
}

async fn harness(economy: Option<EconomySettings>) -> Harness {
    let store = common::connect_store().await;
    let workdir = tempfile::tempdir().unwrap();
    let orch = store
        .create_orchestrator("You are the orchestrator.", &workdir.path().to_string_lossy())
        .await
        .unwrap();

    let hub = Arc::new(EventHub::new(Duration::from_secs(30), Duration::from_secs(60)));
    let connector = Arc::new(MockConnector::new());
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&connector) as Arc<dyn SdkConnector>,
        "mock-fast",
        "Summarize in one sentence.",
        "Event: {event_type}\n{details}",
        Duration::from_secs(2),
    ));
    let manager = AgentManager::new(
        orch.id,
        store.clone(),
        Arc::clone(&hub),
        Arc::clone(&summarizer),
        Arc::clone(&connector) as Arc<dyn SdkConnector>,
        workdir.path().to_path_buf(),
        "mock-model".to_string(),
        50,
        200_000,
        Duration::from_secs(30),
    );
    let economy = economy.map(|settings| Arc::new(TokenEconomy::new(&settings)));
    let service = OrchestratorService::new(
        store.clone(),
        Arc::clone(&hub),
        Arc::clone(&summarizer),
        Arc::clone(&connector) as Arc<dyn SdkConnector>,
        Arc::clone(&manager),
        economy,
        workdir.path().to_path_buf(),
        "You are the orchestrator.".to_string(),
        "mock-model".to_string(),
        Duration::from_secs(30),
        None,
    );

    let (_client_id, frames) = hub.connect().await;
    Harness {
        store,
        hub,
        connector,
        manager,
        service,
        summarizer,
        owner: orch.id,
        frames,
        _workdir: workdir,
    }
}

async fn next_frame(frames: &mut mpsc::Receiver<String>) -> Value {
    let raw = tokio::time::timeout(Duration::from_secs(3), frames.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("hub dropped the client");
    serde_json::from_str(&raw).unwrap()
}

/// Collects frames until one of `kind` arrives, returning it.
async fn frame_of_kind(frames: &mut mpsc::Receiver<String>, kind: &str) -> Value {
    loop {
        let frame = next_frame(frames).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn first_turn_streams_expected_frames() {
    let mut h = harness(None).await;
    let session = format!("sess-{}", Uuid::new_v4());
    h.connector
        .push_script(MockConnector::simple_turn(&session, "Hello there.", 12, 7))
        .await;

    let report = h.service.process_user_message("hi", h.owner).await.unwrap();
    assert_eq!(report.response, "Hello there.");
    assert_eq!(report.input_tokens, 12);
    assert_eq!(report.output_tokens, 7);

    // connection_established, then the S2 frame sequence.
    let first = next_frame(&mut h.frames).await;
    assert_eq!(first["type"], "connection_established");

    let typing_on = next_frame(&mut h.frames).await;
    assert_eq!(typing_on["type"], "chat_typing");
    assert_eq!(typing_on["is_typing"], true);

    let chat = next_frame(&mut h.frames).await;
    assert_eq!(chat["type"], "orchestrator_chat");
    assert_eq!(chat["message"]["message"], "Hello there.");
    assert_eq!(chat["message"]["metadata"]["type"], "text_chunk");
    assert!(chat["message"]["id"].is_string());

    let stream_end = next_frame(&mut h.frames).await;
    assert_eq!(stream_end["type"], "chat_stream");
    assert_eq!(stream_end["is_complete"], true);
    assert_eq!(stream_end["chunk"], "");

    let updated = next_frame(&mut h.frames).await;
    assert_eq!(updated["type"], "orchestrator_updated");
    assert_eq!(updated["orchestrator"]["input_tokens"], 12);
    assert_eq!(updated["orchestrator"]["output_tokens"], 7);

    let typing_off = next_frame(&mut h.frames).await;
    assert_eq!(typing_off["type"], "chat_typing");
    assert_eq!(typing_off["is_typing"], false);

    // Session token persisted on the first turn (guarded write).
    let orch = h.store.get_orchestrator_by_id(h.owner).await.unwrap().unwrap();
    assert_eq!(orch.session_id.as_deref(), Some(session.as_str()));

    // Turn-boundary invariants.
    assert!(!h.service.is_executing().await);
    assert!(!h.service.has_active_client().await);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn new_message_interrupts_active_turn() {
    let mut h = harness(None).await;
    let sess1 = format!("sess-{}", Uuid::new_v4());
    let sess2 = format!("sess-{}", Uuid::new_v4());

    // First turn stalls mid-stream so the second can preempt it.
    h.connector
        .push_script(vec![
            ScriptEvent::Message(maestro::sdk::StreamMessage::Assistant {
                blocks: vec![maestro::sdk::AssistantBlock::Text { text: "first".into() }],
            }),
            ScriptEvent::Delay(Duration::from_millis(400)),
            ScriptEvent::Message(maestro::sdk::StreamMessage::Assistant {
                blocks: vec![maestro::sdk::AssistantBlock::Text { text: "never".into() }],
            }),
        ])
        .await;
    h.connector
        .push_script(MockConnector::simple_turn(&sess2, "second reply", 5, 3))
        .await;
    let _ = sess1;

    let service = Arc::clone(&h.service);
    let owner = h.owner;
    let first_turn =
        tokio::spawn(async move { service.process_user_message("first message", owner).await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    let report = h.service.process_user_message("second message", h.owner).await.unwrap();
    assert_eq!(report.response, "second reply");
    first_turn.await.unwrap().unwrap();

    let warning = frame_of_kind(&mut h.frames, "system_log").await;
    assert_eq!(warning["data"]["level"], "WARNING");
    assert!(warning["data"]["message"]
        .as_str()
        .unwrap()
        .contains("interrupted"));

    // Invariants hold after both turns.
    assert!(!h.service.is_executing().await);
    assert!(!h.service.has_active_client().await);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn budget_refusal_makes_no_sdk_call() {
    let h = harness(Some(test_economy(1_000))).await;
    let economy = h.service.economy().unwrap();
    for _ in 0..9 {
        economy.budget.record_usage(120).await;
    }

    // 1080 > 1000: the turn is refused before any SDK session opens.
    let report = h.service.process_user_message("hello again", h.owner).await.unwrap();
    assert!(report.budget_refused);
    assert!(report.response.contains("BUDGET EXCEEDED"));
    assert!(h.connector.connect_options().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn identical_turn_is_served_from_cache() {
    let mut h = harness(Some(test_economy(1_000_000))).await;
    let session = format!("sess-{}", Uuid::new_v4());
    h.connector
        .push_script(MockConnector::simple_turn(&session, "4.", 10, 2))
        .await;

    let first = h.service.process_user_message("what is 2+2?", h.owner).await.unwrap();
    assert!(!first.from_cache);

    // Restore the exact pre-turn context so the cache key matches.
    h.store.delete_chat_history(h.owner).await.unwrap();

    let second = h.service.process_user_message("what is 2+2?", h.owner).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.response, "4.");

    // Exactly one SDK session was opened across both turns.
    assert_eq!(h.connector.connect_options().await.len(), 1);
    let stats = h.service.economy().unwrap().cache.stats().await;
    assert!(stats["hits"].as_u64().unwrap() >= 1);

    // The cached turn still lands in chat and on the wire.
    let cached_chat = loop {
        let frame = frame_of_kind(&mut h.frames, "orchestrator_chat").await;
        if frame["message"]["metadata"]["cached"] == true {
            break frame;
        }
    };
    assert_eq!(cached_chat["message"]["message"], "4.");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn create_and_command_agent_logs_response_blocks() {
    let mut h = harness(None).await;
    let greet_session = format!("sess-{}", Uuid::new_v4());
    h.connector
        .push_script(MockConnector::simple_turn(&greet_session, "Ready.", 3, 1))
        .await;

    let created = h
        .manager
        .create_agent("worker1", "You are worker1.", None, None)
        .await
        .unwrap();
    assert_eq!(created.session_id.as_deref(), Some(greet_session.as_str()));

    let row = h
        .store
        .get_agent_by_name(h.owner, "worker1")
        .await
        .unwrap()
        .expect("agent row persisted");
    assert_eq!(row.session_id.as_deref(), Some(greet_session.as_str()));

    let created_frame = frame_of_kind(&mut h.frames, "agent_created").await;
    assert_eq!(created_frame["agent"]["name"], "worker1");
    assert_eq!(created_frame["agent"]["status"], "idle");

    // Command it; the dispatch returns a slug immediately.
    let cmd_session = format!("sess-{}", Uuid::new_v4());
    h.connector
        .push_script(MockConnector::simple_turn(&cmd_session, "hi from worker1", 4, 2))
        .await;
    let slug = h.manager.dispatch_command("worker1", "say hi").await.unwrap();
    assert!(slug.starts_with("say-hi-"));

    // Poll until the background task lands the text block.
    let mut logged = None;
    for _ in 0..40 {
        let logs = h.store.get_agent_logs(row.id, Some(&slug), 50, 0).await.unwrap();
        if let Some(log) = logs
            .iter()
            .find(|l| l.event_category == "response" && l.event_type == "text")
        {
            logged = Some(log.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let logged = logged.expect("worker text block logged");
    assert_eq!(logged.content.as_deref(), Some("hi from worker1"));

    // Back to idle with its session advanced.
    let mut idle = false;
    for _ in 0..40 {
        let row = h.store.get_agent(row.id).await.unwrap().unwrap();
        if row.status == "idle" && row.session_id.as_deref() == Some(cmd_session.as_str()) {
            idle = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(idle, "agent returned to idle with updated session");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn duplicate_agent_name_is_a_tool_level_error() {
    let h = harness(None).await;
    h.connector
        .push_script(MockConnector::simple_turn(&format!("sess-{}", Uuid::new_v4()), "Ready.", 1, 1))
        .await;
    h.manager.create_agent("worker1", "You are worker1.", None, None).await.unwrap();

    let err = h
        .manager
        .create_agent("worker1", "You are worker1 again.", None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already in use"));
    assert_eq!(h.store.list_agents(h.owner, false).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn pre_compact_hook_resets_tokens_and_logs() {
    let h = harness(None).await;
    let agent = h
        .store
        .create_agent(h.owner, "compacted", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();
    h.store.update_agent_costs(agent, 900, 100, 0.5).await.unwrap();

    let runtime = HookRuntime::new(
        agent,
        "compacted",
        "task-compact",
        None,
        Arc::new(AtomicI32::new(0)),
        h.store.clone(),
        Arc::clone(&h.hub),
        Arc::clone(&h.summarizer),
        None,
    );
    runtime
        .install()
        .fire_pre_compact(PreCompactEvent { tokens_before: 1000 })
        .await
        .unwrap();

    let row = h.store.get_agent(agent).await.unwrap().unwrap();
    assert_eq!(row.input_tokens, 0);
    assert_eq!(row.output_tokens, 0);
    assert_eq!(row.total_cost, 0.0);

    let logs = h.store.get_agent_logs(agent, Some("task-compact"), 10, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event_type, "PreCompact");
    assert_eq!(logs[0].payload["tokens_before"], 1000);
}
