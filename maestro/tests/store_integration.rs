//! Store adapter integration tests against a real Postgres database.
//! Run with `cargo test -- --ignored` and a disposable DATABASE_URL.

mod common;

use maestro::store::{LogCategory, PromptAuthor};
use maestro::{AgentStatus, SenderKind, Store, StoreError};
use serde_json::json;
use uuid::Uuid;

async fn fresh_orchestrator(store: &Store) -> Uuid {
    store
        .create_orchestrator("You are the orchestrator.", "/tmp")
        .await
        .expect("create orchestrator")
        .id
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn cost_updates_are_incremental_and_scoped() {
    let store = common::connect_store().await;
    let first = fresh_orchestrator(&store).await;
    let second = fresh_orchestrator(&store).await;

    for _ in 0..10 {
        let totals = store.update_orchestrator_costs(first, 1, 2, 0.01).await.unwrap();
        assert_eq!(totals.rows_updated, 1);
    }
    let totals = store.update_orchestrator_costs(first, 0, 0, 0.0).await.unwrap();
    assert_eq!(totals.input_tokens, 10);
    assert_eq!(totals.output_tokens, 20);
    assert!((totals.total_cost - 0.10).abs() < 1e-9);

    let other = store.get_orchestrator_by_id(second).await.unwrap().unwrap();
    assert_eq!(other.input_tokens, 0);
    assert_eq!(other.output_tokens, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn session_token_is_set_exactly_once() {
    let store = common::connect_store().await;
    let id = fresh_orchestrator(&store).await;
    let token_a = format!("sess-{}", Uuid::new_v4());
    let token_b = format!("sess-{}", Uuid::new_v4());

    let row = store.update_orchestrator_session(id, &token_a).await.unwrap().unwrap();
    assert_eq!(row.session_id.as_deref(), Some(token_a.as_str()));

    // Second write is a guarded no-op.
    let row = store.update_orchestrator_session(id, &token_b).await.unwrap().unwrap();
    assert_eq!(row.session_id.as_deref(), Some(token_a.as_str()));

    let found = store.get_orchestrator_by_session(&token_a).await.unwrap();
    assert_eq!(found.unwrap().id, id);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn duplicate_agent_names_rejected_until_archived() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;

    let first = store
        .create_agent(owner, "worker1", "mock-model", "You are worker1.", "/tmp", &json!({}))
        .await
        .unwrap();

    let err = store
        .create_agent(owner, "worker1", "mock-model", "You are worker1.", "/tmp", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateAgentName(name) if name == "worker1"));
    assert_eq!(store.list_agents(owner, false).await.unwrap().len(), 1);

    // Soft delete frees the name.
    store.soft_delete_agent(first).await.unwrap();
    store
        .create_agent(owner, "worker1", "mock-model", "You are worker1.", "/tmp", &json!({}))
        .await
        .unwrap();
    assert_eq!(store.list_agents(owner, false).await.unwrap().len(), 1);
    assert_eq!(store.list_agents(owner, true).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn chat_history_returns_recent_messages_in_order() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;

    for i in 0..100 {
        store
            .insert_chat_message(
                owner,
                SenderKind::User,
                SenderKind::Orchestrator,
                &format!("msg {i:03}"),
                None,
                &json!({}),
            )
            .await
            .unwrap();
    }

    let history = store.chat_history(owner, 30, 0, None).await.unwrap();
    assert_eq!(history.len(), 30);
    assert_eq!(history.first().unwrap().message, "msg 070");
    assert_eq!(history.last().unwrap().message, "msg 099");
    for pair in history.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }
    assert_eq!(store.turn_count(owner).await.unwrap(), 100);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn chat_participants_are_validated() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "validator", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();

    let err = store
        .insert_chat_message(owner, SenderKind::Agent, SenderKind::User, "hi", None, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingAgentId));

    let err = store
        .insert_chat_message(
            owner,
            SenderKind::User,
            SenderKind::Orchestrator,
            "hi",
            Some(agent),
            &json!({}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedAgentId));

    store
        .insert_chat_message(owner, SenderKind::Agent, SenderKind::User, "hi", Some(agent), &json!({}))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn agent_log_tails_and_latest_slug() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "tailer", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();

    for i in 0..6 {
        let id = store
            .insert_agent_log(
                agent,
                "task-a",
                i,
                LogCategory::Hook,
                "PreToolUse",
                Some(&format!("entry {i}")),
                &json!({"tool_name": "Read"}),
                None,
            )
            .await
            .unwrap();
        if i % 2 == 0 {
            store.update_log_summary(id, &format!("summary {i}")).await.unwrap();
        }
    }

    let raw = store.get_tail_raw(agent, "task-a", 3, 0).await.unwrap();
    assert_eq!(
        raw.iter().map(|e| e.entry_index).collect::<Vec<_>>(),
        vec![3, 4, 5]
    );

    let summaries = store.get_tail_summaries(agent, "task-a", 10, 0).await.unwrap();
    assert_eq!(
        summaries.iter().map(|e| e.entry_index).collect::<Vec<_>>(),
        vec![0, 2, 4]
    );
    assert!(summaries.iter().all(|e| e.summary.is_some()));

    store
        .insert_agent_log(agent, "task-b", 0, LogCategory::Response, "text", Some("x"), &json!({}), None)
        .await
        .unwrap();
    assert_eq!(
        store.get_latest_task_slug(agent).await.unwrap().as_deref(),
        Some("task-b")
    );
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn agent_log_payload_merges() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "merger", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();
    let log = store
        .insert_agent_log(agent, "task-a", 0, LogCategory::Response, "text", Some("hi"), &json!({"text": "hi"}), None)
        .await
        .unwrap();

    store
        .update_log_payload(log, &json!({"total_files_modified": 2}))
        .await
        .unwrap();
    let rows = store.get_agent_logs(agent, Some("task-a"), 10, 0).await.unwrap();
    assert_eq!(rows[0].payload["text"], "hi");
    assert_eq!(rows[0].payload["total_files_modified"], 2);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn reset_agent_tokens_zeroes_counters() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "resetter", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();

    store.update_agent_costs(agent, 100, 50, 0.25).await.unwrap();
    let row = store.get_agent(agent).await.unwrap().unwrap();
    assert_eq!(row.input_tokens, 100);

    store.reset_agent_tokens(agent).await.unwrap();
    let row = store.get_agent(agent).await.unwrap().unwrap();
    assert_eq!(row.input_tokens, 0);
    assert_eq!(row.output_tokens, 0);
    assert_eq!(row.total_cost, 0.0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn agent_status_transitions_persist() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "stateful", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();

    store.update_agent_status(agent, AgentStatus::Executing).await.unwrap();
    assert_eq!(store.get_agent(agent).await.unwrap().unwrap().status, "executing");
    store.update_agent_status(agent, AgentStatus::Blocked).await.unwrap();
    assert_eq!(store.get_agent(agent).await.unwrap().unwrap().status, "blocked");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn system_logs_filter_by_message_and_level() {
    let store = common::connect_store().await;
    let marker = Uuid::new_v4().to_string();

    store
        .insert_system_log("WARNING", &format!("Task InTeRrUpTeD {marker}"), &json!({}))
        .await
        .unwrap();
    store
        .insert_system_log("INFO", &format!("routine event {marker}"), &json!({}))
        .await
        .unwrap();

    // ILIKE match is case-insensitive.
    let logs = store
        .list_system_logs(50, 0, Some(&format!("interrupted {marker}")), None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, "WARNING");

    // Level filter upper-cases its argument.
    let logs = store
        .list_system_logs(50, 0, Some(&marker), Some("info"))
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.starts_with("routine"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn metadata_merge_preserves_existing_keys() {
    let store = common::connect_store().await;
    let id = fresh_orchestrator(&store).await;

    store.merge_orchestrator_metadata(id, &json!({"a": 1})).await.unwrap();
    store.merge_orchestrator_metadata(id, &json!({"b": {"nested": true}})).await.unwrap();

    let row = store.get_orchestrator_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.metadata["a"], 1);
    assert_eq!(row.metadata["b"]["nested"], true);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn prompts_round_trip_with_summary() {
    let store = common::connect_store().await;
    let owner = fresh_orchestrator(&store).await;
    let agent = store
        .create_agent(owner, "prompted", "mock-model", "p", "/tmp", &json!({}))
        .await
        .unwrap();

    let prompt = store
        .insert_prompt(agent, "task-a", PromptAuthor::OrchestratorAgent, "say hi", None)
        .await
        .unwrap();
    store.update_prompt_summary(prompt, "Greets the user").await.unwrap();
}
