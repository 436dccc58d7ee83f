//! Surface-level tests: REST routing and the WS welcome/broadcast path.
//! Run with `cargo test -- --ignored` and a disposable DATABASE_URL.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use config::Settings;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use maestro::sdk::{MockConnector, SdkConnector};
use maestro::{AgentManager, EventHub, OrchestratorService, Store, Summarizer};
use serde_json::{json, Value};
use serve::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
    let settings = Settings::from_env().expect("DATABASE_URL must point at a test database");
    let store = Store::connect(&settings).await.expect("connect test database");
    let workdir = tempfile::tempdir().unwrap();
    let orch = store
        .create_orchestrator("You are the orchestrator.", &workdir.path().to_string_lossy())
        .await
        .unwrap();

    let hub = Arc::new(EventHub::new(Duration::from_secs(30), Duration::from_secs(60)));
    let connector: Arc<dyn SdkConnector> = Arc::new(MockConnector::new());
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&connector),
        "mock-fast",
        "Summarize.",
        "{event_type}: {details}",
        Duration::from_secs(2),
    ));
    let manager = AgentManager::new(
        orch.id,
        store.clone(),
        Arc::clone(&hub),
        Arc::clone(&summarizer),
        Arc::clone(&connector),
        workdir.path().to_path_buf(),
        "mock-model".to_string(),
        50,
        200_000,
        Duration::from_secs(30),
    );
    let service = OrchestratorService::new(
        store.clone(),
        Arc::clone(&hub),
        summarizer,
        connector,
        Arc::clone(&manager),
        None,
        workdir.path().to_path_buf(),
        "You are the orchestrator.".to_string(),
        "mock-model".to_string(),
        Duration::from_secs(30),
        None,
    );

    let state = Arc::new(AppState {
        service,
        manager,
        store,
        hub,
        orchestrator_id: orch.id,
        settings,
    });
    (state, workdir)
}

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = serve::router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn health_reports_service_and_connections() {
    let (state, _dir) = test_state().await;
    let (status, body) = get_json(state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "maestro");
    assert_eq!(body["websocket_connections"], 0);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn get_orchestrator_includes_tools_and_fallback_metadata() {
    let (state, _dir) = test_state().await;
    let (status, body) = get_json(state, "/get_orchestrator").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["orchestrator"]["id"].is_string());
    // No system message captured yet: the fallback block is served.
    assert_eq!(body["orchestrator"]["metadata"]["system_message_info"]["subtype"], "fallback");
    assert_eq!(body["orchestrator_tools"].as_array().unwrap().len(), 8);
    assert!(body["agent_templates"].as_array().is_some());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn send_chat_returns_immediately() {
    let (state, _dir) = test_state().await;
    let owner = state.orchestrator_id.to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/send_chat")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"message": "hi", "orchestrator_agent_id": owner}).to_string(),
        ))
        .unwrap();
    let response = serve::router(Arc::clone(&state)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "success");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn ws_clients_get_welcome_then_broadcasts() {
    let (state, _dir) = test_state().await;
    let hub = Arc::clone(&state.hub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, serve::router(state)).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");

    let welcome: Value = match socket.next().await.unwrap().unwrap() {
        tokio_tungstenite::tungstenite::Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(welcome["type"], "connection_established");
    assert!(welcome["timestamp"].is_string());

    hub.broadcast_agent_deleted("agent-1".to_string()).await;
    let frame: Value = match socket.next().await.unwrap().unwrap() {
        tokio_tungstenite::tungstenite::Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(frame["type"], "agent_deleted");
    assert_eq!(frame["agent_id"], "agent-1");
}
