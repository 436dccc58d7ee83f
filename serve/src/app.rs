//! Axum app: shared state, router, and CORS.

use axum::routing::{get, post};
use axum::Router;
use config::Settings;
use maestro::{AgentManager, EventHub, OrchestratorService, Store};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use super::routes;
use super::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrchestratorService>,
    pub manager: Arc<AgentManager>,
    pub store: Store,
    pub hub: Arc<EventHub>,
    pub orchestrator_id: Uuid,
    pub settings: Settings,
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let wildcard = settings.cors_origins.iter().any(|o| o == "*");
    let origins: Vec<axum::http::HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if wildcard || origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings);
    Router::new()
        .route("/health", get(routes::health))
        .route("/get_orchestrator", get(routes::get_orchestrator))
        .route("/get_headers", get(routes::get_headers))
        .route("/load_chat", post(routes::load_chat))
        .route("/send_chat", post(routes::send_chat))
        .route("/get_events", get(routes::get_events))
        .route("/list_agents", get(routes::list_agents))
        .route("/api/orchestrator/reset", post(routes::reset_orchestrator))
        .route("/api/cache/clear", post(routes::clear_cache))
        .route("/api/metrics/tokens", get(routes::token_metrics))
        .route("/api/metrics/cache", get(routes::cache_metrics))
        .route("/api/metrics/costs", get(routes::cost_metrics))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}
