//! Maestro server binary: resolve or create the orchestrator, wire the
//! runtime together, and serve the HTTP/WS surface.
//!
//! Exit codes: 0 on clean shutdown, 1 on any fatal init failure (missing
//! DATABASE_URL, unknown resume session, unreadable prompt files).

mod logging;

use clap::Parser;
use config::Settings;
use maestro::economy::TokenEconomy;
use maestro::sdk::{ProcessConnector, SdkConnector};
use maestro::{AgentManager, EventHub, OrchestratorService, Store, Summarizer};
use serve::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(about = "Maestro: multi-agent orchestration server")]
struct Args {
    /// Resume an existing orchestrator session (SDK session token)
    #[arg(long, value_name = "TOKEN")]
    session: Option<String>,

    /// Working directory for the orchestrator and its agents
    #[arg(long, value_name = "DIR")]
    cwd: Option<String>,
}

fn read_prompt(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed to read prompt file {path}: {e}"))
}

/// Replaces the `{{SUBAGENT_MAP}}` placeholder with the discovered template
/// list, so the orchestrator knows which specialists it can spawn.
fn inject_subagent_map(prompt: &str, manager: &AgentManager) -> String {
    if !prompt.contains("{{SUBAGENT_MAP}}") {
        return prompt.to_string();
    }
    let templates = manager.templates().list();
    let map = if templates.is_empty() {
        "No subagent templates available. Create templates in `.claude/agents/` to enable \
         specialized agents."
            .to_string()
    } else {
        templates
            .iter()
            .map(|t| {
                format!(
                    "- **{}**: {}",
                    t["name"].as_str().unwrap_or(""),
                    t["description"].as_str().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    prompt.replace("{{SUBAGENT_MAP}}", &map)
}

async fn run(args: Args, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("initializing database connection pool");
    let store = Store::connect(&settings).await?;

    let working_dir: PathBuf = args
        .cwd
        .clone()
        .or_else(|| settings.working_dir.clone())
        .map(PathBuf::from)
        .map_or_else(std::env::current_dir, Ok)?;
    tracing::info!(dir = %working_dir.display(), "working directory");

    // Resolve the orchestrator: resume by session token, or create fresh.
    let orchestrator = match &args.session {
        Some(session) => {
            let found = store.get_orchestrator_by_session(session).await?;
            match found {
                Some(orch) => {
                    tracing::info!(
                        id = %orch.id,
                        tokens = orch.input_tokens + orch.output_tokens,
                        cost = orch.total_cost,
                        "resumed orchestrator session"
                    );
                    orch
                }
                None => {
                    return Err(format!(
                        "Session ID '{session}' not found in orchestrator_agents.session_id. \
                         Remove the --session argument to start a fresh session."
                    )
                    .into());
                }
            }
        }
        None => {
            let system_prompt = read_prompt(&settings.orchestrator_prompt_path)?;
            let orch = store
                .create_orchestrator(&system_prompt, &working_dir.to_string_lossy())
                .await?;
            tracing::info!(id = %orch.id, "created new orchestrator");
            orch
        }
    };

    let summarizer_system = read_prompt(&settings.summarizer_system_prompt_path)?;
    let summarizer_user = read_prompt(&settings.summarizer_user_prompt_path)?;

    let hub = Arc::new(EventHub::new(
        Duration::from_secs(settings.ping_interval_secs),
        Duration::from_secs(settings.connection_timeout_secs),
    ));
    let connector: Arc<dyn SdkConnector> =
        Arc::new(ProcessConnector::new(settings.sdk_command.clone()));
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&connector),
        settings.fast_model.clone(),
        summarizer_system,
        summarizer_user,
        Duration::from_secs(settings.summarizer_timeout_secs),
    ));

    let manager = AgentManager::new(
        orchestrator.id,
        store.clone(),
        Arc::clone(&hub),
        Arc::clone(&summarizer),
        Arc::clone(&connector),
        working_dir.clone(),
        settings.default_agent_model.clone(),
        settings.max_agent_turns,
        settings.economy.max_context_tokens,
        Duration::from_secs(settings.sdk_timeout_secs),
    );

    let economy = settings
        .economy
        .enabled
        .then(|| Arc::new(TokenEconomy::new(&settings.economy)));
    if economy.is_some() {
        tracing::info!("token economy enabled");
    }

    let system_prompt = inject_subagent_map(&orchestrator.system_prompt, &manager);
    let resume = args.session.clone().or_else(|| orchestrator.session_id.clone());
    let service = OrchestratorService::new(
        store.clone(),
        Arc::clone(&hub),
        summarizer,
        connector,
        Arc::clone(&manager),
        economy,
        working_dir,
        system_prompt,
        settings.orchestrator_model.clone(),
        Duration::from_secs(settings.sdk_timeout_secs),
        resume,
    );

    hub.start_keepalive().await;

    let state = Arc::new(AppState {
        service,
        manager,
        store: store.clone(),
        hub: Arc::clone(&hub),
        orchestrator_id: orchestrator.id,
        settings: settings.clone(),
    });
    let router = serve::router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "maestro listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    hub.stop_keepalive().await;
    store.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_and_apply(None) {
        eprintln!("config error: {e}");
        std::process::exit(1);
    }
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };
    let _log_guard = logging::init();

    let args = Args::parse();
    if let Err(e) = run(args, settings).await {
        tracing::error!("fatal: {e}");
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}
