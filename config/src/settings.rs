//! Typed runtime settings resolved from the environment, with defaults.

use crate::LoadError;

fn var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, LoadError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LoadError::Invalid { key, value: raw }),
    }
}

fn flag_or(key: &'static str, default: bool) -> Result<bool, LoadError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(LoadError::Invalid { key, value: raw }),
        },
    }
}

/// Token-economy tunables (§ token budget / cache / rate limiting).
#[derive(Clone, Debug)]
pub struct EconomySettings {
    pub enabled: bool,
    /// Model context window capacity; the single source of truth for
    /// context-usage percentages.
    pub max_context_tokens: u64,
    pub trim_max_messages: usize,
    pub trim_max_tokens: u64,
    pub cache_max_size: usize,
    pub cache_ttl_secs: u64,
    pub tokens_per_minute: u64,
    pub backoff_threshold: f64,
    pub cost_alert_threshold: f64,
    pub cost_critical_threshold: f64,
    pub session_budget_tokens: u64,
    pub budget_simple_tokens: u64,
    pub budget_moderate_tokens: u64,
    pub budget_complex_tokens: u64,
}

/// All runtime settings. Constructed once at boot via [`Settings::from_env`]
/// and passed down by reference; components never read the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
    /// Default working directory; the `--cwd` CLI flag overrides it.
    pub working_dir: Option<String>,
    pub orchestrator_model: String,
    pub default_agent_model: String,
    pub fast_model: String,
    /// Binary the SDK subprocess transport spawns.
    pub sdk_command: String,
    pub orchestrator_prompt_path: String,
    pub summarizer_system_prompt_path: String,
    pub summarizer_user_prompt_path: String,
    pub ping_interval_secs: u64,
    pub connection_timeout_secs: u64,
    pub db_min_connections: u32,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub sdk_timeout_secs: u64,
    pub summarizer_timeout_secs: u64,
    pub max_agent_turns: u32,
    pub chat_history_limit: i64,
    pub agent_log_limit: i64,
    pub system_log_limit: i64,
    pub economy: EconomySettings,
}

impl Settings {
    /// Resolves settings from the environment. `DATABASE_URL` is the only
    /// required key; everything else has a default.
    pub fn from_env() -> Result<Self, LoadError> {
        let database_url = var("DATABASE_URL").ok_or(LoadError::Missing("DATABASE_URL"))?;

        let cors_origins = var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]);

        Ok(Self {
            database_url,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8200".into()),
            cors_origins,
            working_dir: var("MAESTRO_WORKING_DIR"),
            orchestrator_model: var("ORCHESTRATOR_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".into()),
            default_agent_model: var("DEFAULT_AGENT_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".into()),
            fast_model: var("FAST_MODEL").unwrap_or_else(|| "claude-haiku-4-5-20251001".into()),
            sdk_command: var("SDK_COMMAND").unwrap_or_else(|| "claude".into()),
            orchestrator_prompt_path: var("ORCHESTRATOR_PROMPT_PATH")
                .unwrap_or_else(|| "prompts/orchestrator_system_prompt.md".into()),
            summarizer_system_prompt_path: var("SUMMARIZER_SYSTEM_PROMPT_PATH")
                .unwrap_or_else(|| "prompts/event_summarizer_system_prompt.md".into()),
            summarizer_user_prompt_path: var("SUMMARIZER_USER_PROMPT_PATH")
                .unwrap_or_else(|| "prompts/event_summarizer_user_prompt.md".into()),
            ping_interval_secs: parse_or("WS_PING_INTERVAL", 30)?,
            connection_timeout_secs: parse_or("WS_CONNECTION_TIMEOUT", 60)?,
            db_min_connections: parse_or("DB_MIN_CONNECTIONS", 5)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 20)?,
            db_acquire_timeout_secs: parse_or("DB_ACQUIRE_TIMEOUT", 180)?,
            sdk_timeout_secs: parse_or("SDK_TIMEOUT", 300)?,
            summarizer_timeout_secs: parse_or("SUMMARIZER_TIMEOUT", 30)?,
            max_agent_turns: parse_or("MAX_AGENT_TURNS", 50)?,
            chat_history_limit: parse_or("CHAT_HISTORY_LIMIT", 50)?,
            agent_log_limit: parse_or("AGENT_LOG_LIMIT", 100)?,
            system_log_limit: parse_or("SYSTEM_LOG_LIMIT", 50)?,
            economy: EconomySettings {
                enabled: flag_or("TOKEN_ECONOMY_ENABLED", true)?,
                max_context_tokens: parse_or("MAX_CONTEXT_TOKENS", 200_000)?,
                trim_max_messages: parse_or("TRIM_MAX_MESSAGES", 50)?,
                trim_max_tokens: parse_or("TRIM_MAX_TOKENS", 50_000)?,
                cache_max_size: parse_or("CACHE_MAX_SIZE", 100)?,
                cache_ttl_secs: parse_or("CACHE_TTL", 3600)?,
                tokens_per_minute: parse_or("TOKENS_PER_MINUTE", 400_000)?,
                backoff_threshold: parse_or("RATE_BACKOFF_THRESHOLD", 0.8)?,
                cost_alert_threshold: parse_or("COST_ALERT_THRESHOLD", 10.0)?,
                cost_critical_threshold: parse_or("COST_CRITICAL_THRESHOLD", 50.0)?,
                session_budget_tokens: parse_or("SESSION_BUDGET_TOKENS", 50_000)?,
                budget_simple_tokens: parse_or("BUDGET_SIMPLE_TOKENS", 5_000)?,
                budget_moderate_tokens: parse_or("BUDGET_MODERATE_TOKENS", 15_000)?,
                budget_complex_tokens: parse_or("BUDGET_COMPLEX_TOKENS", 30_000)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Settings tests share DATABASE_URL; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, LoadError::Missing("DATABASE_URL")));
    }

    #[test]
    fn defaults_apply_when_only_database_url_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/maestro_test");
        std::env::remove_var("WS_PING_INTERVAL");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.ping_interval_secs, 30);
        assert_eq!(s.connection_timeout_secs, 60);
        assert_eq!(s.db_min_connections, 5);
        assert_eq!(s.db_max_connections, 20);
        assert_eq!(s.economy.max_context_tokens, 200_000);
        assert_eq!(s.economy.session_budget_tokens, 50_000);
        assert!(s.economy.enabled);
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    fn invalid_number_is_reported_with_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/maestro_test");
        std::env::set_var("WS_PING_INTERVAL", "soon");
        let err = Settings::from_env().unwrap_err();
        match err {
            LoadError::Invalid { key, value } => {
                assert_eq!(key, "WS_PING_INTERVAL");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
        std::env::remove_var("WS_PING_INTERVAL");
        std::env::remove_var("DATABASE_URL");
    }
}
