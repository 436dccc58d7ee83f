//! Token-economy control plane: context trimming, response caching, rate
//! limiting, cost tracking, model tiering, and the per-process budget.
//!
//! Everything here is switched by one flag (`EconomySettings::enabled`); the
//! orchestrator holds `Option<TokenEconomy>` and skips the whole plane when
//! it is off.

pub mod budget;
pub mod cache;
pub mod context;
pub mod cost;
pub mod model;
pub mod rate;

pub use budget::{SessionBudget, TaskKind};
pub use cache::ResponseCache;
pub use context::{ContextMessage, ContextTrimmer, MessageStats, TrimMode};
pub use cost::{CostAlert, CostAlertLevel, CostTracker};
pub use model::{ModelSelector, ModelTier};
pub use rate::{RateCheck, RateLimiter};

use config::EconomySettings;
use serde_json::{json, Value};

/// Estimated tokens for a text: ~4 characters per token, at least 1 for
/// non-empty input.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        0
    } else {
        ((text.len() / 4) as u64).max(1)
    }
}

/// The bundled control plane, built once per process.
pub struct TokenEconomy {
    pub trimmer: ContextTrimmer,
    pub cache: ResponseCache,
    pub rate_limiter: RateLimiter,
    pub cost_tracker: CostTracker,
    pub selector: ModelSelector,
    pub budget: SessionBudget,
    pub max_context_tokens: u64,
}

impl TokenEconomy {
    pub fn new(settings: &EconomySettings) -> Self {
        Self {
            trimmer: ContextTrimmer::new(
                settings.trim_max_messages,
                settings.trim_max_tokens,
                true,
                TrimMode::Balanced,
            ),
            cache: ResponseCache::new(settings.cache_max_size, settings.cache_ttl_secs),
            rate_limiter: RateLimiter::new(settings.tokens_per_minute, settings.backoff_threshold),
            cost_tracker: CostTracker::new(
                settings.cost_alert_threshold,
                settings.cost_critical_threshold,
            ),
            selector: ModelSelector::new(),
            budget: SessionBudget::new(
                settings.session_budget_tokens,
                settings.budget_simple_tokens,
                settings.budget_moderate_tokens,
                settings.budget_complex_tokens,
            ),
            max_context_tokens: settings.max_context_tokens,
        }
    }

    /// Combined snapshot for the metrics endpoint.
    pub async fn token_metrics(&self) -> Value {
        json!({
            "enabled": true,
            "rate_limiter": self.rate_limiter.stats().await,
            "cache": self.cache.stats().await,
            "costs": self.cost_tracker.global_stats().await,
            "model_selection": self.selector.usage_stats().await,
            "budget": self.budget.stats().await,
            "max_context_tokens": self.max_context_tokens,
        })
    }
}
