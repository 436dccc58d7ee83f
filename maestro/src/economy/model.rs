//! Heuristic model tiering: score the user message against simple/complex
//! keyword tables and pick the cheapest tier that fits.

use serde_json::{json, Value};
use tokio::sync::Mutex;

pub const CHEAP_MODEL: &str = "claude-3-haiku-20240307";
pub const MID_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const PREMIUM_MODEL: &str = "claude-3-5-opus-latest";

/// Weighted indicators of a simple task.
const SIMPLE_INDICATORS: &[(&str, u32)] = &[
    ("read", 2), ("open", 2), ("cat", 2), ("ls", 2),
    ("list", 2), ("show", 2), ("view", 2), ("display", 2),
    ("explain", 2), ("what is", 3), ("what's", 2),
    ("describe", 2), ("tell me about", 3),
    ("documentation", 3), ("docs", 2), ("help", 2),
    ("config", 2), ("setting", 2), ("environment", 2),
    (".env", 3), ("variable", 2), ("parameter", 2),
    ("status", 2), ("check", 2), ("verify", 2),
    ("confirm", 2), ("test", 2), ("validate", 2),
    ("run", 2), ("execute", 2), ("start", 2),
    ("stop", 2), ("restart", 2), ("clear", 2),
    ("version", 3), ("usage", 2), ("example", 2),
    ("typo", 3), ("spacing", 3), ("indent", 3),
    ("rename", 2), ("move", 2), ("copy", 2),
];

/// Weighted indicators of a complex task.
const COMPLEX_INDICATORS: &[(&str, u32)] = &[
    ("architect", 5), ("design", 3), ("refactor", 4),
    ("restructure", 4), ("redesign", 4), ("framework", 3),
    ("analyze", 3), ("optimize", 3), ("performance", 3),
    ("security", 3), ("vulnerability", 4), ("audit", 3),
    ("integrate", 3), ("migration", 4), ("upgrade", 3),
    ("synchronize", 3), ("orchestrate", 3), ("coordinate", 3),
    ("debug", 2), ("investigate", 3), ("root cause", 4),
    ("diagnose", 3), ("troubleshoot", 3), ("trace", 2),
    ("strategy", 4), ("roadmap", 4), ("planning", 3),
    ("proposal", 3), ("recommendation", 3), ("decision", 2),
    ("multiple", 2), ("several", 2), ("various", 2),
    ("entire", 2), ("whole", 2), ("comprehensive", 3),
    ("complex", 5), ("complicated", 4), ("advanced", 3),
    ("sophisticated", 4), ("intricate", 4),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
    Cheap,
    Mid,
    Premium,
}

impl ModelTier {
    pub fn model(&self) -> &'static str {
        match self {
            ModelTier::Cheap => CHEAP_MODEL,
            ModelTier::Mid => MID_MODEL,
            ModelTier::Premium => PREMIUM_MODEL,
        }
    }
}

#[derive(Default)]
struct TierCounts {
    cheap: u64,
    mid: u64,
    premium: u64,
}

pub struct ModelSelector {
    counts: Mutex<TierCounts>,
}

impl ModelSelector {
    pub fn new() -> Self {
        Self { counts: Mutex::new(TierCounts::default()) }
    }

    fn score(message_lower: &str, table: &[(&str, u32)]) -> u32 {
        table
            .iter()
            .filter(|(keyword, _)| message_lower.contains(keyword))
            .map(|(_, weight)| weight)
            .sum()
    }

    fn classify(message: &str) -> ModelTier {
        let lower = message.to_lowercase();
        let length = message.len();

        let mut simple = Self::score(&lower, SIMPLE_INDICATORS);
        let mut complex = Self::score(&lower, COMPLEX_INDICATORS);

        if length < 50 {
            simple += 3;
        } else if length > 500 {
            complex += 2;
        }
        if lower.contains("```") || lower.contains("function") || lower.contains("class") {
            complex += 3;
        }
        if lower.ends_with('?') && length < 100 {
            simple += 2;
        }

        if complex >= 6 || (lower.contains("architect") && lower.contains("design")) {
            ModelTier::Premium
        } else if simple >= 5 && complex < 2 {
            ModelTier::Cheap
        } else {
            ModelTier::Mid
        }
    }

    /// Picks the tier for a user message and records the decision.
    pub async fn select(&self, message: &str) -> ModelTier {
        let tier = Self::classify(message);
        let mut counts = self.counts.lock().await;
        match tier {
            ModelTier::Cheap => counts.cheap += 1,
            ModelTier::Mid => counts.mid += 1,
            ModelTier::Premium => counts.premium += 1,
        }
        tracing::info!(
            tier = ?tier,
            cheap = counts.cheap,
            mid = counts.mid,
            premium = counts.premium,
            "model selected"
        );
        tier
    }

    /// Per-tier counts plus the estimated cost reduction against an
    /// all-mid-tier baseline (cheap ~5% of mid, premium ~5x mid).
    pub async fn usage_stats(&self) -> Value {
        let counts = self.counts.lock().await;
        let total = counts.cheap + counts.mid + counts.premium;
        if total == 0 {
            return json!({
                "cheap_count": 0,
                "mid_count": 0,
                "premium_count": 0,
                "total_requests": 0,
                "cost_reduction_percentage": 0.0,
            });
        }
        let actual =
            counts.cheap as f64 * 0.05 + counts.mid as f64 * 1.0 + counts.premium as f64 * 5.0;
        let baseline = total as f64;
        let reduction = (baseline - actual) / baseline * 100.0;
        json!({
            "cheap_count": counts.cheap,
            "mid_count": counts.mid,
            "premium_count": counts.premium,
            "cheap_percentage": counts.cheap as f64 / total as f64 * 100.0,
            "mid_percentage": counts.mid as f64 / total as f64 * 100.0,
            "premium_percentage": counts.premium as f64 / total as f64 * 100.0,
            "total_requests": total,
            "cost_reduction_percentage": reduction,
        })
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simple_reads_pick_the_cheap_tier() {
        let selector = ModelSelector::new();
        assert_eq!(selector.select("read config.py").await, ModelTier::Cheap);
    }

    #[tokio::test]
    async fn moderate_work_picks_the_mid_tier() {
        let selector = ModelSelector::new();
        assert_eq!(selector.select("implement auth").await, ModelTier::Mid);
    }

    #[tokio::test]
    async fn architecture_work_picks_the_premium_tier() {
        let selector = ModelSelector::new();
        assert_eq!(
            selector.select("redesign the entire architecture").await,
            ModelTier::Premium
        );
    }

    #[tokio::test]
    async fn code_fences_bias_toward_complex() {
        let selector = ModelSelector::new();
        let message = format!(
            "please analyze and optimize this for performance {} ```\nfn main() {{}}\n```",
            "x".repeat(120)
        );
        assert_eq!(selector.select(&message).await, ModelTier::Premium);
    }

    #[tokio::test]
    async fn usage_stats_track_counts_and_reduction() {
        let selector = ModelSelector::new();
        selector.select("read config.py").await; // cheap
        selector.select("implement auth").await; // mid
        let stats = selector.usage_stats().await;
        assert_eq!(stats["cheap_count"], 1);
        assert_eq!(stats["mid_count"], 1);
        assert_eq!(stats["total_requests"], 2);
        // (2 - (0.05 + 1.0)) / 2 * 100 = 47.5
        assert!((stats["cost_reduction_percentage"].as_f64().unwrap() - 47.5).abs() < 1e-9);
    }

    #[test]
    fn tier_maps_to_model_ids() {
        assert_eq!(ModelTier::Cheap.model(), CHEAP_MODEL);
        assert_eq!(ModelTier::Mid.model(), MID_MODEL);
        assert_eq!(ModelTier::Premium.model(), PREMIUM_MODEL);
    }
}
