//! Per-session cost tracking with one-shot warning/critical alerts.
//!
//! One "session" is the orchestrator id as a string in the core. Alerts are
//! returned to the caller, which broadcasts them as `cost_alert` frames.

use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Pricing per 1M tokens (input, output), keyed by model id.
const MODEL_PRICING: &[(&str, f64, f64)] = &[
    ("claude-3-5-sonnet-20241022", 3.00, 15.00),
    ("claude-sonnet-4-5-20250929", 3.00, 15.00),
    ("claude-3-5-haiku-20241022", 0.80, 4.00),
    ("claude-haiku-4-5-20251001", 0.80, 4.00),
    ("claude-3-opus-20240229", 15.00, 75.00),
    ("claude-opus-4-5", 15.00, 75.00),
];

/// Fallback pricing when the model is unknown (Sonnet rates).
const DEFAULT_PRICING: (f64, f64) = (3.00, 15.00);

fn pricing_for(model: &str) -> (f64, f64) {
    MODEL_PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(DEFAULT_PRICING)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostAlertLevel {
    Warning,
    Critical,
}

impl CostAlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostAlertLevel::Warning => "warning",
            CostAlertLevel::Critical => "critical",
        }
    }
}

/// Alert raised at most once per level per session.
#[derive(Clone, Debug)]
pub struct CostAlert {
    pub level: CostAlertLevel,
    pub session_id: String,
    pub cost: f64,
    pub threshold: f64,
    pub message: String,
}

impl CostAlert {
    pub fn to_payload(&self) -> Value {
        json!({
            "level": self.level.as_str(),
            "message": self.message,
            "session_id": self.session_id,
            "cost": self.cost,
            "threshold": self.threshold,
        })
    }
}

#[derive(Default)]
struct SessionCost {
    input_tokens: u64,
    output_tokens: u64,
    total_cost: f64,
    request_count: u64,
    /// 0 = none sent, 1 = warning sent, 2 = critical sent.
    alerts_sent: u8,
}

#[derive(Default)]
struct Global {
    total_cost: f64,
    total_requests: u64,
}

pub struct CostTracker {
    alert_threshold: f64,
    critical_threshold: f64,
    sessions: Mutex<HashMap<String, SessionCost>>,
    global: Mutex<Global>,
}

impl CostTracker {
    pub fn new(alert_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            alert_threshold,
            critical_threshold,
            sessions: Mutex::new(HashMap::new()),
            global: Mutex::new(Global::default()),
        }
    }

    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64, model: &str) -> f64 {
        let (input_rate, output_rate) = pricing_for(model);
        (input_tokens as f64 / 1_000_000.0) * input_rate
            + (output_tokens as f64 / 1_000_000.0) * output_rate
    }

    /// Records usage, returning the request cost, the session total, and an
    /// alert when a threshold was crossed for the first time.
    pub async fn record_usage(
        &self,
        session_id: &str,
        input_tokens: u64,
        output_tokens: u64,
        model: &str,
    ) -> (f64, f64, Option<CostAlert>) {
        let cost = self.calculate_cost(input_tokens, output_tokens, model);

        let (session_total, alert) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.entry(session_id.to_string()).or_default();
            session.input_tokens += input_tokens;
            session.output_tokens += output_tokens;
            session.total_cost += cost;
            session.request_count += 1;

            let alert = if session.total_cost >= self.critical_threshold && session.alerts_sent < 2
            {
                session.alerts_sent = 2;
                Some(self.build_alert(session_id, session.total_cost, CostAlertLevel::Critical))
            } else if session.total_cost >= self.alert_threshold && session.alerts_sent < 1 {
                session.alerts_sent = 1;
                Some(self.build_alert(session_id, session.total_cost, CostAlertLevel::Warning))
            } else {
                None
            };
            (session.total_cost, alert)
        };

        let mut global = self.global.lock().await;
        global.total_cost += cost;
        global.total_requests += 1;

        (cost, session_total, alert)
    }

    fn build_alert(&self, session_id: &str, cost: f64, level: CostAlertLevel) -> CostAlert {
        let threshold = match level {
            CostAlertLevel::Warning => self.alert_threshold,
            CostAlertLevel::Critical => self.critical_threshold,
        };
        let head: String = session_id.chars().take(8).collect();
        CostAlert {
            level,
            session_id: session_id.to_string(),
            cost,
            threshold,
            message: format!(
                "Session {head}... has reached ${threshold:.2} cost threshold (current: ${cost:.2})"
            ),
        }
    }

    pub async fn session_stats(&self, session_id: &str) -> Option<Value> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(session_id)?;
        Some(json!({
            "session_id": session_id,
            "total_cost": session.total_cost,
            "total_input_tokens": session.input_tokens,
            "total_output_tokens": session.output_tokens,
            "total_tokens": session.input_tokens + session.output_tokens,
            "request_count": session.request_count,
            "alerts_sent": session.alerts_sent,
        }))
    }

    pub async fn global_stats(&self) -> Value {
        let global = self.global.lock().await;
        let sessions = self.sessions.lock().await;
        let avg = if global.total_requests > 0 {
            global.total_cost / global.total_requests as f64
        } else {
            0.0
        };
        json!({
            "total_cost": global.total_cost,
            "total_requests": global.total_requests,
            "session_count": sessions.len(),
            "average_cost_per_request": avg,
            "alert_threshold": self.alert_threshold,
            "critical_threshold": self.critical_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_pricing_is_used() {
        let tracker = CostTracker::new(10.0, 50.0);
        let haiku = tracker.calculate_cost(1_000_000, 1_000_000, "claude-haiku-4-5-20251001");
        assert!((haiku - 4.80).abs() < 1e-9);
        let sonnet = tracker.calculate_cost(1_000_000, 0, "claude-sonnet-4-5-20250929");
        assert!((sonnet - 3.00).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let tracker = CostTracker::new(10.0, 50.0);
        let cost = tracker.calculate_cost(1_000_000, 1_000_000, "totally-new-model");
        assert!((cost - 18.00).abs() < 1e-9);
    }

    #[tokio::test]
    async fn warning_alert_fires_exactly_once() {
        let tracker = CostTracker::new(0.01, 100.0);
        let (_, _, first) = tracker.record_usage("s1", 10_000_000, 0, "claude-opus-4-5").await;
        let alert = first.expect("first crossing should alert");
        assert_eq!(alert.level, CostAlertLevel::Warning);
        assert!(alert.message.contains("cost threshold"));

        let (_, _, second) = tracker.record_usage("s1", 10_000_000, 0, "claude-opus-4-5").await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn critical_alert_fires_after_warning() {
        let tracker = CostTracker::new(0.01, 0.5);
        let (_, _, warn) = tracker.record_usage("s1", 10_000, 0, "claude-opus-4-5").await;
        assert_eq!(warn.unwrap().level, CostAlertLevel::Warning);

        // Push past critical (0.5 USD).
        let (_, total, critical) =
            tracker.record_usage("s1", 40_000_000, 0, "claude-opus-4-5").await;
        assert!(total > 0.5);
        assert_eq!(critical.unwrap().level, CostAlertLevel::Critical);

        let (_, _, again) = tracker.record_usage("s1", 1_000_000, 0, "claude-opus-4-5").await;
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let tracker = CostTracker::new(10.0, 50.0);
        tracker.record_usage("a", 1000, 500, "claude-sonnet-4-5-20250929").await;
        tracker.record_usage("b", 2000, 100, "claude-sonnet-4-5-20250929").await;
        let a = tracker.session_stats("a").await.unwrap();
        let b = tracker.session_stats("b").await.unwrap();
        assert_eq!(a["total_input_tokens"], 1000);
        assert_eq!(b["total_input_tokens"], 2000);
        assert!(tracker.session_stats("c").await.is_none());
        let global = tracker.global_stats().await;
        assert_eq!(global["total_requests"], 2);
        assert_eq!(global["session_count"], 2);
    }
}
