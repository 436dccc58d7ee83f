//! Hard per-process token budget with one-shot 50/75/90% warnings and a
//! secondary cap per task kind. Once over the cap, spending halts until
//! `reset`.

use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Simple,
    Moderate,
    Complex,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Simple => "simple",
            TaskKind::Moderate => "moderate",
            TaskKind::Complex => "complex",
        }
    }
}

struct BudgetState {
    used: u64,
    warned_50: bool,
    warned_75: bool,
    warned_90: bool,
}

pub struct SessionBudget {
    limit: u64,
    simple_cap: u64,
    moderate_cap: u64,
    complex_cap: u64,
    state: Mutex<BudgetState>,
}

impl SessionBudget {
    pub fn new(limit: u64, simple_cap: u64, moderate_cap: u64, complex_cap: u64) -> Self {
        Self {
            limit,
            simple_cap,
            moderate_cap,
            complex_cap,
            state: Mutex::new(BudgetState {
                used: 0,
                warned_50: false,
                warned_75: false,
                warned_90: false,
            }),
        }
    }

    fn task_cap(&self, kind: TaskKind) -> u64 {
        match kind {
            TaskKind::Simple => self.simple_cap,
            TaskKind::Moderate => self.moderate_cap,
            TaskKind::Complex => self.complex_cap,
        }
    }

    /// Whether `estimated` more tokens may be spent on a task of `kind`.
    /// Returns `(allowed, warning)`; the warning fires once per threshold.
    pub async fn check_budget(&self, estimated: u64, kind: TaskKind) -> (bool, Option<String>) {
        let cap = self.task_cap(kind);
        if estimated > cap {
            return (
                false,
                Some(format!(
                    "TASK BUDGET EXCEEDED: {estimated} tokens estimated for a {} task (cap {cap})",
                    kind.as_str()
                )),
            );
        }

        let mut state = self.state.lock().await;
        let projected = state.used + estimated;
        if projected > self.limit {
            return (
                false,
                Some(format!(
                    "BUDGET EXCEEDED: {} of {} tokens already spent; {estimated} more would overrun",
                    state.used, self.limit
                )),
            );
        }

        let percent = projected as f64 / self.limit as f64 * 100.0;
        let warning = if percent >= 90.0 && !state.warned_90 {
            state.warned_90 = true;
            Some(format!("session budget at {percent:.0}% (90% threshold)"))
        } else if percent >= 75.0 && !state.warned_75 {
            state.warned_75 = true;
            Some(format!("session budget at {percent:.0}% (75% threshold)"))
        } else if percent >= 50.0 && !state.warned_50 {
            state.warned_50 = true;
            Some(format!("session budget at {percent:.0}% (50% threshold)"))
        } else {
            None
        };
        (true, warning)
    }

    /// Records actual spend. May push usage past the limit; subsequent
    /// checks then refuse.
    pub async fn record_usage(&self, tokens: u64) {
        let mut state = self.state.lock().await;
        state.used += tokens;
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.used = 0;
        state.warned_50 = false;
        state.warned_75 = false;
        state.warned_90 = false;
    }

    pub async fn stats(&self) -> Value {
        let state = self.state.lock().await;
        json!({
            "used_tokens": state.used,
            "limit_tokens": self.limit,
            "usage_percent": state.used as f64 / self.limit as f64 * 100.0,
            "task_caps": {
                "simple": self.simple_cap,
                "moderate": self.moderate_cap,
                "complex": self.complex_cap,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(limit: u64) -> SessionBudget {
        SessionBudget::new(limit, 5_000, 15_000, 30_000)
    }

    #[tokio::test]
    async fn allows_within_budget() {
        let b = budget(50_000);
        let (allowed, warning) = b.check_budget(1_000, TaskKind::Simple).await;
        assert!(allowed);
        assert!(warning.is_none());
    }

    #[tokio::test]
    async fn refuses_once_over_the_hard_cap() {
        let b = budget(1_000);
        for _ in 0..9 {
            b.record_usage(120).await;
        }
        // 1080 spent > 1000: next check refuses and no call is made.
        let (allowed, warning) = b.check_budget(120, TaskKind::Simple).await;
        assert!(!allowed);
        assert!(warning.unwrap().starts_with("BUDGET EXCEEDED"));
    }

    #[tokio::test]
    async fn task_kind_cap_refuses_oversized_requests() {
        let b = budget(1_000_000);
        let (allowed, warning) = b.check_budget(6_000, TaskKind::Simple).await;
        assert!(!allowed);
        assert!(warning.unwrap().contains("simple"));
        let (allowed, _) = b.check_budget(6_000, TaskKind::Moderate).await;
        assert!(allowed);
    }

    #[tokio::test]
    async fn warnings_fire_once_per_threshold() {
        let b = budget(10_000);
        b.record_usage(5_000).await;
        let (_, first) = b.check_budget(100, TaskKind::Simple).await;
        assert!(first.unwrap().contains("50%"));
        let (_, second) = b.check_budget(100, TaskKind::Simple).await;
        assert!(second.is_none());

        b.record_usage(2_600).await;
        let (_, third) = b.check_budget(100, TaskKind::Simple).await;
        assert!(third.unwrap().contains("75%"));

        b.record_usage(1_400).await;
        let (_, fourth) = b.check_budget(100, TaskKind::Simple).await;
        assert!(fourth.unwrap().contains("90%"));
    }

    #[tokio::test]
    async fn reset_restores_spending() {
        let b = budget(1_000);
        b.record_usage(2_000).await;
        let (allowed, _) = b.check_budget(10, TaskKind::Simple).await;
        assert!(!allowed);
        b.reset().await;
        let (allowed, _) = b.check_budget(10, TaskKind::Simple).await;
        assert!(allowed);
    }
}
