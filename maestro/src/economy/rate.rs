//! Sliding-window token rate limiter (60 s window, proactive backoff).
//!
//! The lock guards the window only; sleeping happens after it is released.

use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

struct UsageRecord {
    at: Instant,
    tokens: u64,
}

#[derive(Default)]
struct Totals {
    tokens: u64,
    requests: u64,
    backoff_events: u64,
}

struct Window {
    records: VecDeque<UsageRecord>,
    totals: Totals,
}

/// Outcome of a rate check, observed at check time (pre-sleep).
#[derive(Clone, Debug)]
pub struct RateCheck {
    pub waited: bool,
    pub wait_seconds: f64,
    pub current_usage: u64,
    pub usage_percent: f64,
}

pub struct RateLimiter {
    tokens_per_minute: u64,
    backoff_threshold: f64,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(tokens_per_minute: u64, backoff_threshold: f64) -> Self {
        Self {
            tokens_per_minute,
            backoff_threshold,
            window: Mutex::new(Window {
                records: VecDeque::new(),
                totals: Totals::default(),
            }),
        }
    }

    fn drop_stale(window: &mut Window) {
        while window.records.front().is_some_and(|r| r.at.elapsed() > WINDOW) {
            window.records.pop_front();
        }
    }

    fn current_usage(window: &Window) -> u64 {
        window.records.iter().map(|r| r.tokens).sum()
    }

    /// Checks whether a request of `estimated_tokens` can proceed. When the
    /// projected usage crosses the backoff threshold, waits until the oldest
    /// record ages out of the window (plus a 1 s buffer).
    pub async fn check_and_wait(&self, estimated_tokens: u64) -> RateCheck {
        let (waited, wait_seconds, current_usage, usage_percent) = {
            let mut window = self.window.lock().await;
            Self::drop_stale(&mut window);
            let current = Self::current_usage(&window);
            let projected = current + estimated_tokens;
            let percent = projected as f64 / self.tokens_per_minute as f64;

            let mut wait = 0.0f64;
            let mut waited = false;
            if percent >= self.backoff_threshold {
                if let Some(oldest) = window.records.front() {
                    let age = oldest.at.elapsed().as_secs_f64();
                    wait = (60.0 - age + 1.0).max(0.0);
                    if wait > 0.0 {
                        waited = true;
                        window.totals.backoff_events += 1;
                        tracing::warn!(
                            current,
                            cap = self.tokens_per_minute,
                            wait_seconds = wait,
                            "rate limit backoff"
                        );
                    }
                }
            }
            (waited, wait, current, percent)
        };

        if waited {
            tokio::time::sleep(Duration::from_secs_f64(wait_seconds)).await;
            tracing::info!("rate limit backoff complete");
        }

        RateCheck { waited, wait_seconds, current_usage, usage_percent }
    }

    /// Records actual post-call usage. Zero-token records are ignored.
    pub async fn record_usage(&self, tokens: u64) {
        if tokens == 0 {
            return;
        }
        let mut window = self.window.lock().await;
        window.records.push_back(UsageRecord { at: Instant::now(), tokens });
        window.totals.tokens += tokens;
        window.totals.requests += 1;
    }

    pub async fn reset(&self) {
        let mut window = self.window.lock().await;
        window.records.clear();
        window.totals = Totals::default();
    }

    pub async fn stats(&self) -> Value {
        let mut window = self.window.lock().await;
        Self::drop_stale(&mut window);
        let current = Self::current_usage(&window);
        json!({
            "current_usage": current,
            "max_tokens_per_minute": self.tokens_per_minute,
            "usage_percent": current as f64 / self.tokens_per_minute as f64,
            "total_tokens_used": window.totals.tokens,
            "total_requests": window.totals.requests,
            "backoff_events": window.totals.backoff_events,
            "window_size": window.records.len(),
        })
    }
}
