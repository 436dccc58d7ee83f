//! LRU + TTL response cache keyed by MD5 of `prompt | context-hash`.

use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct Entry {
    value: Value,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Recency order, LRU first. Promotion moves a key to the back.
    order: Vec<String>,
    counters: Counters,
}

pub struct ResponseCache {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            max_size,
            ttl: Duration::from_secs(ttl_secs),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Cache key: MD5 of the prompt, or of `prompt|context_hash`.
    pub fn generate_key(prompt: &str, context_hash: Option<&str>) -> String {
        let material = match context_hash {
            Some(ctx) => format!("{prompt}|{ctx}"),
            None => prompt.to_string(),
        };
        format!("{:x}", md5::compute(material.as_bytes()))
    }

    /// Valid hit: promote to MRU and return the value. Expired entries are
    /// deleted on access and count as misses.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.entries.get(key) {
            None => {
                inner.counters.misses += 1;
                return None;
            }
            Some(entry) => entry.created_at.elapsed() > self.ttl,
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.counters.expirations += 1;
            inner.counters.misses += 1;
            return None;
        }
        let value = match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = Instant::now();
                entry.access_count += 1;
                entry.value.clone()
            }
            None => return None,
        };
        inner.counters.hits += 1;
        let pos = inner.order.iter().position(|k| k == key);
        if let Some(pos) = pos {
            let k = inner.order.remove(pos);
            inner.order.push(k);
        }
        Some(value)
    }

    /// Updates in place, or inserts with LRU eviction on overflow.
    pub async fn set(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value;
            entry.last_accessed = Instant::now();
            let pos = inner.order.iter().position(|k| k == key);
            if let Some(pos) = pos {
                let k = inner.order.remove(pos);
                inner.order.push(k);
            }
            return;
        }
        if inner.entries.len() >= self.max_size && !inner.order.is_empty() {
            let lru = inner.order.remove(0);
            inner.entries.remove(&lru);
            inner.counters.evictions += 1;
        }
        let now = Instant::now();
        inner.entries.insert(
            key.to_string(),
            Entry { value, created_at: now, last_accessed: now, access_count: 0 },
        );
        inner.order.push(key.to_string());
    }

    /// Empties the cache, returning how many entries were dropped.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        count
    }

    /// Removes entries whose key starts with `prefix`.
    pub async fn clear_pattern(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
        }
        doomed.len()
    }

    /// Drops every expired entry.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.counters.expirations += 1;
        }
        doomed.len()
    }

    pub async fn stats(&self) -> Value {
        let inner = self.inner.lock().await;
        let c = &inner.counters;
        let total = c.hits + c.misses;
        let hit_rate = if total > 0 { c.hits as f64 / total as f64 } else { 0.0 };
        json!({
            "size": inner.entries.len(),
            "max_size": self.max_size,
            "hits": c.hits,
            "misses": c.misses,
            "hit_rate": hit_rate,
            "evictions": c.evictions,
            "expirations": c.expirations,
            "ttl_seconds": self.ttl.as_secs(),
        })
    }
}
