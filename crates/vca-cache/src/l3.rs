//! L3: in-process, TTL-expiring fallback tier (SS4.3).
//!
//! Distinct from L1 in that entries expire by wall-clock time rather
//! than by recency; used for results that should outlive an LRU
//! eviction but still must not be served indefinitely stale.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct L3Cache {
    inner: Mutex<HashMap<String, Entry>>,
    default_ttl: chrono::Duration,
}

impl L3Cache {
    pub fn new(default_ttl_secs: i64) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            default_ttl: chrono::Duration::seconds(default_ttl_secs),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, value: Value, ttl_secs: Option<i64>) {
        let ttl = ttl_secs
            .map(chrono::Duration::seconds)
            .unwrap_or(self.default_ttl);
        let entry = Entry {
            value,
            expires_at: Utc::now() + ttl,
        };
        self.inner.lock().unwrap().insert(key, entry);
    }

    pub fn remove(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }

    /// Drops every entry whose TTL has lapsed; called opportunistically
    /// rather than on a timer.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        self.inner.lock().unwrap().retain(|_, e| e.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = L3Cache::new(3600);
        cache.set("k".into(), Value::from(1), Some(-1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn live_entries_round_trip() {
        let cache = L3Cache::new(3600);
        cache.set("k".into(), Value::from(42), None);
        assert_eq!(cache.get("k"), Some(Value::from(42)));
    }

    #[test]
    fn sweep_expired_removes_only_stale_entries() {
        let cache = L3Cache::new(3600);
        cache.set("stale".into(), Value::from(1), Some(-1));
        cache.set("fresh".into(), Value::from(2), None);
        cache.sweep_expired();
        assert_eq!(cache.inner.lock().unwrap().len(), 1);
    }
}
