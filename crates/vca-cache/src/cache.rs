//! Component C: the three-tier read cache (SS4.3).
//!
//! `get` probes L1, then L2, then L3, promoting on every hit so the
//! next lookup for the same key is satisfied by a faster tier. `set`
//! writes through all three. `invalidate_pattern` is pattern-scoped:
//! the raw (pre-hash) key is kept in a small registry per namespace so
//! a glob can still match against it even though the stored key itself
//! is opaque.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::CacheResult;
use crate::key::{glob_match, hashed_key};
use crate::l1::L1Cache;
use crate::l2::L2Cache;
use crate::l3::L3Cache;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1_capacity: usize,
    pub l3_default_ttl_secs: i64,
    pub l2_redis_url: Option<String>,
    pub l2_default_ttl_secs: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            l1_capacity: std::env::var("VCA_CACHE_L1_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            l3_default_ttl_secs: std::env::var("VCA_CACHE_L3_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            l2_redis_url: std::env::var("REDIS_URL").ok(),
            l2_default_ttl_secs: std::env::var("VCA_CACHE_L2_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 100,
            l3_default_ttl_secs: 3600,
            l2_redis_url: None,
            l2_default_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
}

struct Registry {
    // namespace -> raw keys that have been set under it, so
    // invalidate_pattern can match against pre-hash keys.
    raw_keys: HashMap<String, HashSet<String>>,
}

pub struct Cache {
    l1: L1Cache,
    l2: L2Cache,
    l3: L3Cache,
    registry: Mutex<Registry>,
    stats: Mutex<CacheStats>,
}

impl Cache {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Ok(Self {
            l1: L1Cache::new(config.l1_capacity),
            l2: L2Cache::new(config.l2_redis_url.as_deref(), config.l2_default_ttl_secs)?,
            l3: L3Cache::new(config.l3_default_ttl_secs),
            registry: Mutex::new(Registry {
                raw_keys: HashMap::new(),
            }),
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub async fn get_json(&self, namespace: &str, raw_key: &str) -> Option<Value> {
        let key = hashed_key(namespace, raw_key);

        if let Some(value) = self.l1.get(&key) {
            self.record_hit(|s| s.l1_hits += 1);
            metrics::counter!("vca_cache_hit_total", "tier" => "l1").increment(1);
            return Some(value);
        }

        if let Some(value) = self.l2.get(&key).await {
            self.record_hit(|s| s.l2_hits += 1);
            metrics::counter!("vca_cache_hit_total", "tier" => "l2").increment(1);
            self.l1.set(key.clone(), value.clone());
            return Some(value);
        }

        if let Some(value) = self.l3.get(&key) {
            self.record_hit(|s| s.l3_hits += 1);
            metrics::counter!("vca_cache_hit_total", "tier" => "l3").increment(1);
            self.l1.set(key.clone(), value.clone());
            self.l2.set(&key, &value, None).await;
            return Some(value);
        }

        self.stats.lock().unwrap().misses += 1;
        metrics::counter!("vca_cache_miss_total").increment(1);
        None
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, raw_key: &str) -> Option<T> {
        let value = self.get_json(namespace, raw_key).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        raw_key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let json = serde_json::to_value(value)?;
        let key = hashed_key(namespace, raw_key);

        self.l1.set(key.clone(), json.clone());
        self.l2.set(&key, &json, ttl.map(|t| t.as_secs())).await;
        self.l3
            .set(key, json, ttl.map(|t| t.as_secs() as i64));

        self.registry
            .lock()
            .unwrap()
            .raw_keys
            .entry(namespace.to_string())
            .or_default()
            .insert(raw_key.to_string());

        Ok(())
    }

    /// Removes every key in `namespace` whose `namespace:raw_key` form
    /// matches `pattern`, e.g. `invalidate_pattern("v1:*", "video")`.
    pub async fn invalidate_pattern(&self, namespace: &str, pattern: &str) {
        let matches: Vec<String> = {
            let mut registry = self.registry.lock().unwrap();
            let Some(keys) = registry.raw_keys.get_mut(namespace) else {
                return;
            };
            let matched: Vec<String> = keys
                .iter()
                .filter(|raw_key| glob_match(pattern, raw_key))
                .cloned()
                .collect();
            for raw_key in &matched {
                keys.remove(raw_key);
            }
            matched
        };

        for raw_key in matches {
            let key = hashed_key(namespace, &raw_key);
            self.l1.remove(&key);
            self.l2.remove(&key).await;
            self.l3.remove(&key);
            metrics::counter!("vca_cache_invalidation_total", "namespace" => namespace.to_string())
                .increment(1);
        }
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    fn record_hit(&self, apply: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.lock().unwrap();
        stats.hits += 1;
        apply(&mut stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> Cache {
        Cache::new(CacheConfig {
            l1_capacity: 10,
            l3_default_ttl_secs: 3600,
            l2_redis_url: None,
            l2_default_ttl_secs: 3600,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = test_cache();
        cache.set("video", "v1:frames", &vec![1, 2, 3], None).await.unwrap();
        let got: Option<Vec<i32>> = cache.get("video", "v1:frames").await;
        assert_eq!(got, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let cache = test_cache();
        let got: Option<Vec<i32>> = cache.get("video", "unknown").await;
        assert_eq!(got, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn invalidate_pattern_removes_matching_keys_only() {
        let cache = test_cache();
        cache.set("video", "v1:frames", &1, None).await.unwrap();
        cache.set("video", "v1:captions", &2, None).await.unwrap();
        cache.set("video", "v2:frames", &3, None).await.unwrap();

        cache.invalidate_pattern("video", "v1:*").await;

        assert_eq!(cache.get::<i32>("video", "v1:frames").await, None);
        assert_eq!(cache.get::<i32>("video", "v1:captions").await, None);
        assert_eq!(cache.get::<i32>("video", "v2:frames").await, Some(3));
    }

    #[tokio::test]
    async fn hit_counts_promote_through_tiers() {
        let cache = test_cache();
        cache.set("video", "v1", &"value", None).await.unwrap();
        let _: Option<String> = cache.get("video", "v1").await;
        assert_eq!(cache.stats().l1_hits, 1);
    }
}
