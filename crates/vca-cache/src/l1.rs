//! L1: bounded in-process LRU (SS4.3).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde_json::Value;

pub struct L1Cache {
    inner: Mutex<LruCache<String, Value>>,
}

impl L1Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: String, value: Value) {
        self.inner.lock().unwrap().put(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.inner.lock().unwrap().pop(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_on_overflow() {
        let cache = L1Cache::new(2);
        cache.set("a".into(), Value::from(1));
        cache.set("b".into(), Value::from(2));
        // touch "a" so "b" becomes the least-recently-used entry
        assert!(cache.get("a").is_some());
        cache.set("c".into(), Value::from(3));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }
}
