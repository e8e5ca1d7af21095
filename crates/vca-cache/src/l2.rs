//! L2: optional shared-KV tier backed by Redis (SS4.3).
//!
//! Absent a `redis_url`, every operation is a transparent no-op so the
//! rest of the cache can treat L2 uniformly whether or not it is wired
//! up, matching the optional-Redis posture the store already takes.

use redis::AsyncCommands;
use serde_json::Value;
use tracing::warn;

use crate::error::CacheResult;

pub struct L2Cache {
    client: Option<redis::Client>,
    default_ttl_secs: u64,
}

impl L2Cache {
    pub fn new(redis_url: Option<&str>, default_ttl_secs: u64) -> CacheResult<Self> {
        let client = redis_url.map(redis::Client::open).transpose()?;
        Ok(Self {
            client,
            default_ttl_secs,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "l2 cache connection failed on get");
                return None;
            }
        };
        let raw: Option<String> = conn.get(key).await.unwrap_or(None);
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn set(&self, key: &str, value: &Value, ttl_secs: Option<u64>) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "l2 cache connection failed on set");
                return;
            }
        };
        let Ok(serialized) = serde_json::to_string(value) else {
            return;
        };
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        if let Err(err) = conn
            .set_ex::<_, _, ()>(key, serialized, ttl)
            .await
        {
            warn!(error = %err, "l2 cache set failed");
        }
    }

    pub async fn remove(&self, key: &str) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "l2 cache connection failed on remove");
                return;
            }
        };
        let _: Result<(), _> = conn.del(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_a_redis_url() {
        let cache = L2Cache::new(None, 3600).unwrap();
        assert!(!cache.is_enabled());
    }
}
