//! Component E: the dispatcher wrapping every tool invocation (SS4.5).
//!
//! `invoke` runs the five-step contract (cache lookup, breaker check,
//! timeout-bound execution, persistence write, cache write). `process_video`
//! fans the selected tools out concurrently via a `JoinSet` and aggregates
//! a partial-success result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use vca_cache::Cache;
use vca_models::VideoId;
use vca_persistence::{KindCounts, PersistenceService};
use vca_store::Store;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{ToolError, ToolResult};
use crate::registry::{ToolContext, ToolRegistry};
use crate::rpc::ToolRunnerClient;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub tool_execution_timeout: Duration,
    pub cache_ttl: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self {
            tool_execution_timeout: Duration::from_secs(
                std::env::var("TOOL_EXECUTION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            cache_ttl: Duration::from_secs(
                std::env::var("CACHE_TTL_HOURS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|hours| hours * 3600)
                    .unwrap_or(24 * 3600),
            ),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tool_execution_timeout: Duration::from_secs(600),
            cache_ttl: Duration::from_secs(24 * 3600),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub tool_name: String,
    pub counts: KindCounts,
    pub cached: bool,
    pub execution_time_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub status: &'static str,
    pub results: HashMap<String, DispatchOutcome>,
    pub errors: HashMap<String, String>,
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    cache: Arc<Cache>,
    persistence: Arc<PersistenceService>,
    store: Arc<Store>,
    rpc: Arc<ToolRunnerClient>,
    breakers: HashMap<&'static str, CircuitBreaker>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        cache: Arc<Cache>,
        persistence: Arc<PersistenceService>,
        store: Arc<Store>,
        rpc: Arc<ToolRunnerClient>,
        config: DispatcherConfig,
    ) -> Self {
        let breakers = registry
            .names()
            .into_iter()
            .map(|name| (name, CircuitBreaker::new(config.breaker)))
            .collect();
        Self {
            registry,
            cache,
            persistence,
            store,
            rpc,
            breakers,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// SS4.5 steps 1-5: cache lookup, breaker check, timeout-bound
    /// execution, persistence write, cache write.
    pub async fn invoke(
        &self,
        tool_name: &str,
        video_id: &VideoId,
        parameters: Value,
        idempotency_key: Option<String>,
    ) -> ToolResult<DispatchOutcome> {
        let start = Instant::now();
        let spec = self.registry.get(tool_name)?;
        let raw_key = cache_key(tool_name, video_id, &parameters);

        if let Some(counts) = self.cache.get::<KindCounts>("tool", &raw_key).await {
            return Ok(DispatchOutcome {
                tool_name: tool_name.to_string(),
                counts,
                cached: true,
                execution_time_ms: start.elapsed().as_millis(),
            });
        }

        let breaker = self
            .breakers
            .get(tool_name)
            .expect("a breaker is registered for every tool in the registry");
        if let Err(retry_after) = breaker.allow() {
            return Err(ToolError::BreakerOpen {
                tool_name: tool_name.to_string(),
                retry_after_secs: retry_after.as_secs(),
            });
        }

        let ctx = ToolContext {
            video_id: video_id.clone(),
            store: Arc::clone(&self.store),
            rpc: Arc::clone(&self.rpc),
        };

        let outcome = match tokio::time::timeout(
            self.config.tool_execution_timeout,
            spec.invoke(ctx, parameters.clone()),
        )
        .await
        {
            Err(_) => {
                breaker.on_failure();
                return Err(ToolError::Timeout(self.config.tool_execution_timeout));
            }
            Ok(Err(e)) => {
                breaker.on_failure();
                return Err(e);
            }
            Ok(Ok(outcome)) => {
                breaker.on_success();
                outcome
            }
        };

        let counts = self
            .persistence
            .store_tool_results(
                video_id,
                tool_name,
                outcome.payloads,
                &outcome.tool_version,
                outcome.model_version,
                Some(parameters),
                idempotency_key,
            )
            .await?;

        if let Err(e) = self.cache.set("tool", &raw_key, &counts, Some(self.config.cache_ttl)).await {
            warn!(tool_name, error = %e, "failed to cache tool dispatch result");
        }

        Ok(DispatchOutcome {
            tool_name: tool_name.to_string(),
            counts,
            cached: false,
            execution_time_ms: start.elapsed().as_millis(),
        })
    }

    /// SS4.5: fans the selected tools out concurrently, independent at
    /// the tool level, and aggregates a partial-success result.
    pub async fn process_video(self: &Arc<Self>, video_id: &VideoId, tools: Option<Vec<String>>) -> BatchOutcome {
        let tool_names: Vec<String> =
            tools.unwrap_or_else(|| self.registry.names().into_iter().map(String::from).collect());

        let mut results = HashMap::new();
        let mut errors = HashMap::new();

        if tool_names.is_empty() {
            return BatchOutcome {
                status: "complete",
                results,
                errors,
            };
        }

        let mut set = tokio::task::JoinSet::new();
        for name in tool_names {
            let dispatcher = Arc::clone(self);
            let video_id = video_id.clone();
            set.spawn(async move {
                let outcome = dispatcher
                    .invoke(&name, &video_id, Value::Object(Default::default()), None)
                    .await;
                (name, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(outcome))) => {
                    results.insert(name, outcome);
                }
                Ok((name, Err(e))) => {
                    errors.insert(name, e.to_string());
                }
                Err(join_err) => {
                    warn!(error = %join_err, "tool dispatch task panicked");
                }
            }
        }

        let status = if errors.is_empty() {
            "complete"
        } else if results.is_empty() {
            "failed"
        } else {
            "partial"
        };

        BatchOutcome { status, results, errors }
    }
}

/// Canonicalizes `parameters` (recursively sorted object keys) so the
/// same logical call always produces the same cache key regardless of
/// field order in the caller's JSON body.
fn canonical_params(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut sorted = serde_json::Map::new();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

fn cache_key(tool_name: &str, video_id: &VideoId, parameters: &Value) -> String {
    format!("{}:{}:{}", tool_name, video_id.as_str(), canonical_params(parameters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_params_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonical_params(&a), canonical_params(&b));
    }

    #[test]
    fn cache_key_differs_per_tool_and_video() {
        let video_id = VideoId::from_string("v1");
        let params = serde_json::json!({});
        let k1 = cache_key("extract_frames", &video_id, &params);
        let k2 = cache_key("caption_frames", &video_id, &params);
        assert_ne!(k1, k2);
    }
}
