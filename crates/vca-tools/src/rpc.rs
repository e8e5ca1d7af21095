//! HTTP client to the external tool runner (SS4.5): a request struct
//! in, a response struct out, retried with backoff, one endpoint per
//! registered tool name, reached at `{base_url}/{tool_name}`.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ToolError, ToolResult};
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Clone)]
pub struct ToolRunnerConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl ToolRunnerConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TOOL_RUNNER_URL").unwrap_or_else(|_| "http://localhost:9000".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    video_id: &'a str,
    parameters: serde_json::Value,
}

pub struct ToolRunnerClient {
    http: reqwest::Client,
    config: ToolRunnerConfig,
}

impl ToolRunnerClient {
    pub fn new(config: ToolRunnerConfig) -> ToolResult<Self> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    /// Posts `{video_id, parameters}` to `{base_url}/{tool_name}` and
    /// deserializes the response body as `R`, retried with the shared
    /// exponential-backoff policy on transient failures.
    pub async fn invoke<R: DeserializeOwned>(
        &self,
        tool_name: &str,
        video_id: &str,
        parameters: serde_json::Value,
    ) -> ToolResult<R> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), tool_name);
        with_retry(&self.config.retry, tool_name, || {
            let url = url.clone();
            let parameters = parameters.clone();
            async move {
                let response = self
                    .http
                    .post(&url)
                    .json(&RpcRequest { video_id, parameters })
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(ToolError::RunnerError(format!(
                        "tool runner returned {}",
                        response.status()
                    )));
                }

                response.json::<R>().await.map_err(ToolError::from)
            }
        })
        .await
    }

    /// `GET {base_url}/health`.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        self.http
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
