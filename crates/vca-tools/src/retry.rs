//! Exponential backoff with full jitter for RPC calls to the tool
//! runner (SS7): base 1s, multiplier 2, capped at 60s.

use std::time::Duration;

use tracing::warn;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> Result<T, ToolError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ToolError>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt);
                warn!(operation, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "tool rpc failed, retrying");
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(ToolError::RunnerError("retry loop exited without an error".into())))
}

fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp_delay = config.base_delay_ms.saturating_mul(2u64.pow(attempt));
    let capped = exp_delay.min(config.max_delay_ms);

    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let jitter_factor = (nanos % 1000) as f64 / 1000.0;
    let jittered = ((capped as f64) * jitter_factor) as u64;

    Duration::from_millis(jittered.max(config.base_delay_ms.min(capped)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_capped_at_max_delay_ms() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        };
        let delay = calculate_delay(&config, 10);
        assert!(delay.as_millis() <= 2000);
    }
}
