//! Per-tool circuit breaker (SS7).
//!
//! `Closed` counts failures against a configurable threshold within a
//! sliding window; this system's explicit numbers are 5 failures ->
//! open, 30-120s cool-off, 2 consecutive successes -> closed.

use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq)]
enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed { failures: 0 }),
            config,
        }
    }

    /// Returns `Ok(())` if the call may proceed, or `Err(retry_after)` if
    /// the breaker is open.
    pub fn allow(&self) -> Result<(), Duration> {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed { .. } => Ok(()),
            CircuitState::Open { opened_at } => {
                let elapsed = Instant::now().duration_since(opened_at);
                if elapsed > self.config.recovery_timeout {
                    *state = CircuitState::HalfOpen { successes: 0 };
                    Ok(())
                } else {
                    Err(self.config.recovery_timeout - elapsed)
                }
            }
            CircuitState::HalfOpen { .. } => Ok(()),
        }
    }

    pub fn on_success(&self) {
        let mut state = self.state.write().unwrap();
        *state = match *state {
            CircuitState::Closed { .. } => CircuitState::Closed { failures: 0 },
            CircuitState::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    CircuitState::Closed { failures: 0 }
                } else {
                    CircuitState::HalfOpen { successes }
                }
            }
            open @ CircuitState::Open { .. } => open,
        };
    }

    pub fn on_failure(&self) {
        let mut state = self.state.write().unwrap();
        *state = match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    CircuitState::Open { opened_at: Instant::now() }
                } else {
                    CircuitState::Closed { failures }
                }
            }
            CircuitState::HalfOpen { .. } => CircuitState::Open { opened_at: Instant::now() },
            open @ CircuitState::Open { .. } => open,
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read().unwrap(), CircuitState::Open { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            success_threshold: 2,
        })
    }

    #[test]
    fn stays_closed_under_the_failure_threshold() {
        let cb = breaker();
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow().is_ok());
        assert!(!cb.is_open());
    }

    #[test]
    fn opens_once_the_failure_threshold_is_reached() {
        let cb = breaker();
        cb.on_failure();
        cb.on_failure();
        cb.on_failure();
        assert!(cb.is_open());
        assert!(cb.allow().is_err());
    }

    #[test]
    fn half_open_after_recovery_timeout_then_closes_on_successes() {
        let cb = breaker();
        cb.on_failure();
        cb.on_failure();
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.allow().is_ok());
        cb.on_success();
        assert!(cb.is_open() == false);
        cb.on_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn a_single_failure_in_half_open_reopens_the_breaker() {
        let cb = breaker();
        cb.on_failure();
        cb.on_failure();
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert!(cb.allow().is_ok());
        cb.on_failure();
        assert!(cb.is_open());
    }
}
