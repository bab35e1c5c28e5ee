use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::TrackerError;
use crate::logging::{ErrorLogger, LogContext, PerformanceMonitor};

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for a single adapter call rotating across endpoints
    pub fn for_rpc() -> Self {
        Self::default()
    }

    /// No waiting between attempts. Tests use this.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Exponential backoff: `base * multiplier^(step - 1)`, capped at `max`
pub fn backoff_delay(base: Duration, multiplier: f64, step: u32, max: Duration) -> Duration {
    let exponent = step.saturating_sub(1).min(63) as i32;
    let scaled = base.as_secs_f64() * multiplier.powi(exponent);
    if !scaled.is_finite() || scaled >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation; `should_retry` decides whether a failed attempt is retried
    pub async fn execute_with_handler<T, F, Fut, H>(
        &self,
        operation: F,
        should_retry: H,
    ) -> Result<T, TrackerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, TrackerError>>,
        H: Fn(&TrackerError, u32) -> bool,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(&self.operation_name, attempt, monitor.elapsed_ms());
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !should_retry(&error, attempt) {
                        let context = LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_metadata("reason", serde_json::json!("not_retryable"));
                        context.debug(&format!("Not retrying: {}", error));
                        return Err(error);
                    }

                    ErrorLogger::log_recovery_attempt(&error, attempt, max_attempts);

                    if attempt >= max_attempts {
                        let context = LogContext::new("retry", &self.operation_name)
                            .with_metadata("max_attempts", serde_json::json!(max_attempts));
                        context.warn(&format!("All {} attempts failed: {}", max_attempts, error));
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    if !delay.is_zero() {
                        let context = LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64));
                        context.debug(&format!("Retrying in {}ms", delay.as_millis()));
                        sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate delay for the given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = backoff_delay(
            Duration::from_millis(self.config.initial_delay_ms),
            self.config.backoff_multiplier,
            attempt,
            Duration::from_millis(self.config.max_delay_ms),
        );

        if self.config.jitter {
            let jitter_factor = 0.1;
            let secs = capped.as_secs_f64();
            let jitter = secs * jitter_factor * (rand::random::<f64>() - 0.5);
            Duration::from_secs_f64((secs + jitter).max(0.0))
        } else {
            capped
        }
    }
}
