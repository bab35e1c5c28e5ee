use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, TrackerError};

/// Structured logging context for the tracker
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_chain(self, chain: &str) -> Self {
        self.with_metadata("chain", json!(chain))
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_block_range(self, start: u64, end: u64) -> Self {
        self.with_metadata("start_block", json!(start))
            .with_metadata("end_block", json!(end))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_endpoint(self, endpoint: &str) -> Self {
        self.with_metadata("endpoint", json!(endpoint))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times an operation and logs its outcome
pub struct PerformanceMonitor {
    pub start_time: SystemTime,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: SystemTime::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn finish(self) -> u64 {
        let duration = self.elapsed_ms();
        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        context.debug(&format!("Operation completed in {}ms", duration));
        duration
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();
        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => {
                context.trace(&format!("Operation completed successfully in {}ms", duration));
            }
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.debug(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &TrackerError, context: Option<LogContext>) {
        let severity = error.severity();

        let mut log_context = context.unwrap_or_else(|| LogContext::new("error", "unknown"));
        log_context = log_context
            .with_metadata("error_kind", json!(error.kind()))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        if let Some(delay) = error.retry_delay() {
            log_context = log_context.with_metadata("retry_delay_seconds", json!(delay));
        }

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_recovery_attempt(error: &TrackerError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("recovery", "retry_attempt")
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts))
            .with_metadata("error_kind", json!(error.kind()));

        if attempt == max_attempts {
            context.warn(&format!("Final retry attempt failed: {}", error));
        } else {
            context.debug(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        let context = LogContext::new("recovery", "success")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms);

        context.info(&format!(
            "Operation recovered after {} attempts in {}ms",
            attempts, total_duration_ms
        ));
    }
}

/// Metric events. There is no metrics backend, these are log records.
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_cycle_completed(chain: &str, start: u64, end: u64, fetched: usize, emitted: usize, duration_ms: u64) {
        let context = LogContext::new("metrics", "cycle_completed")
            .with_chain(chain)
            .with_block_range(start, end)
            .with_metadata("fetched", json!(fetched))
            .with_metadata("emitted", json!(emitted))
            .with_duration_ms(duration_ms);

        context.info(&format!(
            "{}: processed blocks {}..={} ({} transactions, {} new events)",
            chain, start, end, fetched, emitted
        ));
    }

    pub fn log_rpc_call(chain: &str, method: &str, endpoint: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_chain(chain)
            .with_endpoint(endpoint)
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.trace(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.debug(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_endpoint_suspended(chain: &str, endpoint: &str, failures: u32, suspended_for_ms: u64) {
        let context = LogContext::new("metrics", "endpoint_suspended")
            .with_chain(chain)
            .with_endpoint(endpoint)
            .with_metadata("consecutive_failures", json!(failures))
            .with_metadata("suspended_for_ms", json!(suspended_for_ms));

        context.warn(&format!(
            "Endpoint {} suspended for {}ms after {} consecutive failures",
            endpoint, suspended_for_ms, failures
        ));
    }

    pub fn log_endpoint_recovered(chain: &str, endpoint: &str) {
        let context = LogContext::new("metrics", "endpoint_recovered")
            .with_chain(chain)
            .with_endpoint(endpoint);

        context.info(&format!("Endpoint {} is healthy again", endpoint));
    }

    pub fn log_event_emitted(chain: &str, tx_hash: &str, currency: &str, block_number: u64) {
        let context = LogContext::new("metrics", "event_emitted")
            .with_chain(chain)
            .with_transaction_hash(tx_hash)
            .with_block_number(block_number)
            .with_metadata("currency", json!(currency));

        context.debug(&format!("Emitted {} transaction {}", currency, tx_hash));
    }

    pub fn log_dedup_stats(entries: usize, capacity: usize, evicted: usize) {
        let context = LogContext::new("metrics", "dedup_stats")
            .with_metadata("entries", json!(entries))
            .with_metadata("capacity", json!(capacity))
            .with_metadata("evicted", json!(evicted));

        if capacity > 0 && entries * 100 / capacity >= 80 {
            context.warn("Dedup cache at or above 80% capacity");
        } else {
            context.debug(&format!("Dedup sweep evicted {} entries, {} remain", evicted, entries));
        }
    }

    pub fn log_chain_status(chain: &str, height: u64, watermark: u64, confirmations: u64) {
        let blocks_behind = height.saturating_sub(confirmations).saturating_sub(watermark);
        let context = LogContext::new("metrics", "chain_status")
            .with_chain(chain)
            .with_metadata("latest_block", json!(height))
            .with_metadata("watermark", json!(watermark))
            .with_metadata("blocks_behind", json!(blocks_behind));

        if blocks_behind > 100 {
            context.warn(&format!("{} is {} safe blocks behind (height {}, watermark {})",
                chain, blocks_behind, height, watermark));
        } else {
            context.trace(&format!("{} is {} safe blocks behind", chain, blocks_behind));
        }
    }
}

/// Initialize structured logging for the application
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pretty_json = config.format == "pretty";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.level.as_str()))
        .format(move |buf, record| {
            use std::io::Write;

            let message = record.args().to_string();
            match serde_json::from_str::<Value>(&message) {
                Ok(json_value) if pretty_json => {
                    writeln!(buf, "{}", serde_json::to_string_pretty(&json_value)?)
                }
                Ok(json_value) => writeln!(buf, "{}", json_value),
                Err(_) => writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ),
            }
        })
        .try_init()?;

    info!("Structured logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_context_creation() {
        let context = LogContext::new("test_component", "test_operation");
        assert_eq!(context.component, "test_component");
        assert_eq!(context.operation, "test_operation");
        assert!(context.metadata.is_empty());
    }

    #[test]
    fn test_log_context_with_metadata() {
        let context = LogContext::new("test", "test")
            .with_chain("ethereum")
            .with_block_range(101, 105)
            .with_transaction_hash("0xabc123");

        assert_eq!(context.metadata.get("chain"), Some(&json!("ethereum")));
        assert_eq!(context.metadata.get("start_block"), Some(&json!(101)));
        assert_eq!(context.metadata.get("end_block"), Some(&json!(105)));
        assert_eq!(context.metadata.get("transaction_hash"), Some(&json!("0xabc123")));
    }

    #[test]
    fn test_performance_monitor() {
        let monitor = PerformanceMonitor::new("test_operation")
            .with_metadata("test_key", json!("test_value"));

        assert_eq!(monitor.operation, "test_operation");
        assert_eq!(monitor.metadata.get("test_key"), Some(&json!("test_value")));

        let result: Result<(), String> = Err("boom".to_string());
        let duration = monitor.finish_with_result(&result);
        assert!(duration < 10_000);
    }

    #[test]
    fn test_error_logging() {
        let error = TrackerError::AllEndpointsDown { chain: "bsc".to_string() };
        ErrorLogger::log_error(&error, Some(LogContext::new("test", "error_test")));
        ErrorLogger::log_recovery_attempt(&error, 1, 3);
    }

    #[test]
    fn test_metrics_logging() {
        MetricsLogger::log_cycle_completed("ethereum", 101, 105, 12, 3, 150);
        MetricsLogger::log_rpc_call("ethereum", "eth_blockNumber", "https://rpc", 25, true);
        MetricsLogger::log_endpoint_suspended("ethereum", "https://rpc", 3, 5000);
        MetricsLogger::log_endpoint_recovered("ethereum", "https://rpc");
        MetricsLogger::log_event_emitted("ethereum", "0xabc", "USDT", 104);
        MetricsLogger::log_dedup_stats(90, 100, 4);
        MetricsLogger::log_chain_status("ethereum", 1000, 500, 12);
    }

    #[test]
    fn test_log_context_format_message() {
        let context = LogContext::new("scheduler", "cycle").with_chain("polygon");
        let message = context.format_message("INFO", "test message");

        let parsed: Value = serde_json::from_str(&message).expect("Should be valid JSON");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["component"], "scheduler");
        assert_eq!(parsed["operation"], "cycle");
        assert_eq!(parsed["message"], "test message");
        assert_eq!(parsed["chain"], "polygon");
    }
}
