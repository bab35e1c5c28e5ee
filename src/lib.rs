pub mod api;
pub mod blockchain;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod tracking;

pub use blockchain::{build_adapter, ChainAdapter, RpcClient};
pub use config::{ApiConfig, AppConfig, DatabaseConfig, LoggingConfig, RpcConfig, TrackerConfig};
pub use error::{Result, TrackerError};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use retry::{RetryConfig, RetryManager};
pub use tracking::{ChannelSink, DedupCache, EventRecorder, EventSink, PollScheduler, Tracker, TrackerHandle, WatermarkStore};
