use thiserror::Error;

/// Main error type for the multi-chain transaction tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("RPC endpoint unavailable for {chain} ({endpoint}): {reason}")]
    RpcUnavailable {
        chain: String,
        endpoint: String,
        reason: String,
    },

    #[error("Invalid block range: start={start}, end={end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Transaction {hash} not found on {chain}")]
    NotFound { chain: String, hash: String },

    #[error("All RPC endpoints for {chain} are suspended")]
    AllEndpointsDown { chain: String },

    #[error("Failed to persist watermark for {chain}: {reason}")]
    WatermarkPersistFailure { chain: String, reason: String },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Event sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Control error: {0}")]
    Control(String),
}

/// Errors raised while talking to a single JSON-RPC endpoint
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {status}")]
    Status { status: u16 },

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("RPC method error: code={code}, message={message}")]
    Method {
        code: i64,
        message: String,
        /// Free-form detail; CometBFT puts the real reason here
        data: Option<serde_json::Value>,
    },
}

/// Database-related errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Duplicate chain name: {0}")]
    DuplicateChain(String),

    #[error("Unsupported chain type for {chain}: {reason}")]
    UnsupportedChain { chain: String, reason: String },
}

/// Event sink delivery errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Event sink is closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// High priority errors that affect functionality
    High,
    /// Medium priority errors that may affect performance
    Medium,
    /// Low priority errors that are mostly informational
    Low,
}

impl TrackerError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrackerError::Config(_) => ErrorSeverity::Critical,
            TrackerError::Database(DatabaseError::Connection(_)) => ErrorSeverity::Critical,

            TrackerError::AllEndpointsDown { .. } => ErrorSeverity::High,
            TrackerError::WatermarkPersistFailure { .. } => ErrorSeverity::High,
            TrackerError::InvalidRange { .. } => ErrorSeverity::High,
            TrackerError::Sink(_) => ErrorSeverity::High,

            TrackerError::RpcUnavailable { .. } => ErrorSeverity::Medium,
            TrackerError::Rpc(_) => ErrorSeverity::Medium,

            TrackerError::NotFound { .. } => ErrorSeverity::Low,
            TrackerError::Control(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable by retrying the same call
    pub fn is_recoverable(&self) -> bool {
        match self {
            TrackerError::RpcUnavailable { .. } => true,
            TrackerError::Rpc(RpcError::Timeout { .. }) => true,
            TrackerError::Rpc(RpcError::Connection(_)) => true,
            TrackerError::Database(DatabaseError::Lock(_)) => true,

            // The whole chain backs off instead of retrying inside a call
            TrackerError::AllEndpointsDown { .. } => false,
            TrackerError::InvalidRange { .. } => false,
            TrackerError::NotFound { .. } => false,
            TrackerError::Config(_) => false,
            TrackerError::Control(_) => false,

            _ => false,
        }
    }

    /// Whether this failure counts against the endpoint that produced it
    pub fn triggers_failover(&self) -> bool {
        match self {
            TrackerError::RpcUnavailable { .. } => true,
            TrackerError::Rpc(err) => err.is_endpoint_fault(),
            _ => false,
        }
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            TrackerError::RpcUnavailable { .. } => Some(2),
            TrackerError::Rpc(RpcError::Timeout { .. }) => Some(5),
            TrackerError::Rpc(RpcError::Connection(_)) => Some(10),
            TrackerError::Database(DatabaseError::Lock(_)) => Some(1),
            _ => Some(5),
        }
    }

    /// Short machine-readable tag used in logs and status output
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::RpcUnavailable { .. } => "rpc_unavailable",
            TrackerError::InvalidRange { .. } => "invalid_range",
            TrackerError::NotFound { .. } => "not_found",
            TrackerError::AllEndpointsDown { .. } => "all_endpoints_down",
            TrackerError::WatermarkPersistFailure { .. } => "watermark_persist_failure",
            TrackerError::Rpc(_) => "rpc",
            TrackerError::Database(_) => "database",
            TrackerError::Config(_) => "config",
            TrackerError::Sink(_) => "sink",
            TrackerError::Control(_) => "control",
        }
    }
}

impl RpcError {
    /// Transport failures, malformed payloads and JSON-RPC server errors are
    /// blamed on the endpoint. Request-level method errors are not, and
    /// neither are lookups that the node reports as unknown.
    pub fn is_endpoint_fault(&self) -> bool {
        match self {
            RpcError::Method { code, .. } => {
                (*code == -32603 || (-32099..=-32000).contains(code)) && !self.reports_not_found()
            }
            _ => true,
        }
    }

    /// The node answered but does not know the requested item. Checks both
    /// `message` and `data`; an unknown method (-32601) does not count.
    pub fn reports_not_found(&self) -> bool {
        match self {
            RpcError::Method { code, message, data } => {
                if *code == -32601 {
                    return false;
                }
                let detail = match data {
                    Some(serde_json::Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                format!("{} {}", message, detail).to_ascii_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}
