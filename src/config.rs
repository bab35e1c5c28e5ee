use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{ChainConfig, ChainKind, Web3Flavor};
use crate::retry::RetryConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Polling, batching and dedup settings shared by every chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Used when a chain has neither `poll_interval_ms` nor a block time
    pub default_poll_interval_ms: u64,
    /// Upper bound on blocks fetched in one range call
    pub max_batch: u64,
    /// How long an emitted (chain, hash) pair is remembered
    pub dedup_retention_seconds: u64,
    pub dedup_max_entries: usize,
    pub dedup_sweep_interval_seconds: u64,
    /// Grace period for an in-flight RPC call after pause/stop
    pub shutdown_grace_ms: u64,
    /// Start a chain without a watermark at its current safe ceiling instead of block 1
    pub start_from_latest: bool,
}

/// Endpoint pool and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Consecutive failures before an endpoint is suspended
    pub failure_threshold: u32,
    pub suspension_base_seconds: u64,
    pub suspension_max_seconds: u64,
    /// Attempts made by one adapter call across the pool
    pub retry: RetryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
    /// Enable WAL mode for better concurrency
    pub enable_wal_mode: bool,
    /// Database busy timeout in milliseconds
    pub busy_timeout_ms: u32,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable HTTP control API
    pub enabled: bool,
    pub port: u16,
    pub host: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_poll_interval_ms: 5_000,
            max_batch: 50,
            dedup_retention_seconds: 3_600,
            dedup_max_entries: 100_000,
            dedup_sweep_interval_seconds: 60,
            shutdown_grace_ms: 5_000,
            start_from_latest: true,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            failure_threshold: 3,
            suspension_base_seconds: 5,
            suspension_max_seconds: 300,
            retry: RetryConfig::for_rpc(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./tracker.db".to_string(),
            enable_wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `CONFIG_FILE` (default `config.toml`), defaults when absent
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        Self::from_path(&config_path)
    }

    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(interval) = env_parse("TRACKER_POLL_INTERVAL_MS")? {
            self.tracker.default_poll_interval_ms = interval;
        }
        if let Some(max_batch) = env_parse("TRACKER_MAX_BATCH")? {
            self.tracker.max_batch = max_batch;
        }
        if let Some(retention) = env_parse("TRACKER_DEDUP_RETENTION_SECONDS")? {
            self.tracker.dedup_retention_seconds = retention;
        }

        if let Some(timeout) = env_parse("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(threshold) = env_parse("RPC_FAILURE_THRESHOLD")? {
            self.rpc.failure_threshold = threshold;
        }

        if let Ok(path) = env::var("DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(enabled) = env_parse("API_ENABLED")? {
            self.api.enabled = enabled;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.api.port = port;
        }
        if let Ok(host) = env::var("API_HOST") {
            self.api.host = host;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker.max_batch == 0 || self.tracker.max_batch > 10_000 {
            return Err(out_of_range("tracker.max_batch", self.tracker.max_batch));
        }
        if self.tracker.default_poll_interval_ms == 0 {
            return Err(out_of_range(
                "tracker.default_poll_interval_ms",
                self.tracker.default_poll_interval_ms,
            ));
        }
        if self.tracker.dedup_retention_seconds == 0 {
            return Err(out_of_range(
                "tracker.dedup_retention_seconds",
                self.tracker.dedup_retention_seconds,
            ));
        }
        if self.tracker.dedup_max_entries == 0 {
            return Err(out_of_range("tracker.dedup_max_entries", self.tracker.dedup_max_entries));
        }
        if self.tracker.dedup_sweep_interval_seconds == 0 {
            return Err(out_of_range(
                "tracker.dedup_sweep_interval_seconds",
                self.tracker.dedup_sweep_interval_seconds,
            ));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(out_of_range("rpc.timeout_seconds", self.rpc.timeout_seconds));
        }
        if self.rpc.failure_threshold == 0 {
            return Err(out_of_range("rpc.failure_threshold", self.rpc.failure_threshold));
        }
        if self.rpc.suspension_base_seconds == 0
            || self.rpc.suspension_max_seconds < self.rpc.suspension_base_seconds
        {
            return Err(out_of_range(
                "rpc.suspension_max_seconds",
                self.rpc.suspension_max_seconds,
            ));
        }
        if self.rpc.retry.max_attempts == 0 || self.rpc.retry.max_attempts > 20 {
            return Err(out_of_range("rpc.retry.max_attempts", self.rpc.retry.max_attempts));
        }

        if self.api.port == 0 {
            return Err(out_of_range("api.port", self.api.port));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(out_of_range("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(out_of_range("logging.format", &self.logging.format));
        }

        if self.database.path.trim().is_empty() {
            return Err(out_of_range("database.path", &self.database.path));
        }

        let mut names = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !names.insert(chain.name.as_str()) {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
        }

        Ok(())
    }

    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|chain| chain.enabled)
    }

    /// Configuration with a few representative chains, one per adapter family
    pub fn sample() -> Self {
        let mut ethereum = ChainConfig::evm("ethereum", "https://eth.llamarpc.com", "ETH");
        ethereum.chain_id = Some(1);
        ethereum.fallback_rpc_urls = vec!["https://rpc.ankr.com/eth".to_string()];
        ethereum.token_contracts = BTreeMap::from([
            (
                "USDT".to_string(),
                "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
            ),
            (
                "USDC".to_string(),
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            ),
        ]);
        ethereum.explorer_url = Some("https://etherscan.io".to_string());

        let mut bsc = ChainConfig::evm("bsc", "https://bsc-dataseed.binance.org", "BNB");
        bsc.chain_id = Some(56);
        bsc.block_time = 3;
        bsc.confirmations = 15;

        let mut polkadot = ChainConfig::evm("polkadot", "https://rpc.polkadot.io", "DOT");
        polkadot.kind = ChainKind::Web3;
        polkadot.chain_type = Some(Web3Flavor::Substrate);
        polkadot.decimals = 10;
        polkadot.block_time = 6;
        polkadot.confirmations = 2;

        let mut cosmos = ChainConfig::evm("cosmoshub", "https://cosmos-rpc.publicnode.com", "ATOM");
        cosmos.kind = ChainKind::Web3;
        cosmos.chain_type = Some(Web3Flavor::Cosmos);
        cosmos.decimals = 6;
        cosmos.block_time = 6;
        cosmos.confirmations = 1;
        cosmos.enabled = false;

        Self {
            chains: vec![ethereum, bsc, polkadot, cosmos],
            ..Self::default()
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::sample()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
