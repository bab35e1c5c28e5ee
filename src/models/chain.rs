use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigError;

/// Adapter family selector (`type` in the configuration file)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Evm,
    Web3,
}

/// Non-EVM dialects understood by the web3 family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Web3Flavor {
    Substrate,
    Cosmos,
    Generic,
}

/// Role an endpoint plays in a chain's pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Primary,
    Fallback,
}

fn default_decimals() -> u8 {
    18
}

fn default_block_time() -> u64 {
    12
}

fn default_confirmations() -> u64 {
    12
}

fn default_enabled() -> bool {
    true
}

/// Static description of one tracked chain. Replaced wholesale on reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChainKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_type: Option<Web3Flavor>,
    pub rpc_url: String,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
    pub native_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Average block time in seconds
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Token symbol to contract address
    #[serde(default)]
    pub token_contracts: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-chain overrides of JSON-RPC method names, keyed by operation
    #[serde(default)]
    pub rpc_methods: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl ChainConfig {
    /// Minimal EVM chain, mostly useful for tests and sample configs
    pub fn evm(name: &str, rpc_url: &str, native_token: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ChainKind::Evm,
            chain_type: None,
            rpc_url: rpc_url.to_string(),
            fallback_rpc_urls: Vec::new(),
            native_token: native_token.to_string(),
            chain_id: None,
            decimals: default_decimals(),
            block_time: default_block_time(),
            confirmations: default_confirmations(),
            token_contracts: BTreeMap::new(),
            enabled: true,
            rpc_methods: BTreeMap::new(),
            explorer_url: None,
            poll_interval_ms: None,
        }
    }

    /// Endpoints in selection order, primary first
    pub fn endpoints(&self) -> Vec<(String, EndpointRole)> {
        std::iter::once((self.rpc_url.clone(), EndpointRole::Primary))
            .chain(
                self.fallback_rpc_urls
                    .iter()
                    .map(|url| (url.clone(), EndpointRole::Fallback)),
            )
            .collect()
    }

    /// Poll interval for this chain: explicit setting, then block time, then the global default
    pub fn poll_interval(&self, default_ms: u64) -> Duration {
        match self.poll_interval_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ if self.block_time > 0 => Duration::from_secs(self.block_time),
            _ => Duration::from_millis(default_ms),
        }
    }

    /// JSON-RPC method name for `key`, honouring `rpc_methods` overrides
    pub fn rpc_method<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.rpc_methods
            .get(key)
            .map(String::as_str)
            .unwrap_or(default)
    }

    /// Dialect of a web3 chain; an unset `chain_type` means the generic one.
    /// `None` for EVM chains.
    pub fn web3_flavor(&self) -> Option<Web3Flavor> {
        match self.kind {
            ChainKind::Evm => None,
            ChainKind::Web3 => Some(self.chain_type.unwrap_or(Web3Flavor::Generic)),
        }
    }

    /// Explorer page for a transaction, if `explorer_url` is configured
    pub fn explorer_tx_url(&self, hash: &str) -> Option<String> {
        let path = match self.chain_type {
            Some(Web3Flavor::Substrate) => "extrinsic",
            _ => "tx",
        };
        self.explorer_link(path, hash)
    }

    fn explorer_link(&self, path: &str, identifier: &str) -> Option<String> {
        let base = self.explorer_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}/{}/{}", base, path, identifier))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "chains.name".to_string(),
                value: self.name.clone(),
            });
        }

        for (url, _) in self.endpoints() {
            if !is_rpc_url(&url) {
                return Err(ConfigError::InvalidUrl(url));
            }
        }

        if self.native_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("chains.{}.native_token", self.name),
                value: self.native_token.clone(),
            });
        }

        for (symbol, address) in &self.token_contracts {
            if symbol.trim().is_empty() || address.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("chains.{}.token_contracts", self.name),
                    value: format!("{}={}", symbol, address),
                });
            }
        }

        match (self.kind, self.chain_type) {
            (ChainKind::Evm, Some(flavor)) => Err(ConfigError::UnsupportedChain {
                chain: self.name.clone(),
                reason: format!("chain_type {:?} only applies to web3 chains", flavor),
            }),
            _ => Ok(()),
        }
    }
}

fn is_rpc_url(url: &str) -> bool {
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}
