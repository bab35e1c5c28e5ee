use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transaction as an adapter decoded it from its chain's native payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creations and calls without a recipient
    pub to: Option<String>,
    /// Smallest unit of the transferred asset
    pub value: u128,
    pub block_number: u64,
    /// Epoch seconds, 0 when the chain does not expose it
    pub timestamp: u64,
    /// Chain-specific fields the adapter chose to keep
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Uniform event shape handed to the event sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NormalizedTransaction {
    pub chain: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: u128,
    pub currency: String,
    pub block: u64,
    pub timestamp: u64,
}

impl NormalizedTransaction {
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.chain, &self.hash)
    }
}
