//! Chain adapter contract and the adapter families that implement it.
//!
//! Adapters differ in transport and payload shape but are interchangeable at
//! the [`ChainAdapter`] boundary: the scheduler never special-cases a family.

pub mod cosmos;
pub mod evm;
pub mod generic;
pub mod substrate;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::currency::{normalize_transaction, resolve_currency};
use crate::config::RpcConfig;
use crate::error::{Result, TrackerError};
use crate::models::{ChainConfig, EndpointSnapshot, NormalizedTransaction, RawTransaction, Web3Flavor};

pub use cosmos::CosmosAdapter;
pub use evm::EvmAdapter;
pub use generic::GenericAdapter;
pub use substrate::SubstrateAdapter;

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn config(&self) -> &ChainConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    /// Latest block height reported by the chain
    async fn get_current_block(&self) -> Result<u64>;

    /// Transactions in blocks `start..=end`, in block order
    async fn get_transactions(&self, start: u64, end: u64) -> Result<Vec<RawTransaction>>;

    /// `NotFound` when the endpoint does not know the hash (yet)
    async fn get_transaction_details(&self, hash: &str) -> Result<RawTransaction>;

    fn detect_currency(&self, tx: &RawTransaction) -> String {
        resolve_currency(tx.to.as_deref(), self.config())
    }

    fn normalize(&self, tx: &RawTransaction) -> NormalizedTransaction {
        normalize_transaction(tx, self.config())
    }

    fn endpoint_states(&self) -> Vec<EndpointSnapshot> {
        Vec::new()
    }
}

/// Pick the adapter family for a chain
pub fn build_adapter(config: ChainConfig, rpc: &RpcConfig) -> Result<Arc<dyn ChainAdapter>> {
    let adapter: Arc<dyn ChainAdapter> = match config.web3_flavor() {
        None => Arc::new(EvmAdapter::new(config, rpc)?),
        Some(Web3Flavor::Substrate) => Arc::new(SubstrateAdapter::new(config, rpc)?),
        Some(Web3Flavor::Cosmos) => Arc::new(CosmosAdapter::new(config, rpc)?),
        Some(Web3Flavor::Generic) => Arc::new(GenericAdapter::new(config, rpc)?),
    };
    Ok(adapter)
}

pub(crate) fn check_range(start: u64, end: u64) -> Result<()> {
    if start > end {
        return Err(TrackerError::InvalidRange { start, end });
    }
    Ok(())
}

/// Block height or count: `0x`-prefixed hex, decimal string, or JSON number
pub(crate) fn parse_quantity(value: &Value) -> std::result::Result<u64, String> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| format!("not an unsigned integer: {}", n)),
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| format!("bad hex quantity {}: {}", s, e)),
            None => s.parse().map_err(|e| format!("bad quantity {}: {}", s, e)),
        },
        other => Err(format!("expected a quantity, got {}", other)),
    }
}

/// Transfer amount in the smallest unit; same encodings as [`parse_quantity`]
pub(crate) fn parse_amount(value: &Value) -> std::result::Result<u128, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| format!("not an unsigned integer: {}", n)),
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some("") => Ok(0),
            Some(hex) => u128::from_str_radix(hex, 16).map_err(|e| format!("bad hex amount {}: {}", s, e)),
            None if s.is_empty() => Ok(0),
            None => s.parse().map_err(|e| format!("bad amount {}: {}", s, e)),
        },
        Value::Null => Ok(0),
        other => Err(format!("expected an amount, got {}", other)),
    }
}

/// First present, non-null field among `keys`
pub(crate) fn field<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// Address-like field. Accepts plain strings and `{ "id": "..." }` wrappers.
pub(crate) fn address_field(object: &Value, keys: &[&str]) -> Option<String> {
    match field(object, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(inner) => inner
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Copy selected fields into the adapter-specific `extra` map
pub(crate) fn extra_fields(object: &Value, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| object.get(*key).map(|value| (key.to_string(), value.clone())))
        .filter(|(_, value)| !value.is_null())
        .collect()
}

/// Keep only transactions inside `start..=end`
pub(crate) fn within_range(mut txs: Vec<RawTransaction>, start: u64, end: u64) -> Vec<RawTransaction> {
    txs.retain(|tx| (start..=end).contains(&tx.block_number));
    txs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChainKind;
    use serde_json::json;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x1b4")), Ok(436));
        assert_eq!(parse_quantity(&json!("436")), Ok(436));
        assert_eq!(parse_quantity(&json!(436)), Ok(436));
        assert!(parse_quantity(&json!("0xzz")).is_err());
        assert!(parse_quantity(&json!(null)).is_err());
        assert!(parse_quantity(&json!(-1)).is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(&json!("0xde0b6b3a7640000")), Ok(1_000_000_000_000_000_000));
        assert_eq!(parse_amount(&json!("340282366920938463463374607431768211455")), Ok(u128::MAX));
        assert_eq!(parse_amount(&json!("0x")), Ok(0));
        assert_eq!(parse_amount(&json!(null)), Ok(0));
        assert!(parse_amount(&json!({"amount": 1})).is_err());
    }

    #[test]
    fn test_field_helpers() {
        let object = json!({"sender": "alice", "to": null, "recipient": {"id": "bob"}});
        assert_eq!(address_field(&object, &["from", "sender"]), Some("alice".to_string()));
        assert_eq!(address_field(&object, &["to", "recipient"]), Some("bob".to_string()));
        assert_eq!(address_field(&object, &["missing"]), None);

        let extra = extra_fields(&object, &["sender", "to"]);
        assert_eq!(extra.len(), 1);
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(5, 5).is_ok());
        assert!(matches!(check_range(6, 5), Err(TrackerError::InvalidRange { start: 6, end: 5 })));
    }

    #[test]
    fn test_build_adapter_selects_family() {
        let rpc = RpcConfig::default();
        let evm = build_adapter(ChainConfig::evm("ethereum", "https://rpc", "ETH"), &rpc).unwrap();
        assert_eq!(evm.name(), "ethereum");

        // No chain_type falls back to the generic dialect
        let mut web3 = ChainConfig::evm("polkadot", "https://rpc", "DOT");
        web3.kind = ChainKind::Web3;
        let generic = build_adapter(web3.clone(), &rpc).unwrap();
        assert_eq!(generic.config().web3_flavor(), Some(Web3Flavor::Generic));

        web3.chain_type = Some(Web3Flavor::Substrate);
        let substrate = build_adapter(web3, &rpc).unwrap();
        assert_eq!(substrate.config().native_token, "DOT");
    }
}
