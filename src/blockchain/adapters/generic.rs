use async_trait::async_trait;
use serde_json::{json, Value};

use super::{address_field, check_range, extra_fields, field, parse_amount, parse_quantity, within_range, ChainAdapter};
use crate::blockchain::transport::ChainRpc;
use crate::config::RpcConfig;
use crate::error::{Result, TrackerError};
use crate::models::{ChainConfig, EndpointSnapshot, RawTransaction};

/// Any JSON-RPC chain described purely by `rpc_methods` and loose field names
pub struct GenericAdapter {
    config: ChainConfig,
    rpc: ChainRpc,
}

impl GenericAdapter {
    pub fn new(config: ChainConfig, rpc: &RpcConfig) -> Result<Self> {
        let transport = ChainRpc::new(&config, rpc)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ChainConfig, rpc: ChainRpc) -> Self {
        Self { config, rpc }
    }
}

/// Height from `{number}`/`{blockNumber}`, a hex or decimal string, or a bare number
fn parse_height(result: &Value) -> std::result::Result<u64, String> {
    match result {
        Value::Object(_) => field(result, &["number", "blockNumber", "height"])
            .ok_or_else(|| "height object without number".to_string())
            .and_then(parse_quantity),
        other => parse_quantity(other),
    }
}

fn parse_tx(
    tx: &Value,
    block_number: u64,
    index: usize,
    timestamp: u64,
) -> std::result::Result<RawTransaction, String> {
    if !tx.is_object() {
        return Err(format!("transaction {} in block {} is not an object", index, block_number));
    }

    let hash = field(tx, &["hash", "txid"])
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("block_{}_tx_{}", block_number, index));
    let value = match field(tx, &["value", "amount"]) {
        Some(value) => parse_amount(value)?,
        None => 0,
    };
    let timestamp = match field(tx, &["timestamp", "time"]) {
        Some(ts) => parse_quantity(ts).unwrap_or(timestamp),
        None => timestamp,
    };

    Ok(RawTransaction {
        hash,
        from: address_field(tx, &["from", "sender"]).unwrap_or_default(),
        to: address_field(tx, &["to", "recipient"]),
        value,
        block_number,
        timestamp,
        extra: extra_fields(tx, &["status", "fee", "nonce"]),
    })
}

fn parse_block(block: &Value, number: u64) -> std::result::Result<Vec<RawTransaction>, String> {
    if block.is_null() {
        return Err(format!("block {} not available", number));
    }
    let timestamp = field(block, &["timestamp", "time"])
        .and_then(|ts| parse_quantity(ts).ok())
        .unwrap_or(0);

    let txs = match field(block, &["transactions", "txs"]) {
        Some(Value::Array(txs)) => txs,
        None => return Ok(Vec::new()),
        Some(other) => return Err(format!("unexpected transaction list: {}", other)),
    };

    txs.iter()
        .enumerate()
        .map(|(index, tx)| parse_tx(tx, number, index, timestamp))
        .collect()
}

#[async_trait]
impl ChainAdapter for GenericAdapter {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn get_current_block(&self) -> Result<u64> {
        let method = self.config.rpc_method("get_block_number", "chain_getBlockNumber");
        self.rpc.request_parsed(method, json!([]), parse_height).await
    }

    async fn get_transactions(&self, start: u64, end: u64) -> Result<Vec<RawTransaction>> {
        check_range(start, end)?;
        let method = self.config.rpc_method("get_block", "chain_getBlock");

        let mut transactions = Vec::new();
        for number in start..=end {
            let block = self
                .rpc
                .request_parsed(method, json!([number, true]), |block| parse_block(block, number))
                .await?;
            transactions.extend(block);
        }
        Ok(within_range(transactions, start, end))
    }

    async fn get_transaction_details(&self, hash: &str) -> Result<RawTransaction> {
        let method = self.config.rpc_method("get_transaction", "chain_getTransaction");
        let found = self
            .rpc
            .request_parsed(method, json!([hash]), |tx| {
                if tx.is_null() {
                    return Ok(None);
                }
                let block_number = field(tx, &["blockNumber", "block_number", "height"])
                    .map_or(Ok(0), parse_quantity)?;
                parse_tx(tx, block_number, 0, 0).map(Some)
            })
            .await?;

        let mut tx = found.ok_or_else(|| TrackerError::NotFound {
            chain: self.config.name.clone(),
            hash: hash.to_string(),
        })?;
        tx.hash = hash.to_string();
        Ok(tx)
    }

    fn endpoint_states(&self) -> Vec<EndpointSnapshot> {
        self.rpc.endpoint_states()
    }
}
