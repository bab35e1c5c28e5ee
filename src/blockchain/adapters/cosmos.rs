use async_trait::async_trait;
use serde_json::{json, Value};

use super::{address_field, check_range, extra_fields, parse_amount, parse_quantity, within_range, ChainAdapter};
use crate::blockchain::transport::ChainRpc;
use crate::config::RpcConfig;
use crate::error::{Result, TrackerError};
use crate::logging::LogContext;
use crate::models::{ChainConfig, EndpointSnapshot, RawTransaction};

/// Cosmos SDK chains over Tendermint JSON-RPC
pub struct CosmosAdapter {
    config: ChainConfig,
    rpc: ChainRpc,
}

impl CosmosAdapter {
    pub fn new(config: ChainConfig, rpc: &RpcConfig) -> Result<Self> {
        let transport = ChainRpc::new(&config, rpc)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ChainConfig, rpc: ChainRpc) -> Self {
        Self { config, rpc }
    }
}

fn parse_time(value: Option<&Value>) -> u64 {
    value
        .and_then(Value::as_str)
        .and_then(|time| chrono::DateTime::parse_from_rfc3339(time).ok())
        .map(|time| time.timestamp().max(0) as u64)
        .unwrap_or(0)
}

/// First message of a decoded transaction
fn first_message(tx: &Value) -> Option<&Value> {
    tx.get("tx")
        .and_then(|tx| tx.get("body"))
        .and_then(|body| body.get("messages"))
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
}

fn parse_tx(
    tx: &Value,
    block_number: u64,
    index: usize,
    timestamp: u64,
) -> std::result::Result<Option<RawTransaction>, String> {
    // Protobuf-encoded bytes; only decoded transactions are tracked
    if !tx.is_object() {
        return Ok(None);
    }

    let message = first_message(tx);
    let from = message.and_then(|m| address_field(m, &["from_address", "sender"]));
    let to = message.and_then(|m| address_field(m, &["to_address", "receiver"]));
    let coin = message
        .and_then(|m| m.get("amount"))
        .and_then(|amount| match amount {
            Value::Array(coins) => coins.first(),
            other => Some(other),
        });
    let value = match coin.and_then(|coin| coin.get("amount")) {
        Some(amount) => parse_amount(amount)?,
        None => 0,
    };

    let hash = tx
        .get("txhash")
        .or_else(|| tx.get("hash"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("block_{}_tx_{}", block_number, index));

    let mut extra = extra_fields(tx, &["code", "gas_used", "gas_wanted"]);
    if let Some(denom) = coin.and_then(|coin| coin.get("denom")) {
        extra.insert("denom".to_string(), denom.clone());
    }
    if let Some(kind) = message.and_then(|m| m.get("@type")) {
        extra.insert("message_type".to_string(), kind.clone());
    }

    Ok(Some(RawTransaction {
        hash,
        from: from.unwrap_or_default(),
        to,
        value,
        block_number,
        timestamp,
        extra,
    }))
}

fn parse_block(result: &Value, number: u64) -> std::result::Result<Vec<RawTransaction>, String> {
    let block = result
        .get("block")
        .filter(|block| !block.is_null())
        .ok_or_else(|| format!("block {} not available", number))?;
    let timestamp = parse_time(block.get("header").and_then(|header| header.get("time")));

    let txs: &[Value] = match block.get("data").and_then(|data| data.get("txs")) {
        Some(Value::Array(txs)) => txs.as_slice(),
        // Tendermint reports an empty block's tx list as null
        Some(Value::Null) | None => &[],
        Some(other) => return Err(format!("unexpected txs payload: {}", other)),
    };

    let mut transactions = Vec::new();
    for (index, tx) in txs.iter().enumerate() {
        if let Some(tx) = parse_tx(tx, number, index, timestamp)? {
            transactions.push(tx);
        }
    }
    Ok(transactions)
}

#[async_trait]
impl ChainAdapter for CosmosAdapter {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn get_current_block(&self) -> Result<u64> {
        let method = self.config.rpc_method("get_block_number", "status");
        self.rpc
            .request_parsed(method, json!({}), |status| {
                let height = status
                    .get("sync_info")
                    .and_then(|info| info.get("latest_block_height"))
                    .ok_or("status without sync_info.latest_block_height")?;
                parse_quantity(height)
            })
            .await
    }

    async fn get_transactions(&self, start: u64, end: u64) -> Result<Vec<RawTransaction>> {
        check_range(start, end)?;
        let method = self.config.rpc_method("get_block", "block");

        let mut transactions = Vec::new();
        for number in start..=end {
            let block = self
                .rpc
                .request_parsed(method, json!({"height": number.to_string()}), |result| {
                    parse_block(result, number)
                })
                .await?;
            transactions.extend(block);
        }

        let context = LogContext::new("cosmos_adapter", "get_transactions")
            .with_chain(&self.config.name)
            .with_block_range(start, end);
        context.trace(&format!("Decoded {} transactions", transactions.len()));

        Ok(within_range(transactions, start, end))
    }

    async fn get_transaction_details(&self, hash: &str) -> Result<RawTransaction> {
        let method = self.config.rpc_method("get_transaction", "tx");
        let found = self
            .rpc
            .request_parsed(method, json!({"hash": hash}), |result| {
                if result.is_null() {
                    return Ok(None);
                }
                let height = result.get("height").map_or(Ok(0), parse_quantity)?;
                let timestamp = parse_time(result.get("timestamp"));
                parse_tx(result, height, 0, timestamp)
            })
            .await;

        match found {
            Ok(Some(mut tx)) => {
                tx.hash = hash.to_string();
                Ok(tx)
            }
            Ok(None) => Err(TrackerError::NotFound {
                chain: self.config.name.clone(),
                hash: hash.to_string(),
            }),
            // Tendermint answers unknown hashes with an internal error
            Err(TrackerError::Rpc(error)) if error.reports_not_found() => {
                Err(TrackerError::NotFound {
                    chain: self.config.name.clone(),
                    hash: hash.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn endpoint_states(&self) -> Vec<EndpointSnapshot> {
        self.rpc.endpoint_states()
    }
}
