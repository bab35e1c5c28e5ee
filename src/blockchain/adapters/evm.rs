use async_trait::async_trait;
use serde_json::{json, Value};

use super::{check_range, extra_fields, field, parse_amount, parse_quantity, within_range, ChainAdapter};
use crate::blockchain::transport::ChainRpc;
use crate::config::RpcConfig;
use crate::error::{Result, TrackerError};
use crate::logging::LogContext;
use crate::models::{ChainConfig, EndpointSnapshot, RawTransaction};

/// ERC-20 `transfer(address,uint256)` selector
const TRANSFER_SELECTOR: &str = "0xa9059cbb";

/// Ethereum-compatible JSON-RPC chains
pub struct EvmAdapter {
    config: ChainConfig,
    rpc: ChainRpc,
}

impl EvmAdapter {
    pub fn new(config: ChainConfig, rpc: &RpcConfig) -> Result<Self> {
        let transport = ChainRpc::new(&config, rpc)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ChainConfig, rpc: ChainRpc) -> Self {
        Self { config, rpc }
    }

    async fn block_transactions(&self, number: u64) -> Result<Vec<RawTransaction>> {
        let method = self.config.rpc_method("get_block", "eth_getBlockByNumber");
        self.rpc
            .request_parsed(method, json!([format!("0x{:x}", number), true]), |block| {
                parse_block(block, number)
            })
            .await
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let method = self.config.rpc_method("get_block", "eth_getBlockByNumber");
        self.rpc
            .request_parsed(method, json!([format!("0x{:x}", number), false]), |block| {
                if block.is_null() {
                    return Err(format!("block {} not available", number));
                }
                field(block, &["timestamp"]).map_or(Ok(0), parse_quantity)
            })
            .await
    }
}

fn parse_block(block: &Value, number: u64) -> std::result::Result<Vec<RawTransaction>, String> {
    // A node that has not caught up to `number` yet reports null
    if block.is_null() {
        return Err(format!("block {} not available", number));
    }

    let timestamp = field(block, &["timestamp"]).map_or(Ok(0), parse_quantity)?;
    let transactions = block
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("block {} has no transaction list", number))?;

    transactions
        .iter()
        .map(|tx| parse_transaction(tx, Some(number), timestamp))
        .collect()
}

fn parse_transaction(tx: &Value, block: Option<u64>, timestamp: u64) -> std::result::Result<RawTransaction, String> {
    if tx.is_string() {
        return Err("block was returned without full transaction objects".to_string());
    }

    let hash = tx
        .get("hash")
        .and_then(Value::as_str)
        .ok_or("transaction without hash")?
        .to_string();
    let from = tx.get("from").and_then(Value::as_str).unwrap_or_default().to_string();
    let to = tx.get("to").and_then(Value::as_str).map(str::to_string);
    let value = parse_amount(tx.get("value").unwrap_or(&Value::Null))?;
    let block_number = match field(tx, &["blockNumber"]) {
        Some(n) => parse_quantity(n)?,
        None => block.ok_or("transaction is not in a block")?,
    };

    let mut extra = extra_fields(tx, &["nonce", "gas", "gasPrice", "transactionIndex"]);
    if let Some((recipient, amount)) = tx.get("input").and_then(Value::as_str).and_then(decode_erc20_transfer) {
        extra.insert("token_recipient".to_string(), json!(recipient));
        extra.insert("token_amount".to_string(), json!(amount.to_string()));
    }

    Ok(RawTransaction {
        hash,
        from,
        to,
        value,
        block_number,
        timestamp,
        extra,
    })
}

/// Recipient and amount of an ERC-20 `transfer` call
fn decode_erc20_transfer(input: &str) -> Option<(String, u128)> {
    let args = input.strip_prefix(TRANSFER_SELECTOR)?;
    if args.len() < 128 || !args.is_ascii() {
        return None;
    }
    let recipient = format!("0x{}", &args[24..64]);
    let amount_word = &args[64..128];
    // Amounts beyond 128 bits are not representable; treat them as undecodable
    if amount_word[..32].chars().any(|c| c != '0') {
        return None;
    }
    let amount = u128::from_str_radix(&amount_word[32..], 16).ok()?;
    Some((recipient, amount))
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn get_current_block(&self) -> Result<u64> {
        let method = self.config.rpc_method("get_block_number", "eth_blockNumber");
        self.rpc.request_parsed(method, json!([]), parse_quantity).await
    }

    async fn get_transactions(&self, start: u64, end: u64) -> Result<Vec<RawTransaction>> {
        check_range(start, end)?;

        let mut transactions = Vec::new();
        for number in start..=end {
            transactions.extend(self.block_transactions(number).await?);
        }

        let context = LogContext::new("evm_adapter", "get_transactions")
            .with_chain(&self.config.name)
            .with_block_range(start, end);
        context.trace(&format!("Fetched {} transactions", transactions.len()));

        Ok(within_range(transactions, start, end))
    }

    async fn get_transaction_details(&self, hash: &str) -> Result<RawTransaction> {
        let method = self.config.rpc_method("get_transaction", "eth_getTransactionByHash");
        let tx = self
            .rpc
            .request_parsed(method, json!([hash]), |tx| {
                // Unknown and still-pending transactions are both reported as not found
                if tx.is_null() || field(tx, &["blockNumber"]).is_none() {
                    return Ok(None);
                }
                parse_transaction(tx, None, 0).map(Some)
            })
            .await;

        let mut tx = match tx {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                return Err(TrackerError::NotFound {
                    chain: self.config.name.clone(),
                    hash: hash.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        tx.timestamp = self.block_timestamp(tx.block_number).await?;
        Ok(tx)
    }

    fn endpoint_states(&self) -> Vec<EndpointSnapshot> {
        self.rpc.endpoint_states()
    }
}
