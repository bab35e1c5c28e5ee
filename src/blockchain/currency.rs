use crate::models::{ChainConfig, NormalizedTransaction, RawTransaction};

/// Symbol for a transaction sent to `to`: the token whose contract address
/// matches case-insensitively, otherwise the chain's native token.
pub fn resolve_currency(to: Option<&str>, config: &ChainConfig) -> String {
    to.and_then(|to| {
        config
            .token_contracts
            .iter()
            .find(|(_, address)| address.eq_ignore_ascii_case(to))
            .map(|(symbol, _)| symbol.clone())
    })
    .unwrap_or_else(|| config.native_token.clone())
}

/// Project a raw transaction into the uniform event shape
pub fn normalize_transaction(tx: &RawTransaction, config: &ChainConfig) -> NormalizedTransaction {
    NormalizedTransaction {
        chain: config.name.clone(),
        hash: tx.hash.clone(),
        from: tx.from.clone(),
        to: tx.to.clone().unwrap_or_default(),
        value: tx.value,
        currency: resolve_currency(tx.to.as_deref(), config),
        block: tx.block_number,
        timestamp: tx.timestamp,
    }
}
