use crate::database::{Database, WatermarkRow};
use crate::error::{Result, TrackerError};

/// Durable per-chain progress. `set_watermark` must not return before the
/// value is persisted.
pub trait WatermarkStore: Send + Sync {
    /// Last processed block, 0 when the chain has no entry
    fn get_watermark(&self, chain: &str) -> Result<u64>;

    /// Persist `block`. Implementations never lower a stored watermark.
    fn set_watermark(&self, chain: &str, block: u64) -> Result<u64>;

    fn all_watermarks(&self) -> Result<Vec<WatermarkRow>>;
}

impl WatermarkStore for Database {
    fn get_watermark(&self, chain: &str) -> Result<u64> {
        Ok(Database::get_watermark(self, chain)?)
    }

    fn set_watermark(&self, chain: &str, block: u64) -> Result<u64> {
        Database::set_watermark(self, chain, block).map_err(|e| TrackerError::WatermarkPersistFailure {
            chain: chain.to_string(),
            reason: e.to_string(),
        })
    }

    fn all_watermarks(&self) -> Result<Vec<WatermarkRow>> {
        Ok(Database::all_watermarks(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_database_as_watermark_store() {
        let store: Arc<dyn WatermarkStore> = Arc::new(Database::new_in_memory().unwrap());

        assert_eq!(store.get_watermark("ethereum").unwrap(), 0);
        assert_eq!(store.set_watermark("ethereum", 105).unwrap(), 105);
        assert_eq!(store.set_watermark("ethereum", 100).unwrap(), 105);
        assert_eq!(store.get_watermark("ethereum").unwrap(), 105);

        let rows = store.all_watermarks().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_block, 105);
    }
}
