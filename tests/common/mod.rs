#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chain_tx_tracker::blockchain::ChainAdapter;
use chain_tx_tracker::database::{Database, WatermarkRow};
use chain_tx_tracker::error::{Result, SinkError, TrackerError};
use chain_tx_tracker::models::{ChainConfig, NormalizedTransaction, RawTransaction};
use chain_tx_tracker::tracking::{DedupCache, EventSink, PollScheduler, SchedulerConfig, WatermarkStore};

/// In-memory chain with a settable height and fixed transactions per block
pub struct MockAdapter {
    config: ChainConfig,
    height: AtomicU64,
    blocks: Mutex<BTreeMap<u64, Vec<RawTransaction>>>,
    pub range_calls: Mutex<Vec<(u64, u64)>>,
    pub fail_height: AtomicBool,
    pub height_delay: Mutex<Option<Duration>>,
}

impl MockAdapter {
    pub fn new(name: &str, confirmations: u64, height: u64) -> Self {
        let mut config = ChainConfig::evm(name, "http://localhost:8545", "ETH");
        config.confirmations = confirmations;
        config.poll_interval_ms = Some(20);
        config.token_contracts.insert(
            "USDT".to_string(),
            "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
        );
        Self {
            config,
            height: AtomicU64::new(height),
            blocks: Mutex::new(BTreeMap::new()),
            range_calls: Mutex::new(Vec::new()),
            fail_height: AtomicBool::new(false),
            height_delay: Mutex::new(None),
        }
    }

    pub fn with_transaction(self, block: u64, hash: &str, to: &str, value: u128) -> Self {
        self.blocks
            .lock()
            .unwrap()
            .entry(block)
            .or_default()
            .push(raw_transaction(hash, block, to, value));
        self
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.range_calls.lock().unwrap().clone()
    }
}

pub fn raw_transaction(hash: &str, block: u64, to: &str, value: u128) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        from: "0x1111111111111111111111111111111111111111".to_string(),
        to: Some(to.to_string()),
        value,
        block_number: block,
        timestamp: 1_700_000_000 + block,
        extra: Default::default(),
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn get_current_block(&self) -> Result<u64> {
        let delay = *self.height_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(TrackerError::AllEndpointsDown {
                chain: self.config.name.clone(),
            });
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_transactions(&self, start: u64, end: u64) -> Result<Vec<RawTransaction>> {
        if start > end {
            return Err(TrackerError::InvalidRange { start, end });
        }
        self.range_calls.lock().unwrap().push((start, end));
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .range(start..=end)
            .flat_map(|(_, txs)| txs.clone())
            .collect())
    }

    async fn get_transaction_details(&self, hash: &str) -> Result<RawTransaction> {
        self.blocks
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|tx| tx.hash == hash)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound {
                chain: self.config.name.clone(),
                hash: hash.to_string(),
            })
    }
}

/// Collects every delivered event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NormalizedTransaction>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<NormalizedTransaction> {
        self.events.lock().unwrap().clone()
    }

    pub fn hashes(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.hash).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: &NormalizedTransaction) -> std::result::Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Database-backed store whose writes can be made to fail
pub struct FlakyStore {
    pub inner: Database,
    pub fail_writes: AtomicBool,
    pub failed_writes: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Database::new_in_memory().expect("in-memory database"),
            fail_writes: AtomicBool::new(false),
            failed_writes: AtomicU32::new(0),
        }
    }
}

impl WatermarkStore for FlakyStore {
    fn get_watermark(&self, chain: &str) -> Result<u64> {
        WatermarkStore::get_watermark(&self.inner, chain)
    }

    fn set_watermark(&self, chain: &str, block: u64) -> Result<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(TrackerError::WatermarkPersistFailure {
                chain: chain.to_string(),
                reason: "disk full".to_string(),
            });
        }
        WatermarkStore::set_watermark(&self.inner, chain, block)
    }

    fn all_watermarks(&self) -> Result<Vec<WatermarkRow>> {
        WatermarkStore::all_watermarks(&self.inner)
    }
}

pub fn scheduler_config(max_batch: u64) -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        max_batch,
        shutdown_grace: Duration::from_millis(100),
        start_from_latest: false,
    }
}

pub fn build_scheduler(
    adapter: Arc<MockAdapter>,
    store: Arc<dyn WatermarkStore>,
    dedup: Arc<DedupCache>,
    sink: Arc<RecordingSink>,
    config: SchedulerConfig,
) -> PollScheduler {
    PollScheduler::new(adapter, store, dedup, sink, config).0
}

pub fn dedup_cache() -> Arc<DedupCache> {
    Arc::new(DedupCache::new(Duration::from_secs(3600), 10_000))
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
