use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::blockchain::ChainAdapter;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{ChainConfig, ChainHealth, ChainStatus, RunMode, SchedulerState};
use crate::tracking::dedup::DedupCache;
use crate::tracking::sink::EventSink;
use crate::tracking::watermark::WatermarkStore;

/// Per-chain scheduling knobs, resolved from the tracker and chain settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub max_batch: u64,
    pub shutdown_grace: Duration,
    pub start_from_latest: bool,
}

impl SchedulerConfig {
    pub fn for_chain(chain: &ChainConfig, tracker: &TrackerConfig) -> Self {
        Self {
            poll_interval: chain.poll_interval(tracker.default_poll_interval_ms),
            max_batch: tracker.max_batch.max(1),
            shutdown_grace: tracker.shutdown_grace(),
            start_from_latest: tracker.start_from_latest,
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing at or below the safe ceiling is left to process
    NoNewBlocks { height: u64, watermark: u64 },
    /// Fresh chain started at its current safe ceiling
    Initialized { watermark: u64 },
    Advanced {
        start: u64,
        end: u64,
        fetched: usize,
        emitted: usize,
        /// Ceiling the range was cut against
        safe_ceiling: u64,
        /// The range reached the safe ceiling
        caught_up: bool,
    },
}

/// Marks a dedup entry as pending until delivery succeeds; dropping it
/// un-marks the entry so an abandoned or failed delivery is retried.
struct PendingDelivery<'a> {
    dedup: &'a DedupCache,
    chain: &'a str,
    hash: &'a str,
    delivered: bool,
}

impl Drop for PendingDelivery<'_> {
    fn drop(&mut self) {
        if !self.delivered {
            self.dedup.forget(self.chain, self.hash);
        }
    }
}

/// Watermark-driven polling state machine for a single chain.
///
/// `Idle -> Polling -> Advancing -> Idle`, with `Paused` and the terminal
/// `Stopped` driven by a [`RunMode`] watch channel.
pub struct PollScheduler {
    adapter: Arc<dyn ChainAdapter>,
    store: Arc<dyn WatermarkStore>,
    dedup: Arc<DedupCache>,
    sink: Arc<dyn EventSink>,
    config: SchedulerConfig,
    status: watch::Sender<ChainStatus>,
}

impl PollScheduler {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        store: Arc<dyn WatermarkStore>,
        dedup: Arc<DedupCache>,
        sink: Arc<dyn EventSink>,
        config: SchedulerConfig,
    ) -> (Self, watch::Receiver<ChainStatus>) {
        let mut initial = ChainStatus::new(adapter.name());
        initial.endpoints = adapter.endpoint_states();
        if let Ok(watermark) = store.get_watermark(adapter.name()) {
            initial.watermark = watermark;
        }
        let (status, receiver) = watch::channel(initial);

        (
            Self {
                adapter,
                store,
                dedup,
                sink,
                config,
                status,
            },
            receiver,
        )
    }

    pub fn chain(&self) -> &str {
        self.adapter.name()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChainStatus> {
        self.status.subscribe()
    }

    fn update_status(&self, update: impl FnOnce(&mut ChainStatus)) {
        self.status.send_modify(|status| {
            update(status);
            status.updated_at = chrono::Utc::now();
        });
    }

    fn set_state(&self, state: SchedulerState) {
        self.update_status(|status| status.state = state);
    }

    /// Run a single cycle: read the watermark, fetch the next safe range,
    /// forward unseen transactions and persist the new watermark.
    pub async fn poll_once(&self) -> Result<CycleOutcome> {
        let chain = self.chain();
        let confirmations = self.adapter.config().confirmations;
        let monitor = PerformanceMonitor::new("poll_cycle").with_metadata("chain", json!(chain));

        self.set_state(SchedulerState::Polling);

        let watermark = self.store.get_watermark(chain)?;
        let height = self.adapter.get_current_block().await?;
        let safe_ceiling = height.saturating_sub(confirmations);

        self.update_status(|status| {
            status.watermark = watermark;
            status.last_height = Some(height);
            status.safe_ceiling = Some(safe_ceiling);
        });
        MetricsLogger::log_chain_status(chain, height, watermark, confirmations);

        if watermark == 0 && self.config.start_from_latest && safe_ceiling > 0 {
            let stored = self.store.set_watermark(chain, safe_ceiling)?;
            self.update_status(|status| status.watermark = stored);
            LogContext::new("scheduler", "initialize")
                .with_chain(chain)
                .with_block_number(stored)
                .info("No watermark stored, starting at the current safe ceiling");
            return Ok(CycleOutcome::Initialized { watermark: stored });
        }

        if height < watermark {
            LogContext::new("scheduler", "poll")
                .with_chain(chain)
                .with_block_number(height)
                .with_metadata("watermark", json!(watermark))
                .warn("Chain height is below the stored watermark, treating as no new blocks");
            return Ok(CycleOutcome::NoNewBlocks { height, watermark });
        }

        if safe_ceiling <= watermark {
            debug!("{}: no new safe blocks (height {}, watermark {})", chain, height, watermark);
            return Ok(CycleOutcome::NoNewBlocks { height, watermark });
        }

        self.advance(watermark, safe_ceiling, monitor).await
    }

    /// Process the next batch below a ceiling already observed by an earlier
    /// cycle, without asking the chain for its height again. Falls back to a
    /// full [`poll_once`](Self::poll_once) once the ceiling is reached.
    pub async fn catch_up(&self, safe_ceiling: u64) -> Result<CycleOutcome> {
        let chain = self.chain();
        self.set_state(SchedulerState::Polling);

        let watermark = self.store.get_watermark(chain)?;
        if safe_ceiling <= watermark {
            return self.poll_once().await;
        }

        self.update_status(|status| status.watermark = watermark);
        let monitor = PerformanceMonitor::new("catch_up_cycle").with_metadata("chain", json!(chain));
        self.advance(watermark, safe_ceiling, monitor).await
    }

    async fn advance(&self, watermark: u64, safe_ceiling: u64, monitor: PerformanceMonitor) -> Result<CycleOutcome> {
        let chain = self.chain();
        self.set_state(SchedulerState::Advancing);

        let start = watermark + 1;
        let end = safe_ceiling.min(watermark.saturating_add(self.config.max_batch));
        let transactions = self.adapter.get_transactions(start, end).await?;

        let mut emitted = 0;
        for tx in &transactions {
            let event = self.adapter.normalize(tx);
            if !self.dedup.observe(&event.chain, &event.hash) {
                continue;
            }

            let mut pending = PendingDelivery {
                dedup: &self.dedup,
                chain: &event.chain,
                hash: &event.hash,
                delivered: false,
            };
            self.sink.deliver(&event).await?;
            pending.delivered = true;

            emitted += 1;
            MetricsLogger::log_event_emitted(&event.chain, &event.hash, &event.currency, event.block);
        }

        let stored = self.store.set_watermark(chain, end)?;
        self.update_status(|status| {
            status.watermark = stored;
            status.events_emitted += emitted as u64;
        });

        let duration = monitor.finish();
        MetricsLogger::log_cycle_completed(chain, start, end, transactions.len(), emitted, duration);

        Ok(CycleOutcome::Advanced {
            start,
            end,
            fetched: transactions.len(),
            emitted,
            safe_ceiling,
            caught_up: end >= safe_ceiling,
        })
    }

    fn record_success(&self) {
        let endpoints = self.adapter.endpoint_states();
        self.update_status(|status| {
            status.health = ChainHealth::Healthy;
            status.consecutive_failures = 0;
            status.last_error = None;
            status.endpoints = endpoints;
        });
    }

    fn record_failure(&self, error: &TrackerError) {
        let endpoints = self.adapter.endpoint_states();
        let mut failures = 0;
        self.update_status(|status| {
            status.health = ChainHealth::Retrying;
            status.consecutive_failures += 1;
            status.last_error = Some(error.to_string());
            status.endpoints = endpoints;
            failures = status.consecutive_failures;
        });

        ErrorLogger::log_error(
            error,
            Some(
                LogContext::new("scheduler", "poll")
                    .with_chain(self.chain())
                    .with_retry_count(failures),
            ),
        );
    }

    /// Drive the state machine until `Stopped` is requested or the control
    /// sender is dropped.
    pub async fn run(self, mut control: watch::Receiver<RunMode>) {
        info!(
            "Starting poll scheduler for {} (interval {}ms, batch {})",
            self.chain(),
            self.config.poll_interval.as_millis(),
            self.config.max_batch
        );

        // Ceiling of an unfinished catch-up, reused until the range reaches it
        let mut backlog: Option<u64> = None;

        loop {
            if control.has_changed().is_err() {
                break;
            }
            let mode = *control.borrow_and_update();
            match mode {
                RunMode::Stopped => break,
                RunMode::Paused => {
                    backlog = None;
                    self.set_state(SchedulerState::Paused);
                    info!("{}: paused", self.chain());
                    if control.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                RunMode::Running => {}
            }

            let this = &self;
            let pending = backlog.take();
            let cycle = async move {
                match pending {
                    Some(ceiling) => this.catch_up(ceiling).await,
                    None => this.poll_once().await,
                }
            };
            tokio::pin!(cycle);

            let result = tokio::select! {
                result = &mut cycle => Some(result),
                _ = halt_requested(&mut control) => {
                    match tokio::time::timeout(self.config.shutdown_grace, &mut cycle).await {
                        Ok(result) => Some(result),
                        Err(_) => {
                            warn!(
                                "{}: abandoned in-flight cycle after {}ms grace period",
                                self.chain(),
                                self.config.shutdown_grace.as_millis()
                            );
                            None
                        }
                    }
                }
            };

            let skip_sleep = match result {
                // Halted mid-cycle; the loop head applies the new mode
                None => continue,
                Some(Ok(outcome)) => {
                    self.record_success();
                    match outcome {
                        CycleOutcome::Advanced {
                            caught_up: false,
                            safe_ceiling,
                            ..
                        } => {
                            backlog = Some(safe_ceiling);
                            true
                        }
                        _ => false,
                    }
                }
                Some(Err(error)) => {
                    self.record_failure(&error);
                    false
                }
            };

            if skip_sleep {
                continue;
            }

            self.set_state(SchedulerState::Idle);
            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                _ = halt_requested(&mut control) => {}
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!("{}: poll scheduler stopped", self.chain());
    }
}

/// Resolves once the requested mode is no longer `Running`, or the sender is gone
async fn halt_requested(control: &mut watch::Receiver<RunMode>) {
    loop {
        if *control.borrow_and_update() != RunMode::Running {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}
