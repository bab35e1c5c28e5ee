use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::blockchain::{build_adapter, ChainAdapter};
use crate::config::{AppConfig, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::logging::MetricsLogger;
use crate::models::{ChainStatus, RunMode};
use crate::tracking::dedup::DedupCache;
use crate::tracking::scheduler::{PollScheduler, SchedulerConfig};
use crate::tracking::sink::EventSink;
use crate::tracking::watermark::WatermarkStore;

struct ChainHandle {
    control: watch::Sender<RunMode>,
    status: watch::Receiver<ChainStatus>,
    task: Option<JoinHandle<()>>,
}

/// Entry point for spawning the per-chain schedulers
pub struct Tracker;

impl Tracker {
    /// Build adapters for every enabled chain and spawn their schedulers.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &AppConfig,
        store: Arc<dyn WatermarkStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<TrackerHandle> {
        let adapters = build_adapters(config)?;
        Ok(Self::with_adapters(config.tracker.clone(), adapters, store, sink))
    }

    /// Spawn schedulers for already-built adapters
    pub fn with_adapters(
        settings: TrackerConfig,
        adapters: Vec<Arc<dyn ChainAdapter>>,
        store: Arc<dyn WatermarkStore>,
        sink: Arc<dyn EventSink>,
    ) -> TrackerHandle {
        let dedup = Arc::new(DedupCache::new(settings.dedup_retention(), settings.dedup_max_entries));
        let sweeper = spawn_sweeper(dedup.clone(), settings.dedup_sweep_interval_seconds);
        let chains = spawn_schedulers(adapters, &settings, &store, &dedup, &sink);

        TrackerHandle {
            chains: RwLock::new(chains),
            settings: Mutex::new(settings),
            store,
            sink,
            dedup,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }
}

fn spawn_schedulers(
    adapters: Vec<Arc<dyn ChainAdapter>>,
    settings: &TrackerConfig,
    store: &Arc<dyn WatermarkStore>,
    dedup: &Arc<DedupCache>,
    sink: &Arc<dyn EventSink>,
) -> BTreeMap<String, ChainHandle> {
    let mut chains = BTreeMap::new();

    for adapter in adapters {
        let name = adapter.name().to_string();
        let config = SchedulerConfig::for_chain(adapter.config(), settings);
        let (scheduler, status) = PollScheduler::new(adapter, store.clone(), dedup.clone(), sink.clone(), config);
        let (control, receiver) = watch::channel(RunMode::Running);
        let task = tokio::spawn(scheduler.run(receiver));

        info!("Spawned poll scheduler for {}", name);
        chains.insert(
            name,
            ChainHandle {
                control,
                status,
                task: Some(task),
            },
        );
    }

    chains
}

fn build_adapters(config: &AppConfig) -> Result<Vec<Arc<dyn ChainAdapter>>> {
    config
        .enabled_chains()
        .map(|chain| build_adapter(chain.clone(), &config.rpc))
        .collect()
}

fn spawn_sweeper(dedup: Arc<DedupCache>, interval_seconds: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = dedup.sweep();
            let (entries, capacity) = dedup.capacity_info();
            MetricsLogger::log_dedup_stats(entries, capacity, evicted);
        }
    })
}

/// Control and status surface over the running schedulers
pub struct TrackerHandle {
    chains: RwLock<BTreeMap<String, ChainHandle>>,
    settings: Mutex<TrackerConfig>,
    store: Arc<dyn WatermarkStore>,
    sink: Arc<dyn EventSink>,
    dedup: Arc<DedupCache>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TrackerHandle {
    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Tracker settings currently in effect
    pub fn settings(&self) -> TrackerConfig {
        match self.settings.lock() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn chain_names(&self) -> Vec<String> {
        self.chains.read().await.keys().cloned().collect()
    }

    async fn command(&self, chain: Option<&str>, target: RunMode) -> Result<()> {
        let chains = self.chains.read().await;

        let selected: Vec<(&String, &ChainHandle)> = match chain {
            Some(name) => {
                let (key, handle) = chains
                    .get_key_value(name)
                    .ok_or_else(|| TrackerError::Control(format!("unknown chain: {}", name)))?;
                if target == RunMode::Running && *handle.control.borrow() == RunMode::Stopped {
                    return Err(TrackerError::Control(format!("{} is stopped", name)));
                }
                vec![(key, handle)]
            }
            None => chains.iter().collect(),
        };

        for (name, handle) in selected {
            let changed = handle.control.send_if_modified(|mode| {
                // Stopped is terminal
                if *mode == target || *mode == RunMode::Stopped {
                    return false;
                }
                *mode = target;
                true
            });
            if changed {
                info!("{}: run mode set to {:?}", name, target);
            }
        }

        Ok(())
    }

    /// Pause one chain or every chain; pausing a paused chain is a no-op
    pub async fn pause(&self, chain: Option<&str>) -> Result<()> {
        self.command(chain, RunMode::Paused).await
    }

    pub async fn resume(&self, chain: Option<&str>) -> Result<()> {
        self.command(chain, RunMode::Running).await
    }

    pub async fn stop(&self, chain: Option<&str>) -> Result<()> {
        self.command(chain, RunMode::Stopped).await
    }

    pub async fn statuses(&self) -> Vec<ChainStatus> {
        self.chains
            .read()
            .await
            .values()
            .map(|handle| handle.status.borrow().clone())
            .collect()
    }

    pub async fn status(&self, chain: &str) -> Option<ChainStatus> {
        self.chains
            .read()
            .await
            .get(chain)
            .map(|handle| handle.status.borrow().clone())
    }

    /// Wait for the scheduler tasks to finish. Only returns once every chain
    /// has been stopped.
    pub async fn join(&self) {
        let tasks: Vec<(String, JoinHandle<()>)> = {
            let mut chains = self.chains.write().await;
            chains
                .iter_mut()
                .filter_map(|(name, handle)| handle.task.take().map(|task| (name.clone(), task)))
                .collect()
        };

        for (name, task) in tasks {
            if let Err(e) = task.await {
                warn!("Poll scheduler for {} ended abnormally: {}", name, e);
            }
        }
    }

    /// Stop every chain and wait for the schedulers to finish
    pub async fn shutdown(&self) {
        // Unknown-chain errors cannot happen for the global form
        let _ = self.stop(None).await;
        self.join().await;

        if let Some(sweeper) = self.sweeper.lock().ok().and_then(|mut guard| guard.take()) {
            sweeper.abort();
        }
        info!("Tracker shut down");
    }

    /// Replace the running chain set with one built from `config`.
    ///
    /// Adapters are built before anything is stopped, so an invalid
    /// replacement leaves the current schedulers running. Watermarks survive
    /// through the store and the dedup cache is kept.
    pub async fn reload(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        let adapters = build_adapters(config)?;
        self.reload_with_adapters(config.tracker.clone(), adapters).await;
        Ok(())
    }

    pub async fn reload_with_adapters(&self, settings: TrackerConfig, adapters: Vec<Arc<dyn ChainAdapter>>) {
        let _ = self.stop(None).await;
        self.join().await;

        let replacement = spawn_schedulers(adapters, &settings, &self.store, &self.dedup, &self.sink);
        if let Ok(mut current) = self.settings.lock() {
            *current = settings;
        }

        let names: Vec<&String> = replacement.keys().collect();
        info!("Reloaded tracker with chains {:?}", names);

        *self.chains.write().await = replacement;
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(sweeper) = guard.take() {
                sweeper.abort();
            }
        }
    }
}
