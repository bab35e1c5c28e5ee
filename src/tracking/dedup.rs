use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::logging::{LogContext, MetricsLogger};

type Key = (String, String);

#[derive(Default)]
struct DedupState {
    seen: HashMap<Key, Instant>,
    /// Insertion order. May hold stale keys after `forget`; those are skipped
    /// by comparing against the instant stored in `seen`.
    order: VecDeque<(Key, Instant)>,
    capacity_warned: bool,
}

impl DedupState {
    fn evict_front(&mut self) -> bool {
        match self.order.pop_front() {
            Some((key, inserted)) => {
                if self.seen.get(&key) == Some(&inserted) {
                    self.seen.remove(&key);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    fn evict_expired(&mut self, now: Instant, retention: Duration) -> usize {
        let mut evicted = 0;
        while let Some((_, inserted)) = self.order.front() {
            if now.saturating_duration_since(*inserted) < retention {
                break;
            }
            if self.evict_front() {
                evicted += 1;
            }
        }
        evicted
    }
}

/// Remembers `(chain, hash)` pairs for a retention window so a transaction is
/// forwarded at most once even when block ranges are re-scanned.
///
/// `observe` is an atomic check-and-set; one cache can be shared by every
/// scheduler task.
pub struct DedupCache {
    state: Mutex<DedupState>,
    retention: Duration,
    max_entries: usize,
}

impl DedupCache {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(DedupState::default()),
            retention,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DedupState> {
        // The state stays consistent between statements, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// True the first time `(chain, hash)` is seen inside the retention window
    pub fn observe(&self, chain: &str, hash: &str) -> bool {
        self.observe_at(chain, hash, Instant::now())
    }

    pub fn observe_at(&self, chain: &str, hash: &str, now: Instant) -> bool {
        let mut state = self.lock();
        state.evict_expired(now, self.retention);

        let key = (chain.to_string(), hash.to_string());
        if let Some(inserted) = state.seen.get(&key) {
            if now.saturating_duration_since(*inserted) < self.retention {
                return false;
            }
        }

        state.seen.insert(key.clone(), now);
        state.order.push_back((key, now));

        let mut overflow = 0;
        while state.seen.len() > self.max_entries {
            if state.evict_front() {
                overflow += 1;
            }
        }
        if overflow > 0 {
            LogContext::new("dedup", "observe")
                .with_chain(chain)
                .with_metadata("evicted", serde_json::json!(overflow))
                .warn("Dedup cache full, evicted entries still inside the retention window");
        }

        let high_water = state.seen.len() * 100 >= self.max_entries * 80;
        if high_water && !state.capacity_warned {
            state.capacity_warned = true;
            MetricsLogger::log_dedup_stats(state.seen.len(), self.max_entries, overflow);
        } else if !high_water {
            state.capacity_warned = false;
        }

        true
    }

    /// Drop an entry so the next observation forwards it again
    pub fn forget(&self, chain: &str, hash: &str) {
        let mut state = self.lock();
        state.seen.remove(&(chain.to_string(), hash.to_string()));
    }

    /// Evict everything older than the retention window; returns the number evicted
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let evicted = state.evict_expired(now, self.retention);
        // Stale order entries left by `forget` are only reclaimed here
        if state.order.len() > state.seen.len() * 2 {
            let DedupState { seen, order, .. } = &mut *state;
            order.retain(|(key, inserted)| seen.get(key) == Some(inserted));
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(entries, max_entries)`
    pub fn capacity_info(&self) -> (usize, usize) {
        (self.len(), self.max_entries)
    }
}
