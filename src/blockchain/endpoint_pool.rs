use std::time::{Duration, Instant};

use crate::config::RpcConfig;
use crate::error::TrackerError;
use crate::logging::MetricsLogger;
use crate::models::{EndpointRole, EndpointSnapshot};
use crate::retry::backoff_delay;

/// Circuit-breaker tuning for one chain's endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub failure_threshold: u32,
    pub suspension_base: Duration,
    pub suspension_max: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&RpcConfig::default())
    }
}

impl From<&RpcConfig> for PoolConfig {
    fn from(config: &RpcConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            suspension_base: Duration::from_secs(config.suspension_base_seconds),
            suspension_max: Duration::from_secs(config.suspension_max_seconds),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointState {
    pub url: String,
    pub chain: String,
    pub role: EndpointRole,
    pub consecutive_failures: u32,
    pub last_success: Option<Instant>,
    pub suspended_until: Option<Instant>,
    /// Suspensions since the last success; drives the backoff exponent
    pub suspensions: u32,
}

impl EndpointState {
    fn is_available_at(&self, now: Instant) -> bool {
        self.suspended_until.map_or(true, |until| until <= now)
    }
}

/// Ordered endpoints for one chain, primary first.
///
/// Selection takes the first endpoint that is not suspended. Reaching
/// `failure_threshold` consecutive failures suspends an endpoint for
/// `suspension_base * 2^(n-1)` (capped), where `n` counts suspensions since
/// its last success. Once a suspension lapses the endpoint is selectable
/// again, but its failure count is kept, so a single further failure puts it
/// straight back into a longer suspension. Any success clears all of it.
#[derive(Debug)]
pub struct EndpointPool {
    chain: String,
    endpoints: Vec<EndpointState>,
    config: PoolConfig,
}

impl EndpointPool {
    pub fn new(chain: &str, endpoints: Vec<(String, EndpointRole)>, config: PoolConfig) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|(url, role)| EndpointState {
                url,
                chain: chain.to_string(),
                role,
                consecutive_failures: 0,
                last_success: None,
                suspended_until: None,
                suspensions: 0,
            })
            .collect();

        Self {
            chain: chain.to_string(),
            endpoints,
            config,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoint(&self, index: usize) -> Option<&EndpointState> {
        self.endpoints.get(index)
    }

    pub fn select(&self) -> Result<(usize, String), TrackerError> {
        self.select_at(Instant::now())
    }

    /// Index and URL of the endpoint to use at `now`
    pub fn select_at(&self, now: Instant) -> Result<(usize, String), TrackerError> {
        self.endpoints
            .iter()
            .enumerate()
            .find(|(_, endpoint)| endpoint.is_available_at(now))
            .map(|(index, endpoint)| (index, endpoint.url.clone()))
            .ok_or_else(|| TrackerError::AllEndpointsDown {
                chain: self.chain.clone(),
            })
    }

    pub fn record_success(&mut self, index: usize) {
        self.record_success_at(index, Instant::now());
    }

    /// Reset the endpoint's breaker. Returns true if it had been failing.
    pub fn record_success_at(&mut self, index: usize, now: Instant) -> bool {
        let Some(endpoint) = self.endpoints.get_mut(index) else {
            return false;
        };

        let was_failing = endpoint.consecutive_failures > 0 || endpoint.suspensions > 0;
        endpoint.consecutive_failures = 0;
        endpoint.suspensions = 0;
        endpoint.suspended_until = None;
        endpoint.last_success = Some(now);

        if was_failing {
            MetricsLogger::log_endpoint_recovered(&self.chain, &endpoint.url);
        }
        was_failing
    }

    pub fn record_failure(&mut self, index: usize) -> Option<Duration> {
        self.record_failure_at(index, Instant::now())
    }

    /// Count a failure. Returns the suspension window if this failure suspended the endpoint.
    pub fn record_failure_at(&mut self, index: usize, now: Instant) -> Option<Duration> {
        let config = self.config.clone();
        let endpoint = self.endpoints.get_mut(index)?;

        endpoint.consecutive_failures = endpoint.consecutive_failures.saturating_add(1);
        if endpoint.consecutive_failures < config.failure_threshold {
            return None;
        }

        endpoint.suspensions = endpoint.suspensions.saturating_add(1);
        let window = backoff_delay(
            config.suspension_base,
            2.0,
            endpoint.suspensions,
            config.suspension_max,
        );
        endpoint.suspended_until = Some(now + window);

        MetricsLogger::log_endpoint_suspended(
            &self.chain,
            &endpoint.url,
            endpoint.consecutive_failures,
            window.as_millis() as u64,
        );
        Some(window)
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<EndpointSnapshot> {
        self.endpoints
            .iter()
            .map(|endpoint| EndpointSnapshot {
                url: endpoint.url.clone(),
                role: endpoint.role,
                consecutive_failures: endpoint.consecutive_failures,
                last_success_ms_ago: endpoint
                    .last_success
                    .map(|at| now.saturating_duration_since(at).as_millis() as u64),
                suspended_for_ms: endpoint
                    .suspended_until
                    .filter(|until| *until > now)
                    .map(|until| until.duration_since(now).as_millis() as u64),
            })
            .collect()
    }
}
