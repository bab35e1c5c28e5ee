use serde::{Deserialize, Serialize};

use super::EndpointRole;

/// Poll scheduler state machine states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Polling,
    Advancing,
    Paused,
    Stopped,
}

/// Command a scheduler is asked to follow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainHealth {
    Healthy,
    Retrying,
}

/// Point-in-time view of one endpoint's circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSnapshot {
    pub url: String,
    pub role: EndpointRole,
    pub consecutive_failures: u32,
    /// Milliseconds since the last successful call
    pub last_success_ms_ago: Option<u64>,
    /// Remaining suspension in milliseconds, absent when selectable
    pub suspended_for_ms: Option<u64>,
}

/// Published per chain through a watch channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainStatus {
    pub chain: String,
    pub state: SchedulerState,
    pub health: ChainHealth,
    pub watermark: u64,
    pub last_height: Option<u64>,
    pub safe_ceiling: Option<u64>,
    pub events_emitted: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub endpoints: Vec<EndpointSnapshot>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ChainStatus {
    pub fn new(chain: &str) -> Self {
        Self {
            chain: chain.to_string(),
            state: SchedulerState::Idle,
            health: ChainHealth::Healthy,
            watermark: 0,
            last_height: None,
            safe_ceiling: None,
            events_emitted: 0,
            consecutive_failures: 0,
            last_error: None,
            endpoints: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }
}
