use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::database::Database;
use crate::error::{DatabaseError, SinkError};
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{ChainConfig, NormalizedTransaction};

/// Downstream consumer of normalized events.
///
/// Wallet filtering and notification fan-out live behind this boundary.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &NormalizedTransaction) -> Result<(), SinkError>;
}

/// Bounded mpsc hand-off; a full channel applies back-pressure to the scheduler
pub struct ChannelSink {
    sender: mpsc::Sender<NormalizedTransaction>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NormalizedTransaction>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: &NormalizedTransaction) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}

/// Drains a [`ChannelSink`], logging every event and recording it in the
/// `events` table
pub struct EventRecorder {
    database: Arc<Database>,
    chains: HashMap<String, ChainConfig>,
}

impl EventRecorder {
    pub fn new<'a>(database: Arc<Database>, chains: impl IntoIterator<Item = &'a ChainConfig>) -> Self {
        Self {
            database,
            chains: chains
                .into_iter()
                .map(|chain| (chain.name.clone(), chain.clone()))
                .collect(),
        }
    }

    /// Returns false when the event was already recorded
    pub fn record(&self, event: &NormalizedTransaction) -> Result<bool, DatabaseError> {
        let inserted = self.database.record_event(event)?;

        let mut context = LogContext::new("event_recorder", "record")
            .with_chain(&event.chain)
            .with_transaction_hash(&event.hash)
            .with_block_number(event.block)
            .with_metadata("from", serde_json::json!(event.from))
            .with_metadata("to", serde_json::json!(event.to))
            .with_metadata("value", serde_json::json!(event.value.to_string()))
            .with_metadata("currency", serde_json::json!(event.currency));

        if let Some(link) = self
            .chains
            .get(&event.chain)
            .and_then(|chain| chain.explorer_tx_url(&event.hash))
        {
            context = context.with_metadata("explorer", serde_json::json!(link));
        }

        if inserted {
            context.info("Transaction event recorded");
        } else {
            context.debug("Transaction event already recorded");
        }
        Ok(inserted)
    }

    /// Runs until every sender is dropped
    pub async fn run(self, mut receiver: mpsc::Receiver<NormalizedTransaction>) {
        while let Some(event) = receiver.recv().await {
            if let Err(e) = self.record(&event) {
                ErrorLogger::log_error(
                    &e.into(),
                    Some(
                        LogContext::new("event_recorder", "record")
                            .with_chain(&event.chain)
                            .with_transaction_hash(&event.hash),
                    ),
                );
            }
        }

        LogContext::new("event_recorder", "run").info("Event channel closed");
    }
}
