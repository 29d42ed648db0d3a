//! Background delivery tracking
//!
//! Periodically checks pending messages against the destination contract and
//! moves them to `delivered`. Messages still pending after the expiry window
//! move to `failed`. In mock mode only expiry applies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::metrics;
use crate::orchestrator::Orchestrator;
use crate::store::MessageStore;
use crate::types::{DeliveryStatus, SubmissionRecord};

/// Failure reason stored for expired messages
pub const EXPIRED_REASON: &str = "delivery window expired";

/// Configuration for the status tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How often to check pending messages (in milliseconds)
    pub poll_interval_ms: u64,
    /// Pending messages older than this are marked failed
    pub delivery_expiry: Duration,
    /// Page size for store reads and concurrent ledger checks
    pub batch_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            delivery_expiry: Duration::from_secs(3600),
            batch_size: 100,
        }
    }
}

impl From<&crate::config::Config> for TrackerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            poll_interval_ms: config.tracker.poll_interval_ms,
            delivery_expiry: Duration::from_secs(config.tracker.delivery_expiry_secs),
            ..Default::default()
        }
    }
}

/// Outcome of one tracker pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub checked: usize,
    pub delivered: usize,
    pub expired: usize,
}

/// Tracks pending messages until they are delivered or expire
pub struct StatusTracker {
    config: TrackerConfig,
    orchestrator: Arc<Orchestrator>,
}

impl StatusTracker {
    pub fn new(config: TrackerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Run the tracking loop until shutdown
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            delivery_expiry_secs = self.config.delivery_expiry.as_secs(),
            mock = self.orchestrator.mode().is_mock(),
            "Starting status tracker"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping status tracker");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {
                    if let Err(err) = self.process_pending().await {
                        metrics::ERRORS.with_label_values(&["tracker", "store"]).inc();
                        tracing::error!(error = %err, "Error processing pending messages");
                    }
                }
            }
        }

        Ok(())
    }

    /// Check every pending message once
    pub async fn process_pending(&self) -> Result<PassSummary> {
        let pending = self.load_pending().await?;
        metrics::PENDING_MESSAGES.set(pending.len() as f64);

        let mut summary = PassSummary {
            checked: pending.len(),
            ..Default::default()
        };

        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            let outcomes = join_all(chunk.iter().map(|record| self.check(record))).await;
            for (record, outcome) in chunk.iter().zip(outcomes) {
                self.apply(record, outcome, &mut summary).await?;
            }
        }

        if summary.checked > 0 {
            tracing::debug!(
                checked = summary.checked,
                delivered = summary.delivered,
                expired = summary.expired,
                "Status tracker pass complete"
            );
        }
        Ok(summary)
    }

    /// Every pending record, read a page at a time before any transition
    async fn load_pending(&self) -> Result<Vec<SubmissionRecord>> {
        let store = self.orchestrator.store();
        let page_size = self.config.batch_size.max(1);
        let mut pending = Vec::new();
        loop {
            let page = store.pending(pending.len(), page_size).await?;
            let done = page.len() < page_size;
            pending.extend(page);
            if done {
                return Ok(pending);
            }
        }
    }

    async fn apply(
        &self,
        record: &SubmissionRecord,
        outcome: Option<DeliveryStatus>,
        summary: &mut PassSummary,
    ) -> Result<()> {
        let store = self.orchestrator.store();
        match outcome {
            Some(DeliveryStatus::Delivered) => {
                if store
                    .transition(record.tx_hash, DeliveryStatus::Delivered, None, Utc::now())
                    .await?
                {
                    summary.delivered += 1;
                    metrics::STATUS_TRANSITIONS
                        .with_label_values(&["delivered"])
                        .inc();
                    tracing::info!(
                        tx_hash = %record.tx_hash,
                        message_id = ?record.message_id,
                        "Message delivered"
                    );
                }
            }
            _ if self.is_expired(record) => {
                if store
                    .transition(
                        record.tx_hash,
                        DeliveryStatus::Failed,
                        Some(EXPIRED_REASON.to_string()),
                        Utc::now(),
                    )
                    .await?
                {
                    summary.expired += 1;
                    metrics::STATUS_TRANSITIONS
                        .with_label_values(&["expired"])
                        .inc();
                    tracing::warn!(
                        tx_hash = %record.tx_hash,
                        submitted_at = %record.submitted_at,
                        "Message not delivered within the expiry window"
                    );
                }
            }
            _ => {
                // Still pending
            }
        }
        Ok(())
    }

    /// Ledger status for one record; `None` when it cannot be checked
    async fn check(&self, record: &SubmissionRecord) -> Option<DeliveryStatus> {
        if self.orchestrator.mode().is_mock() {
            return None;
        }
        let message_id = record.message_id?;
        match self.orchestrator.message_status(message_id).await {
            Ok(status) => Some(status.status),
            Err(err) => {
                metrics::ERRORS
                    .with_label_values(&["tracker", err.kind()])
                    .inc();
                tracing::warn!(
                    tx_hash = %record.tx_hash,
                    message_id = %message_id,
                    error = %err,
                    "Error checking message status"
                );
                None
            }
        }
    }

    fn is_expired(&self, record: &SubmissionRecord) -> bool {
        let age = Utc::now().signed_duration_since(record.submitted_at);
        age.to_std()
            .map(|age| age >= self.config.delivery_expiry)
            .unwrap_or(false)
    }
}
