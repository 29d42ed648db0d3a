//! In-memory message store

use std::collections::HashMap;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::MessageStore;
use crate::error::StoreError;
use crate::types::{DeliveryStatus, SubmissionRecord};

#[derive(Default)]
struct Inner {
    /// Insertion order is submission order
    records: Vec<SubmissionRecord>,
    by_tx: HashMap<B256, usize>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_tx.contains_key(&record.tx_hash) {
            return Err(StoreError::DuplicateTransaction(record.tx_hash.to_string()));
        }
        let index = inner.records.len();
        inner.by_tx.insert(record.tx_hash, index);
        inner.records.push(record);
        Ok(())
    }

    async fn get(&self, tx_hash: B256) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_tx
            .get(&tx_hash)
            .map(|&i| inner.records[i].clone()))
    }

    async fn find_by_message_id(
        &self,
        message_id: B256,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .find(|r| r.message_id == Some(message_id))
            .cloned())
    }

    async fn records_for_sender(
        &self,
        sender: Address,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .rev()
            .filter(|r| r.sender == sender)
            .cloned()
            .collect())
    }

    async fn pending(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Pending)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        tx_hash: B256,
        next: DeliveryStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(&index) = inner.by_tx.get(&tx_hash) else {
            return Ok(false);
        };
        let record = &mut inner.records[index];
        if !record.status.can_transition_to(next) {
            return Ok(false);
        }
        record.status = next;
        if reason.is_some() {
            record.failure_reason = reason;
        }
        if next == DeliveryStatus::Delivered {
            record.delivered_at = Some(at);
        }
        Ok(true)
    }
}
