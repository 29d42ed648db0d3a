//! Message store: append-only log of submitted messages
//!
//! Records are appended once, after a transaction hash exists. The only
//! mutation afterwards is a forward-only status transition, applied as a
//! compare-and-set so concurrent writers cannot move a status backward.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{DeliveryStatus, SubmissionRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a record; fails with `DuplicateTransaction` if the hash exists
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError>;

    async fn get(&self, tx_hash: B256) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn find_by_message_id(
        &self,
        message_id: B256,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    /// All records sent from an address, newest first
    async fn records_for_sender(&self, sender: Address)
        -> Result<Vec<SubmissionRecord>, StoreError>;

    /// Pending records in submission order, skipping the first `offset`
    async fn pending(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubmissionRecord>, StoreError>;

    /// Move a pending record to `next`. Returns false when the record is
    /// missing or the transition is not allowed.
    async fn transition(
        &self,
        tx_hash: B256,
        next: DeliveryStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
