//! Postgres message store
//!
//! Hashes and addresses are stored as raw bytes. The value is stored as
//! NUMERIC(78,0): inserts cast the decimal text (`$n::NUMERIC`) and reads
//! cast back with `::TEXT`, so no big-decimal type crosses the sqlx boundary.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::error;

use super::MessageStore;
use crate::error::StoreError;
use crate::types::{DeliveryStatus, SubmissionRecord};

const SELECT_COLUMNS: &str = r#"
    tx_hash, message_id, sender, destination_chain_id, destination_address,
    message, value::TEXT AS value, status, failure_reason, mock, block_number,
    submitted_at, delivered_at
"#;

/// Row shape of `icm_messages`
#[derive(Debug, FromRow)]
struct MessageRow {
    tx_hash: Vec<u8>,
    message_id: Option<Vec<u8>>,
    sender: Vec<u8>,
    destination_chain_id: Vec<u8>,
    destination_address: Vec<u8>,
    message: String,
    value: String,
    status: String,
    failure_reason: Option<String>,
    mock: bool,
    block_number: Option<i64>,
    submitted_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

fn bytes32(column: &str, raw: &[u8]) -> Result<B256, StoreError> {
    if raw.len() != 32 {
        return Err(StoreError::Corrupt(format!(
            "{} has {} bytes, expected 32",
            column,
            raw.len()
        )));
    }
    Ok(B256::from_slice(raw))
}

fn address(column: &str, raw: &[u8]) -> Result<Address, StoreError> {
    if raw.len() != 20 {
        return Err(StoreError::Corrupt(format!(
            "{} has {} bytes, expected 20",
            column,
            raw.len()
        )));
    }
    Ok(Address::from_slice(raw))
}

impl TryFrom<MessageRow> for SubmissionRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(SubmissionRecord {
            tx_hash: bytes32("tx_hash", &row.tx_hash)?,
            message_id: row
                .message_id
                .as_deref()
                .map(|raw| bytes32("message_id", raw))
                .transpose()?,
            sender: address("sender", &row.sender)?,
            destination_chain_id: bytes32("destination_chain_id", &row.destination_chain_id)?,
            destination_address: address("destination_address", &row.destination_address)?,
            message: row.message,
            value: U256::from_str(&row.value)
                .map_err(|e| StoreError::Corrupt(format!("value '{}': {}", row.value, e)))?,
            status: DeliveryStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            failure_reason: row.failure_reason,
            mock: row.mock,
            block_number: row.block_number.map(|b| b as u64),
            submitted_at: row.submitted_at,
            delivered_at: row.delivered_at,
        })
    }
}

fn into_records(rows: Vec<MessageRow>) -> Result<Vec<SubmissionRecord>, StoreError> {
    rows.into_iter().map(SubmissionRecord::try_from).collect()
}

/// Store backed by Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .wrap_err("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .wrap_err("Failed to run database migrations")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO icm_messages (tx_hash, message_id, sender, destination_chain_id,
                destination_address, message, value, status, failure_reason, mock,
                block_number, submitted_at, delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(record.tx_hash.as_slice())
        .bind(record.message_id.as_ref().map(|id| id.as_slice()))
        .bind(record.sender.as_slice())
        .bind(record.destination_chain_id.as_slice())
        .bind(record.destination_address.as_slice())
        .bind(&record.message)
        .bind(record.value.to_string())
        .bind(record.status.as_str())
        .bind(&record.failure_reason)
        .bind(record.mock)
        .bind(record.block_number.map(|b| b as i64))
        .bind(record.submitted_at)
        .bind(record.delivered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("SQL error appending message: {:?}", e);
            StoreError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateTransaction(record.tx_hash.to_string()));
        }
        Ok(())
    }

    async fn get(&self, tx_hash: B256) -> Result<Option<SubmissionRecord>, StoreError> {
        let query = format!("SELECT {} FROM icm_messages WHERE tx_hash = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(tx_hash.as_slice())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubmissionRecord::try_from).transpose()
    }

    async fn find_by_message_id(
        &self,
        message_id: B256,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM icm_messages WHERE message_id = $1 ORDER BY id LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(message_id.as_slice())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubmissionRecord::try_from).transpose()
    }

    async fn records_for_sender(
        &self,
        sender: Address,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM icm_messages WHERE sender = $1 ORDER BY id DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(sender.as_slice())
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn pending(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM icm_messages WHERE status = 'pending' ORDER BY id LIMIT $1 OFFSET $2",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn transition(
        &self,
        tx_hash: B256,
        next: DeliveryStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Only pending rows move; the WHERE clause is the compare-and-set
        if next == DeliveryStatus::Pending {
            return Ok(false);
        }
        let delivered_at = (next == DeliveryStatus::Delivered).then_some(at);

        let result = sqlx::query(
            r#"
            UPDATE icm_messages
            SET status = $2,
                failure_reason = COALESCE($3, failure_reason),
                delivered_at = COALESCE($4, delivered_at)
            WHERE tx_hash = $1 AND status = 'pending'
            "#,
        )
        .bind(tx_hash.as_slice())
        .bind(next.as_str())
        .bind(reason)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
