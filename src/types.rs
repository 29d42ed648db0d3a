//! Core types for the message-submission flow
//!
//! Wire-facing structs use camelCase JSON to match the dashboard frontend.
//! Amounts in the smallest unit (wei) are serialized as decimal strings.

use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw send request, before normalization.
///
/// The chain id and addresses are kept as user-supplied strings; the
/// encoder validates and normalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    /// Destination blockchain ID, `0x` hex or a decimal numeral
    pub destination_chain_id: String,
    /// Receiving contract/account on the destination chain
    pub destination_address: String,
    /// Human-readable message, sent as UTF-8 bytes
    pub message: String,
    /// Gas limit for execution on the destination chain
    pub required_gas_limit: u64,
    /// Relayers allowed to deliver the message (empty = any)
    pub allowed_relayer_addresses: Vec<String>,
    /// Relayer fee in wei, paid in the native token
    pub fee_amount: U256,
}

/// The encoded tuple as sent to `sendCrossChainMessage`, echoed back to the
/// caller and returned on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    #[serde(rename = "destinationBlockchainID")]
    pub destination_blockchain_id: B256,
    pub destination_address: Address,
    pub fee_token_address: Address,
    #[serde(with = "u256_decimal")]
    pub fee_amount: U256,
    pub required_gas_limit: u64,
    #[serde(default)]
    pub allowed_relayer_addresses: Vec<Address>,
    pub message: String,
}

/// Transaction request handed to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub to: Address,
    pub data: Bytes,
    #[serde(with = "u256_decimal")]
    pub value: U256,
    pub gas_limit: u64,
}

/// Output of the encoder. Immutable; consumed once by the signing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    pub transaction_data: TransactionData,
    pub message_input: MessageInput,
    pub fee_quote: FeeQuote,
    /// Set when no contract is configured; the call data is a placeholder
    pub mock: bool,
}

impl PreparedTransaction {
    /// Recipient contract of the transaction
    pub fn recipient_contract(&self) -> Address {
        self.transaction_data.to
    }
}

/// Quoted relayer fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    #[serde(with = "u256_decimal")]
    pub fee_in_wei: U256,
    pub fee_in_avax: String,
}

/// Delivery status of a recorded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Statuses only move forward: pending to delivered or failed
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryStatus::Pending, DeliveryStatus::Delivered)
                | (DeliveryStatus::Pending, DeliveryStatus::Failed)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" | "completed" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// A sent message, recorded once its transaction hash exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub tx_hash: B256,
    /// Absent when the receipt did not expose one
    pub message_id: Option<B256>,
    pub sender: Address,
    pub destination_chain_id: B256,
    #[serde(rename = "recipient")]
    pub destination_address: Address,
    #[serde(rename = "content")]
    pub message: String,
    #[serde(with = "u256_decimal", rename = "amount")]
    pub value: U256,
    pub status: DeliveryStatus,
    pub failure_reason: Option<String>,
    pub mock: bool,
    pub block_number: Option<u64>,
    #[serde(rename = "timestamp")]
    pub submitted_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl SubmissionRecord {
    /// Seconds between submission and observed delivery
    pub fn delivery_seconds(&self) -> Option<f64> {
        self.delivered_at
            .map(|d| (d - self.submitted_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Result of a status check against the destination contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    pub message_id: B256,
    pub status: DeliveryStatus,
}

/// Serde helpers for `U256` as a decimal string.
///
/// Deserialization also accepts `0x` hex strings and plain JSON integers.
pub mod u256_decimal {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => U256::from_str(s.trim()).map_err(de::Error::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }
}
