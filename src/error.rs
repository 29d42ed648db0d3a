//! Error taxonomy for the message-submission flow
//!
//! Validation errors are raised before any external call. Wallet and ledger
//! failures keep their own variants so callers can tell "retry this step"
//! apart from "start over".

use thiserror::Error;

/// Errors produced by the encoder, the orchestrator and the status checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcmError {
    #[error("Invalid chain ID '{input}': {reason}")]
    InvalidChainId { input: String, reason: String },

    #[error("Invalid address '{0}': expected 0x followed by 40 hex characters")]
    InvalidAddress(String),

    #[error("Message is {length} characters, maximum is {max}")]
    MessageTooLarge { length: usize, max: usize },

    #[error("Amount {amount} is out of range (0 to {max} AVAX)")]
    AmountOutOfRange { amount: String, max: String },

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Required gas limit must be positive")]
    InvalidGasLimit,

    #[error("Invalid transaction hash '{0}'")]
    InvalidTransactionHash(String),

    #[error("Teleporter contract is not configured (mock mode)")]
    ContractNotConfigured,

    #[error("Wallet rejected the transaction: {0}")]
    SignatureRejected(String),

    #[error("No receipt for {tx_hash} after {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: String, timeout_secs: u64 },

    #[error("Receipt for {0} carries no message ID")]
    MessageIdUnavailable(String),

    #[error("Transaction {0} reverted")]
    ReceiptIndicatesRevert(String),

    #[error("Message from {tx_hash} failed: {reason}")]
    DeliveryFailed { tx_hash: String, reason: String },

    #[error("Undecodable call data: {0}")]
    InvalidCallData(String),

    #[error("Ledger RPC error: {0}")]
    Ledger(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IcmError {
    /// Short machine-readable name, used in API error bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            IcmError::InvalidChainId { .. } => "InvalidChainId",
            IcmError::InvalidAddress(_) => "InvalidAddress",
            IcmError::MessageTooLarge { .. } => "MessageTooLarge",
            IcmError::AmountOutOfRange { .. } => "AmountOutOfRange",
            IcmError::InvalidAmount(_) => "InvalidAmount",
            IcmError::InvalidGasLimit => "InvalidGasLimit",
            IcmError::InvalidTransactionHash(_) => "InvalidTransactionHash",
            IcmError::ContractNotConfigured => "ContractNotConfigured",
            IcmError::SignatureRejected(_) => "SignatureRejected",
            IcmError::ConfirmationTimeout { .. } => "ConfirmationTimeout",
            IcmError::MessageIdUnavailable(_) => "MessageIdUnavailable",
            IcmError::ReceiptIndicatesRevert(_) => "ReceiptIndicatesRevert",
            IcmError::DeliveryFailed { .. } => "DeliveryFailed",
            IcmError::InvalidCallData(_) => "InvalidCallData",
            IcmError::Ledger(_) => "LedgerError",
            IcmError::Store(_) => "StoreError",
        }
    }

    /// True for input validation failures (nothing external was touched)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IcmError::InvalidChainId { .. }
                | IcmError::InvalidAddress(_)
                | IcmError::MessageTooLarge { .. }
                | IcmError::AmountOutOfRange { .. }
                | IcmError::InvalidAmount(_)
                | IcmError::InvalidGasLimit
                | IcmError::InvalidTransactionHash(_)
                | IcmError::InvalidCallData(_)
        )
    }

    /// True when repeating the same step may succeed.
    ///
    /// A timed-out confirmation can be polled again with the same hash; a
    /// validation error or a revert requires a new flow.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IcmError::ConfirmationTimeout { .. } | IcmError::Ledger(_)
        )
    }
}

/// Message store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Transaction {0} is already recorded")]
    DuplicateTransaction(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
