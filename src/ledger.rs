//! Ledger RPC boundary
//!
//! The orchestrator only needs two things from the chain: a transaction's
//! receipt, and whether a message has been received. [`Ledger`] is the seam;
//! [`RpcLedger`] implements it over alloy's HTTP provider.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::{debug, info};

use crate::contracts::TeleporterMessenger;
use crate::error::IcmError;

/// A log entry from a receipt (only what message-ID derivation needs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
}

/// Transaction receipt as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    /// False when the transaction reverted
    pub success: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<ReceiptLog>,
}

impl ReceiptSummary {
    /// Message ID emitted by the messenger: second topic of the first log
    pub fn message_id(&self) -> Option<B256> {
        self.logs.first().and_then(|log| log.topics.get(1).copied())
    }
}

/// Read access to the chain
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Receipt for a transaction, or `None` while it is not yet mined
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, IcmError>;

    /// Whether `messageReceived(message_id)` is true on the given contract
    async fn message_received(&self, contract: Address, message_id: B256) -> Result<bool, IcmError>;
}

/// Ledger backed by a JSON-RPC endpoint
pub struct RpcLedger {
    provider: RootProvider<Http<Client>>,
}

impl RpcLedger {
    /// Create a new RPC ledger client
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .wrap_err_with(|| format!("Invalid RPC URL: {}", rpc_url))?,
        );

        info!(rpc_url = %rpc_url, "Created ledger RPC client");

        Ok(Self { provider })
    }

    /// Chain ID reported by the node
    pub async fn chain_id(&self) -> Result<u64> {
        let chain_id = self.provider.get_chain_id().await?;
        Ok(chain_id)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, IcmError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| IcmError::Ledger(format!("eth_getTransactionReceipt failed: {}", e)))?;

        let Some(receipt) = receipt else {
            debug!(tx_hash = %tx_hash, "Receipt not available yet");
            return Ok(None);
        };

        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| ReceiptLog {
                address: log.address(),
                topics: log.topics().to_vec(),
            })
            .collect();

        Ok(Some(ReceiptSummary {
            tx_hash,
            success: receipt.status(),
            block_number: receipt.block_number,
            logs,
        }))
    }

    async fn message_received(&self, contract: Address, message_id: B256) -> Result<bool, IcmError> {
        let messenger = TeleporterMessenger::new(contract, &self.provider);
        let received = messenger
            .messageReceived(message_id)
            .call()
            .await
            .map_err(|e| IcmError::Ledger(format!("messageReceived call failed: {}", e)))?;
        Ok(received._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(topics: Vec<B256>) -> ReceiptLog {
        ReceiptLog {
            address: Address::ZERO,
            topics,
        }
    }

    fn receipt(logs: Vec<ReceiptLog>) -> ReceiptSummary {
        ReceiptSummary {
            tx_hash: B256::ZERO,
            success: true,
            block_number: Some(1),
            logs,
        }
    }

    #[test]
    fn test_message_id_is_second_topic_of_first_log() {
        let id = B256::repeat_byte(0x42);
        let r = receipt(vec![
            log(vec![B256::repeat_byte(0x01), id]),
            log(vec![B256::repeat_byte(0x02), B256::repeat_byte(0x03)]),
        ]);
        assert_eq!(r.message_id(), Some(id));
    }

    #[test]
    fn test_message_id_absent_without_logs() {
        assert_eq!(receipt(vec![]).message_id(), None);
    }

    #[test]
    fn test_message_id_absent_with_single_topic() {
        let r = receipt(vec![log(vec![B256::repeat_byte(0x01)])]);
        assert_eq!(r.message_id(), None);
    }

    #[test]
    fn test_rpc_ledger_rejects_bad_url() {
        assert!(RpcLedger::new("not a url").is_err());
        assert!(RpcLedger::new("http://localhost:8545").is_ok());
    }
}
