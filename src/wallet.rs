//! Wallet-signing boundary
//!
//! In the dashboard the browser wallet signs; the server never sees keys.
//! For scripted sends the same step goes through [`WalletSigner`], and
//! [`LocalWallet`] provides a private-key implementation.
//!
//! # Transaction Building
//!
//! `LocalWallet` uses `ProviderBuilder::with_recommended_fillers()` so the
//! nonce and fee fields are populated; the gas limit comes from the
//! prepared transaction.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::info;

use crate::error::IcmError;
use crate::types::TransactionData;

/// Signs and broadcasts a prepared transaction.
///
/// Returns the transaction hash, or `SignatureRejected` when the wallet
/// declines or cannot submit.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address the transaction will be sent from
    fn address(&self) -> Address;

    async fn sign_and_submit(&self, tx: &TransactionData) -> Result<B256, IcmError>;
}

/// Private-key wallet submitting over JSON-RPC
pub struct LocalWallet {
    rpc_url: String,
    signer: PrivateKeySigner,
}

impl LocalWallet {
    /// Create a wallet from a hex private key
    pub fn new(rpc_url: &str, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;

        info!(sender = %signer.address(), "Local wallet initialized");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            signer,
        })
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_and_submit(&self, tx: &TransactionData) -> Result<B256, IcmError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| IcmError::SignatureRejected(format!("Invalid RPC URL: {}", e)))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        let request = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(tx.to)
            .with_input(tx.data.clone())
            .with_value(tx.value)
            .with_gas_limit(tx.gas_limit);

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| IcmError::SignatureRejected(e.to_string()))?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, to = %tx.to, "Transaction submitted by local wallet");
        Ok(tx_hash)
    }
}
