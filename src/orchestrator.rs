//! Transaction orchestration: prepare, sign externally, confirm and record
//!
//! # Flow
//!
//! ```text
//! Drafted -> Prepared -> AwaitingSignature -> Submitted -> Confirmed
//!    \__________\_______________\_______________\______-> Failed
//! ```
//!
//! 1. `prepare` validates and encodes the request (no external calls)
//! 2. The wallet signs and broadcasts; control leaves the process
//! 3. `confirm` polls the ledger for the receipt under a bounded timeout
//! 4. The submission is appended to the store once the receipt exists
//!
//! Dropping a `confirm` future before the receipt arrives leaves no trace in
//! the store, and the on-chain transaction is unaffected.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256, U256};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::encoder::{self, ContractMode, MessageEncoder};
use crate::error::{IcmError, StoreError};
use crate::fees::{self, FeeEstimator};
use crate::ledger::{Ledger, ReceiptSummary};
use crate::metrics;
use crate::store::MessageStore;
use crate::types::{
    DeliveryStatus, FeeQuote, MessageInput, MessageRequest, MessageStatus, PreparedTransaction,
    SubmissionRecord,
};
use crate::wallet::WalletSigner;

/// Orchestrator settings, fixed at construction
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: ContractMode,
    /// Destination gas limit when the request does not set one
    pub default_gas_limit: u64,
    /// Gas limit suggested to the wallet for the source-chain transaction
    pub wallet_gas_limit: u64,
    /// Relayer fee when the request carries a zero amount
    pub default_fee_amount: U256,
    /// Largest accepted amount, in wei
    pub max_amount: U256,
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: ContractMode::Mock,
            default_gas_limit: 200_000,
            wallet_gas_limit: 500_000,
            // 0.01 AVAX
            default_fee_amount: U256::from(10_000_000_000_000_000u64),
            // 10 AVAX
            max_amount: U256::from(10_000_000_000_000_000_000u128),
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Form input as received from the dashboard
#[derive(Debug, Clone, Default)]
pub struct SendDraft {
    pub destination_chain_id: String,
    pub recipient: String,
    pub message: String,
    /// Relayer fee in AVAX; empty or zero selects the default fee
    pub amount: String,
    pub required_gas_limit: Option<u64>,
    pub allowed_relayer_addresses: Vec<String>,
}

/// Lifecycle of one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Drafted,
    Prepared,
    AwaitingSignature,
    Submitted(B256),
    Confirmed(B256),
    Failed(String),
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Drafted => "drafted",
            FlowState::Prepared => "prepared",
            FlowState::AwaitingSignature => "awaiting_signature",
            FlowState::Submitted(_) => "submitted",
            FlowState::Confirmed(_) => "confirmed",
            FlowState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Confirmed(_) | FlowState::Failed(_))
    }

    /// Forward steps only; any live state may fail
    pub fn can_transition_to(&self, next: &FlowState) -> bool {
        match (self, next) {
            (s, FlowState::Failed(_)) => !s.is_terminal(),
            (FlowState::Drafted, FlowState::Prepared) => true,
            (FlowState::Prepared, FlowState::AwaitingSignature) => true,
            (FlowState::AwaitingSignature, FlowState::Submitted(_)) => true,
            (FlowState::Submitted(a), FlowState::Confirmed(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Tracks a single send through [`FlowState`]
#[derive(Debug)]
pub struct SendFlow {
    state: FlowState,
    history: Vec<FlowState>,
}

impl Default for SendFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl SendFlow {
    pub fn new() -> Self {
        Self {
            state: FlowState::Drafted,
            history: vec![FlowState::Drafted],
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Move to `next`; illegal transitions are refused and leave the state unchanged
    pub fn advance(&mut self, next: FlowState) -> bool {
        if !self.state.can_transition_to(&next) {
            warn!(from = %self.state, to = %next, "Refused illegal flow transition");
            return false;
        }
        debug!(from = %self.state, to = %next, "Send flow transition");
        self.state = next.clone();
        self.history.push(next);
        true
    }

    fn fail(&mut self, err: &IcmError) {
        self.advance(FlowState::Failed(err.kind().to_string()));
    }
}

/// Completion payload from the dashboard after the wallet signed
#[derive(Debug, Clone)]
pub struct Completion {
    pub tx_hash: String,
    pub sender: Address,
    pub message_input: MessageInput,
}

/// Outcome of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub tx_hash: B256,
    /// `None` when the receipt carried no message ID
    pub message_id: Option<B256>,
    pub block_number: Option<u64>,
    pub status: DeliveryStatus,
    pub mock: bool,
}

impl Confirmation {
    /// The message ID, or `MessageIdUnavailable`
    pub fn message_id(&self) -> Result<B256, IcmError> {
        self.message_id
            .ok_or_else(|| IcmError::MessageIdUnavailable(self.tx_hash.to_string()))
    }
}

/// Drives sends from form input to a recorded submission
pub struct Orchestrator {
    config: OrchestratorConfig,
    encoder: MessageEncoder,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn MessageStore>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        fees: FeeEstimator,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let encoder = MessageEncoder::new(config.mode, config.wallet_gas_limit, fees);
        info!(
            mock = config.mode.is_mock(),
            contract = ?config.mode.contract_address(),
            confirmation_timeout_secs = config.confirmation_timeout.as_secs(),
            "Orchestrator initialized"
        );
        Self {
            config,
            encoder,
            ledger,
            store,
        }
    }

    pub fn mode(&self) -> ContractMode {
        self.config.mode
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Quote the fee for a message of the given size
    pub fn estimate_fee(&self, destination_chain_id: &str, size: u64, gas_limit: u64) -> FeeQuote {
        self.encoder.fees().estimate(destination_chain_id, size, gas_limit)
    }

    /// Validate the amount and turn form input into a request
    pub fn draft_to_request(&self, draft: &SendDraft) -> Result<MessageRequest, IcmError> {
        // Cheapest check first; nothing below may run for oversized input
        encoder::check_message_length(&draft.message)?;

        let amount = draft.amount.trim();
        let fee_amount = if amount.is_empty() {
            self.config.default_fee_amount
        } else {
            if amount.starts_with('-') {
                return Err(IcmError::AmountOutOfRange {
                    amount: amount.to_string(),
                    max: fees::format_avax(self.config.max_amount),
                });
            }
            let wei =
                fees::parse_avax(amount).map_err(|_| IcmError::InvalidAmount(amount.to_string()))?;
            if wei > self.config.max_amount {
                return Err(IcmError::AmountOutOfRange {
                    amount: amount.to_string(),
                    max: fees::format_avax(self.config.max_amount),
                });
            }
            if wei.is_zero() {
                self.config.default_fee_amount
            } else {
                wei
            }
        };

        Ok(MessageRequest {
            destination_chain_id: draft.destination_chain_id.clone(),
            destination_address: draft.recipient.clone(),
            message: draft.message.clone(),
            required_gas_limit: draft
                .required_gas_limit
                .unwrap_or(self.config.default_gas_limit),
            allowed_relayer_addresses: draft.allowed_relayer_addresses.clone(),
            fee_amount,
        })
    }

    /// Phase 1: validate and encode. No external call is made.
    pub fn prepare(&self, draft: &SendDraft) -> Result<PreparedTransaction, IcmError> {
        let request = self.draft_to_request(draft)?;
        let prepared = self.encoder.encode(&request)?;

        metrics::MESSAGES_PREPARED
            .with_label_values(&[if prepared.mock { "mock" } else { "real" }])
            .inc();
        info!(
            destination = %prepared.message_input.destination_blockchain_id,
            recipient = %prepared.message_input.destination_address,
            message_preview = %preview(&prepared.message_input.message),
            gas_limit = prepared.message_input.required_gas_limit,
            mock = prepared.mock,
            "Prepared ICM transaction for wallet signing"
        );
        Ok(prepared)
    }

    /// Phase 3: wait for the receipt, derive the message ID and record.
    ///
    /// Fails with `ConfirmationTimeout` (nothing recorded, safe to retry),
    /// or `ReceiptIndicatesRevert` (recorded as failed). A confirmation
    /// without a message ID is still recorded; see [`Confirmation::message_id`].
    pub async fn confirm(&self, completion: Completion) -> Result<Confirmation, IcmError> {
        let tx_hash = encoder::parse_hash(&completion.tx_hash)?;

        // A retried completion returns what was recorded the first time
        if let Some(existing) = self.store.get(tx_hash).await? {
            debug!(tx_hash = %tx_hash, status = %existing.status, "Completion already recorded");
            return recorded_outcome(&existing);
        }

        info!(tx_hash = %tx_hash, "Processing completed ICM transaction");
        let started = Instant::now();
        let receipt = match self.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(err) => {
                metrics::CONFIRMATIONS
                    .with_label_values(&[err.kind()])
                    .inc();
                return Err(err);
            }
        };
        metrics::CONFIRMATION_LATENCY.observe(started.elapsed().as_secs_f64());

        let mock = self.config.mode.is_mock();
        let mut record = SubmissionRecord {
            tx_hash,
            message_id: None,
            sender: completion.sender,
            destination_chain_id: completion.message_input.destination_blockchain_id,
            destination_address: completion.message_input.destination_address,
            message: completion.message_input.message.clone(),
            value: completion.message_input.fee_amount,
            status: DeliveryStatus::Pending,
            failure_reason: None,
            mock,
            block_number: receipt.block_number,
            submitted_at: Utc::now(),
            delivered_at: None,
        };

        if !receipt.success {
            let err = IcmError::ReceiptIndicatesRevert(tx_hash.to_string());
            record.status = DeliveryStatus::Failed;
            record.failure_reason = Some(err.kind().to_string());
            self.record(record).await?;
            metrics::CONFIRMATIONS.with_label_values(&[err.kind()]).inc();
            warn!(tx_hash = %tx_hash, block = ?receipt.block_number, "ICM transaction reverted");
            return Err(err);
        }

        // Mock transactions never went through a messenger, so any log is unrelated
        record.message_id = if mock { None } else { receipt.message_id() };
        let confirmation = confirmation_from_record(&record);
        self.record(record).await?;

        match confirmation.message_id {
            Some(message_id) => {
                metrics::CONFIRMATIONS.with_label_values(&["confirmed"]).inc();
                info!(
                    tx_hash = %tx_hash,
                    message_id = %message_id,
                    block = ?receipt.block_number,
                    "ICM message sent successfully"
                );
            }
            None => {
                metrics::CONFIRMATIONS
                    .with_label_values(&["message_id_unavailable"])
                    .inc();
                warn!(
                    tx_hash = %tx_hash,
                    block = ?receipt.block_number,
                    mock,
                    "Transaction confirmed but no message ID was emitted"
                );
            }
        }

        Ok(confirmation)
    }

    /// Full flow with a programmatic wallet: prepare, sign, confirm
    pub async fn send(
        &self,
        draft: &SendDraft,
        wallet: &dyn WalletSigner,
    ) -> Result<Confirmation, IcmError> {
        let mut flow = SendFlow::new();
        let result = self.drive(&mut flow, draft, wallet).await;
        if let Err(err) = &result {
            flow.fail(err);
        }
        info!(
            final_state = %flow.state(),
            steps = flow.history().len(),
            "Send flow finished"
        );
        result
    }

    async fn drive(
        &self,
        flow: &mut SendFlow,
        draft: &SendDraft,
        wallet: &dyn WalletSigner,
    ) -> Result<Confirmation, IcmError> {
        // A mock payload sent for real would only burn the fee at the zero address
        if self.config.mode.is_mock() {
            return Err(IcmError::ContractNotConfigured);
        }

        let prepared = self.prepare(draft)?;
        flow.advance(FlowState::Prepared);

        flow.advance(FlowState::AwaitingSignature);
        let tx_hash = wallet.sign_and_submit(&prepared.transaction_data).await?;
        flow.advance(FlowState::Submitted(tx_hash));

        let confirmation = self
            .confirm(Completion {
                tx_hash: tx_hash.to_string(),
                sender: wallet.address(),
                message_input: prepared.message_input,
            })
            .await?;
        flow.advance(FlowState::Confirmed(tx_hash));
        Ok(confirmation)
    }

    /// Ask the messenger whether a message has been received.
    ///
    /// Read-only: repeated calls return `pending` until the ledger changes.
    pub async fn message_status(&self, message_id: B256) -> Result<MessageStatus, IcmError> {
        let ContractMode::Real(contract) = self.config.mode else {
            return Err(IcmError::ContractNotConfigured);
        };

        let received = self.ledger.message_received(contract, message_id).await?;
        let status = if received {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Pending
        };
        metrics::STATUS_CHECKS
            .with_label_values(&[status.as_str()])
            .inc();
        debug!(message_id = %message_id, status = %status, "Checked message status");

        Ok(MessageStatus { message_id, status })
    }

    /// Check status and record a delivery in the store
    pub async fn refresh_status(&self, message_id: B256) -> Result<MessageStatus, IcmError> {
        let status = self.message_status(message_id).await?;
        if status.status == DeliveryStatus::Delivered {
            if let Some(record) = self.store.find_by_message_id(message_id).await? {
                let moved = self
                    .store
                    .transition(record.tx_hash, DeliveryStatus::Delivered, None, Utc::now())
                    .await?;
                if moved {
                    info!(
                        message_id = %message_id,
                        tx_hash = %record.tx_hash,
                        "Message delivered"
                    );
                }
            }
        }
        Ok(status)
    }

    /// Poll for the receipt until it exists or the timeout expires
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ReceiptSummary, IcmError> {
        let ledger = self.ledger.clone();
        let interval = self.config.receipt_poll_interval;
        let poll = async move {
            loop {
                if let Some(receipt) = ledger.transaction_receipt(tx_hash).await? {
                    return Ok::<_, IcmError>(receipt);
                }
                tokio::time::sleep(interval).await;
            }
        };

        match tokio::time::timeout(self.config.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    tx_hash = %tx_hash,
                    timeout_secs = self.config.confirmation_timeout.as_secs(),
                    "Timed out waiting for receipt"
                );
                Err(IcmError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout_secs: self.config.confirmation_timeout.as_secs(),
                })
            }
        }
    }

    async fn record(&self, record: SubmissionRecord) -> Result<(), IcmError> {
        match self.store.append(record).await {
            Ok(()) => Ok(()),
            // A concurrent completion of the same hash won the race
            Err(StoreError::DuplicateTransaction(hash)) => {
                debug!(tx_hash = %hash, "Submission already recorded by a concurrent completion");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Outcome of an earlier completion; a failed record stays an error
fn recorded_outcome(record: &SubmissionRecord) -> Result<Confirmation, IcmError> {
    if record.status != DeliveryStatus::Failed {
        return Ok(confirmation_from_record(record));
    }
    let tx_hash = record.tx_hash.to_string();
    let reverted = IcmError::ReceiptIndicatesRevert(tx_hash.clone());
    match record.failure_reason.as_deref() {
        Some(reason) if reason == reverted.kind() => Err(reverted),
        reason => Err(IcmError::DeliveryFailed {
            tx_hash,
            reason: reason.unwrap_or("unknown").to_string(),
        }),
    }
}

fn confirmation_from_record(record: &SubmissionRecord) -> Confirmation {
    Confirmation {
        tx_hash: record.tx_hash,
        message_id: record.message_id,
        block_number: record.block_number,
        status: record.status,
        mock: record.mock,
    }
}

fn preview(message: &str) -> String {
    let head: String = message.chars().take(50).collect();
    if head.len() < message.len() {
        format!("{}...", head)
    } else {
        head
    }
}
