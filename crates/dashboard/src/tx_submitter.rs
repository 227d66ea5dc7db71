//! # TransactionSubmitter: Staking Contract Write Path
//!
//! Dispatches one write call to the staking contract with a gas price from
//! the configured priority tier, and reports its lifecycle.
//!
//! ## Flow
//!
//! ```text
//! StakerCall
//!      │
//!      ▼
//! signer present? ── no ──▶ NoSignerAvailable (oracle and contract untouched)
//!      │ yes
//!      ▼
//! GasPriceOracle::gas_price(tier) ── err ──▶ GasPriceUnavailable
//!      │
//!      ▼
//! StakerWriter::send()  ── err ──▶ TransactionFailed(Rejected)
//!      │
//!      ▼  Submitted
//! StakerWriter::wait_for_receipt()
//!      │
//!      ├─ success  ──▶ Confirmed
//!      ├─ reverted ──▶ TransactionFailed(Reverted)
//!      └─ err      ──▶ TransactionFailed(ReceiptUnavailable)
//! ```
//!
//! ## No Implicit Retry
//!
//! The submitter performs a single attempt. It does NOT:
//!
//! - Retry on failure.
//! - Sleep or backoff.
//! - Touch the local contract view. The next sync trigger picks up the
//!   effect of a confirmed call.
//!
//! Amount-bearing calls arrive with their value already converted to the
//! smallest unit; conversion errors surface as
//! [`SubmitError::InvalidAmountInput`] before anything is dispatched.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use staker_common::{
    format_ether, Address, Amount, AmountError, ContractError, GasPriceOracle, GasTier,
    PendingTransaction, StakerCall, StakerWriter, B256,
};

use crate::metrics::DashboardMetrics;

/// Buffered lifecycle updates per subscriber.
const STATUS_CHANNEL_CAPACITY: usize = 64;

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Why a dispatched transaction did not confirm.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxFailure {
    /// The node refused the transaction.
    #[error("rejected: {0}")]
    Rejected(ContractError),

    /// Mined, but execution reverted.
    #[error("reverted in block {block_number} (tx {tx_hash})")]
    Reverted { tx_hash: B256, block_number: u64 },

    /// Sent, but its receipt could not be obtained.
    #[error("receipt for {tx_hash} unavailable: {reason}")]
    ReceiptUnavailable { tx_hash: B256, reason: ContractError },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("no signer available")]
    NoSignerAvailable,

    #[error("invalid amount input: {0}")]
    InvalidAmountInput(#[from] AmountError),

    #[error("gas price for tier {tier} unavailable: {reason}")]
    GasPriceUnavailable { tier: GasTier, reason: ContractError },

    #[error("transaction failed: {0}")]
    TransactionFailed(TxFailure),
}

// ════════════════════════════════════════════════════════════════════════════════
// LIFECYCLE
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStage {
    Submitted { tx_hash: B256, gas_price: Amount },
    Confirmed { tx_hash: B256, block_number: u64 },
    Failed { reason: TxFailure },
}

/// Lifecycle transition of one call, published to [`TransactionSubmitter::updates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    pub call: StakerCall,
    pub stage: TxStage,
}

/// A confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub call: StakerCall,
    pub gas_price: Amount,
    pub tx_hash: B256,
    pub block_number: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// SUBMITTER
// ════════════════════════════════════════════════════════════════════════════════

/// Sends staking contract calls through an optional signer.
///
/// ## Usage
///
/// ```rust,ignore
/// let submitter = TransactionSubmitter::new(Some(writer), oracle, GasTier::Fast, metrics);
/// let outcome = submitter.submit(StakerCall::Execute).await?;
/// ```
pub struct TransactionSubmitter {
    writer: Option<Arc<dyn StakerWriter>>,
    gas_oracle: Arc<dyn GasPriceOracle>,
    gas_tier: GasTier,
    metrics: Arc<DashboardMetrics>,
    updates: broadcast::Sender<TxStatus>,
}

impl TransactionSubmitter {
    #[must_use]
    pub fn new(
        writer: Option<Arc<dyn StakerWriter>>,
        gas_oracle: Arc<dyn GasPriceOracle>,
        gas_tier: GasTier,
        metrics: Arc<DashboardMetrics>,
    ) -> Self {
        let (updates, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            writer,
            gas_oracle,
            gas_tier,
            metrics,
            updates,
        }
    }

    /// Address of the connected signer, if any.
    pub fn signer(&self) -> Option<Address> {
        self.writer.as_ref().map(|w| w.signer())
    }

    pub fn gas_tier(&self) -> GasTier {
        self.gas_tier
    }

    /// Receives every lifecycle transition from now on.
    pub fn updates(&self) -> broadcast::Receiver<TxStatus> {
        self.updates.subscribe()
    }

    /// Submits `call` once and waits for its receipt.
    pub async fn submit(&self, call: StakerCall) -> Result<TxOutcome, SubmitError> {
        let Some(writer) = self.writer.as_ref() else {
            warn!("{} refused: no signer available", call.method());
            return Err(SubmitError::NoSignerAvailable);
        };

        let gas_price = self
            .gas_oracle
            .gas_price(self.gas_tier)
            .await
            .map_err(|reason| {
                warn!("{} not sent: gas price unavailable: {}", call.method(), reason);
                SubmitError::GasPriceUnavailable {
                    tier: self.gas_tier,
                    reason,
                }
            })?;

        let pending = PendingTransaction { call, gas_price };
        debug!(
            "sending {} value={} gas_price={} ({})",
            call.method(),
            format_ether(call.value()),
            gas_price,
            self.gas_tier
        );

        let handle = match writer.send(&pending).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(call, TxFailure::Rejected(e))),
        };
        self.metrics.record_tx_submitted();
        info!("{} submitted: {}", call.method(), handle.tx_hash);
        self.publish(
            call,
            TxStage::Submitted {
                tx_hash: handle.tx_hash,
                gas_price,
            },
        );

        let receipt = match writer.wait_for_receipt(&handle).await {
            Ok(receipt) => receipt,
            Err(reason) => {
                return Err(self.fail(
                    call,
                    TxFailure::ReceiptUnavailable {
                        tx_hash: handle.tx_hash,
                        reason,
                    },
                ))
            }
        };

        if !receipt.success {
            return Err(self.fail(
                call,
                TxFailure::Reverted {
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                },
            ));
        }

        self.metrics.record_tx_confirmed();
        info!(
            "{} confirmed in block {}",
            call.method(),
            receipt.block_number
        );
        self.publish(
            call,
            TxStage::Confirmed {
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
            },
        );

        Ok(TxOutcome {
            call,
            gas_price,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        })
    }

    fn fail(&self, call: StakerCall, reason: TxFailure) -> SubmitError {
        self.metrics.record_tx_failed();
        warn!("{} failed: {}", call.method(), reason);
        self.publish(
            call,
            TxStage::Failed {
                reason: reason.clone(),
            },
        );
        SubmitError::TransactionFailed(reason)
    }

    fn publish(&self, call: StakerCall, stage: TxStage) {
        // No receivers is fine.
        let _ = self.updates.send(TxStatus { call, stage });
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<TransactionSubmitter>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
