//! Contract Collaborator Traits
//!
//! Abstractions over everything the dashboard consumes from the chain. The
//! RPC transport, signer acquisition and ABI resolution live behind these
//! traits so the sync and submission logic never depends on a concrete
//! client.
//!
//! ```text
//!                   ┌────────────────────┐
//!                   │   staking contract │
//!                   └─────────┬──────────┘
//!        ┌──────────────┬─────┴───────┬─────────────────┐
//!        ▼              ▼             ▼                 ▼
//!  StakerReader   StakerWriter   StakeEventSource   GasPriceOracle
//!  (4 reads)      (signer only)  (Stake logs)       BalanceProvider
//!
//!  display only:  PriceFeed (native → USD)   NameResolver (address → name)
//! ```
//!
//! ## Contract for Implementors
//!
//! - Implementations MUST NOT retry internally; the caller decides.
//! - Implementations MUST NOT panic.
//! - Implementations SHOULD map transport timeouts to
//!   [`ContractError::Timeout`].

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use thiserror::Error;

use crate::types::{Address, Amount, PendingTransaction, StakeEventRecord, TxHandle, TxReceipt};

/// Name of the only event type the dashboard subscribes to.
pub const STAKE_EVENT: &str = "Stake";

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Failures reported by a chain collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// Transport-level failure talking to the node.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete in time.
    #[error("call timed out")]
    Timeout,

    /// The node rejected the call (bad nonce, insufficient funds, ...).
    #[error("call rejected: {0}")]
    Rejected(String),

    /// Contract execution reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The requested event is not part of the contract ABI.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

/// Stream of decoded `Stake` logs in delivery (block) order.
///
/// Errors are delivered in-band; a stream ends only when the source closes
/// it.
pub type StakeEventStream =
    Pin<Box<dyn Stream<Item = Result<StakeEventRecord, ContractError>> + Send>>;

// ════════════════════════════════════════════════════════════════════════════
// GAS TIER
// ════════════════════════════════════════════════════════════════════════════

/// Priority tier requested from the gas-price oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasTier {
    Slow,
    Average,
    #[default]
    Fast,
    Fastest,
}

impl fmt::Display for GasTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Average => write!(f, "average"),
            Self::Fast => write!(f, "fast"),
            Self::Fastest => write!(f, "fastest"),
        }
    }
}

impl FromStr for GasTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "average" => Ok(Self::Average),
            "fast" => Ok(Self::Fast),
            "fastest" => Ok(Self::Fastest),
            other => Err(format!("unknown gas tier '{}'", other)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TRAITS
// ════════════════════════════════════════════════════════════════════════════

/// Read-only view of the staking contract.
#[async_trait]
pub trait StakerReader: Send + Sync {
    /// `threshold()`
    async fn threshold(&self) -> Result<Amount, ContractError>;

    /// `balances(account)`
    async fn balances(&self, account: Address) -> Result<Amount, ContractError>;

    /// `timeLeft()` in seconds.
    async fn time_left(&self) -> Result<u64, ContractError>;

    /// `completed()` of the external contract.
    async fn completed(&self) -> Result<bool, ContractError>;
}

/// Write-capable contract handle bound to a signer.
///
/// Only available once a wallet is connected; its absence is how the
/// submitter detects that no signer is present.
#[async_trait]
pub trait StakerWriter: Send + Sync {
    /// Address of the signing account.
    fn signer(&self) -> Address;

    /// Signs and broadcasts the call with the attached gas price.
    async fn send(&self, tx: &PendingTransaction) -> Result<TxHandle, ContractError>;

    /// Waits until the transaction is mined and returns its receipt.
    async fn wait_for_receipt(&self, handle: &TxHandle) -> Result<TxReceipt, ContractError>;
}

/// Gas-price oracle keyed by priority tier.
#[async_trait]
pub trait GasPriceOracle: Send + Sync {
    async fn gas_price(&self, tier: GasTier) -> Result<Amount, ContractError>;
}

/// Native balance lookup, used as the coarse re-sync signal.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn balance_of(&self, account: Address) -> Result<Amount, ContractError>;
}

/// Spot price of the native token, for display-only fiat conversion.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// USD per whole native token.
    async fn native_price_usd(&self) -> Result<f64, ContractError>;
}

/// Reverse name lookup for displaying addresses.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// `Ok(None)` when the address has no registered name.
    async fn lookup_name(&self, address: Address) -> Result<Option<String>, ContractError>;
}

/// Resolved deployment addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    /// The staking contract; its native balance is the pooled stake.
    pub staker: Address,
    /// The contract that receives the pool once staking completes.
    pub external: Address,
}

/// Source of decoded contract logs.
pub trait StakeEventSource: Send + Sync {
    /// Subscribes to `event_name` starting at `from_block` (inclusive).
    ///
    /// Returns [`ContractError::UnknownEvent`] for anything but
    /// [`STAKE_EVENT`].
    fn subscribe(&self, event_name: &str, from_block: u64)
        -> Result<StakeEventStream, ContractError>;
}
