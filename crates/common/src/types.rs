//! Domain Types
//!
//! Plain data shared by every layer of the dashboard: the mirrored contract
//! state, observed `Stake` events and the write calls a user can issue.
//!
//! ## Units
//!
//! Every [`Amount`] is an unsigned 256-bit integer in the contract's smallest
//! denomination (wei for an 18-decimal native token). Conversion from and to
//! human decimal strings lives in [`crate::amount`].

use std::fmt;

pub use alloy_primitives::{Address, B256, U256};

/// Quantity in the contract's smallest denomination unit.
pub type Amount = U256;

// ════════════════════════════════════════════════════════════════════════════
// CONTRACT STATE VIEW
// ════════════════════════════════════════════════════════════════════════════

/// Local mirror of the four on-chain fields tracked by the dashboard.
///
/// Optional fields are `None` until their first successful fetch.
/// `completed` starts out `false`, which is also what the contract reports
/// before the stake is executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractStateView {
    /// Total stake required before `execute()` can complete.
    pub threshold: Option<Amount>,
    /// Stake deposited by the session account.
    pub balance_staked: Option<Amount>,
    /// Seconds until the staking deadline, as reported by `timeLeft()`.
    pub seconds_left: Option<u64>,
    /// Whether the external contract has been completed.
    pub completed: bool,
}

/// Identifies one tracked field of [`ContractStateView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateField {
    Threshold,
    BalanceStaked,
    SecondsLeft,
    Completed,
}

impl StateField {
    /// All tracked fields, in display order.
    pub const ALL: [StateField; 4] = [
        StateField::Threshold,
        StateField::BalanceStaked,
        StateField::SecondsLeft,
        StateField::Completed,
    ];

    /// Name of the contract read backing this field.
    pub fn contract_call(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold()",
            Self::BalanceStaked => "balances(account)",
            Self::SecondsLeft => "timeLeft()",
            Self::Completed => "completed()",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold => write!(f, "threshold"),
            Self::BalanceStaked => write!(f, "balance_staked"),
            Self::SecondsLeft => write!(f, "seconds_left"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STAKE EVENT RECORD
// ════════════════════════════════════════════════════════════════════════════

/// One observed `Stake(sender, amount)` log entry.
///
/// The whole triple is the identity key: two records with equal fields are
/// the same event delivered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StakeEventRecord {
    /// Block in which the event was emitted.
    pub block_number: u64,
    /// Account that staked.
    pub sender: Address,
    /// Staked amount in the smallest unit.
    pub amount: Amount,
}

// ════════════════════════════════════════════════════════════════════════════
// WRITE CALLS
// ════════════════════════════════════════════════════════════════════════════

/// A user-initiated write against the staking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakerCall {
    /// `execute()`: hand the pooled stake to the external contract.
    Execute,
    /// `withdraw(account)`: reclaim stake after a missed threshold.
    Withdraw { account: Address },
    /// `stake()` with attached value.
    Stake { value: Amount },
    /// `transferEther()` with attached value.
    TransferEther { value: Amount },
}

impl StakerCall {
    /// Value attached to the call, zero for non-payable calls.
    pub fn value(&self) -> Amount {
        match self {
            Self::Stake { value } | Self::TransferEther { value } => *value,
            Self::Execute | Self::Withdraw { .. } => Amount::ZERO,
        }
    }

    /// Contract method name, used in logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Withdraw { .. } => "withdraw",
            Self::Stake { .. } => "stake",
            Self::TransferEther { .. } => "transferEther",
        }
    }
}

/// A call with its selected gas price, alive only while it is being
/// submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransaction {
    pub call: StakerCall,
    pub gas_price: Amount,
}

/// Handle to a dispatched write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    pub tx_hash: B256,
}

/// Final result of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// `true` if execution succeeded, `false` if it reverted.
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_starts_unknown() {
        let view = ContractStateView::default();
        assert!(view.threshold.is_none());
        assert!(view.balance_staked.is_none());
        assert!(view.seconds_left.is_none());
        assert!(!view.completed);
    }

    #[test]
    fn call_value_only_for_payable() {
        let value = Amount::from(5u64);
        assert_eq!(StakerCall::Stake { value }.value(), value);
        assert_eq!(StakerCall::TransferEther { value }.value(), value);
        assert_eq!(StakerCall::Execute.value(), Amount::ZERO);
        let account = Address::from([0x11; 20]);
        assert_eq!(StakerCall::Withdraw { account }.value(), Amount::ZERO);
    }

    #[test]
    fn identity_is_the_whole_triple() {
        let a = StakeEventRecord {
            block_number: 10,
            sender: Address::from([0x01; 20]),
            amount: Amount::from(7u64),
        };
        let mut b = a;
        assert_eq!(a, b);
        b.amount = Amount::from(8u64);
        assert_ne!(a, b);
    }
}
