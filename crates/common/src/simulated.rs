//! In-Memory Simulated Staking Contract
//!
//! [`SimulatedStaker`] implements every collaborator trait from
//! [`crate::contract`] against an in-memory chain, so the dashboard can be
//! exercised without a node. It follows the staking contract's rules:
//!
//! | Call | Effect |
//! |------|--------|
//! | `stake` / `transferEther` | adds to the sender's stake, emits `Stake` |
//! | `execute` | after the deadline: completes if the threshold is met, otherwise opens withdrawals |
//! | `withdraw(account)` | once `execute` opened withdrawals: refunds the stake |
//!
//! Staking after the deadline or after completion reverts. Each accepted
//! transaction mines exactly one block.
//!
//! Value moves between native balances like on chain: staked value sits in
//! the staking contract's balance, a completing `execute` moves it to the
//! external contract, and a withdrawal pays it back to the staker. A price
//! feed and a name registry are simulated for display.
//!
//! # Failure Injection
//!
//! Reads can be made to fail, stall for a while, or hang forever per field
//! ([`ReadBehavior`]); the event stream can be told to yield errors; the gas
//! oracle can be made unavailable. Call counters let tests assert which
//! collaborators were touched.
//!
//! # Example
//!
//! ```ignore
//! let chain = SimulatedStaker::new(threshold, 30);
//! chain.fund(alice, parse_ether("10")?);
//! let signer = chain.signer(alice);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::contract::{
    BalanceProvider, ContractAddresses, ContractError, GasPriceOracle, GasTier, NameResolver,
    PriceFeed, StakeEventSource, StakeEventStream, StakerReader, StakerWriter, STAKE_EVENT,
};
use crate::types::{
    Address, Amount, PendingTransaction, StakeEventRecord, StakerCall, StateField, TxHandle,
    TxReceipt, B256,
};

/// How often an open subscription polls for new logs.
const SUBSCRIPTION_POLL: Duration = Duration::from_millis(10);

/// Initial simulated native token price.
const DEFAULT_NATIVE_PRICE_USD: f64 = 2_000.0;

/// Injected behaviour of a single contract read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBehavior {
    /// Answer normally.
    Normal,
    /// Answer with a network error.
    Fail,
    /// Answer normally after the given delay.
    Delay(Duration),
    /// Never answer.
    Hang,
}

// ════════════════════════════════════════════════════════════════════════════
// CHAIN STATE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct ChainState {
    block_number: u64,
    threshold: Amount,
    seconds_left: u64,
    completed: bool,
    open_for_withdraw: bool,
    total_staked: Amount,
    stakes: HashMap<Address, Amount>,
    native: HashMap<Address, Amount>,
    addresses: ContractAddresses,
    native_price_usd: Option<f64>,
    names: HashMap<Address, String>,
    events: Vec<StakeEventRecord>,
    receipts: HashMap<B256, TxReceipt>,
    next_tx: u64,
    read_behavior: HashMap<StateField, ReadBehavior>,
    gas_prices: HashMap<GasTier, Amount>,
    gas_unavailable: bool,
    reject_sends: Option<String>,
    pending_stream_errors: u64,
}

impl ChainState {
    fn behavior(&self, field: StateField) -> ReadBehavior {
        self.read_behavior
            .get(&field)
            .copied()
            .unwrap_or(ReadBehavior::Normal)
    }

    fn deadline_reached(&self) -> bool {
        self.seconds_left == 0
    }

    fn native_of(&self, account: Address) -> Amount {
        self.native.get(&account).copied().unwrap_or(Amount::ZERO)
    }

    fn credit(&mut self, account: Address, amount: Amount) {
        let native = self.native.entry(account).or_insert(Amount::ZERO);
        *native = native.saturating_add(amount);
    }

    fn debit(&mut self, account: Address, amount: Amount) {
        let native = self.native.entry(account).or_insert(Amount::ZERO);
        *native = native.saturating_sub(amount);
    }

    fn next_hash(&mut self) -> B256 {
        self.next_tx += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.next_tx.to_be_bytes());
        B256::from(bytes)
    }

    /// Applies a call; `Err` carries the revert reason.
    fn apply(&mut self, from: Address, call: &StakerCall, block: u64) -> Result<(), String> {
        match *call {
            StakerCall::Stake { value } | StakerCall::TransferEther { value } => {
                if self.completed {
                    return Err("staking already completed".into());
                }
                if self.deadline_reached() {
                    return Err("deadline reached".into());
                }
                let stake = self.stakes.entry(from).or_insert(Amount::ZERO);
                *stake = stake.saturating_add(value);
                self.total_staked = self.total_staked.saturating_add(value);
                self.credit(self.addresses.staker, value);
                self.events.push(StakeEventRecord {
                    block_number: block,
                    sender: from,
                    amount: value,
                });
                Ok(())
            }
            StakerCall::Execute => {
                if self.completed {
                    return Err("staking already completed".into());
                }
                if !self.deadline_reached() {
                    return Err("deadline not reached".into());
                }
                if self.total_staked >= self.threshold {
                    self.completed = true;
                    let pool = self.native_of(self.addresses.staker);
                    self.debit(self.addresses.staker, pool);
                    self.credit(self.addresses.external, pool);
                } else {
                    self.open_for_withdraw = true;
                }
                Ok(())
            }
            StakerCall::Withdraw { account } => {
                if !self.open_for_withdraw {
                    return Err("withdrawals are not open".into());
                }
                let stake = self.stakes.remove(&account).unwrap_or(Amount::ZERO);
                if stake == Amount::ZERO {
                    return Err("nothing to withdraw".into());
                }
                self.total_staked = self.total_staked.saturating_sub(stake);
                self.debit(self.addresses.staker, stake);
                self.credit(account, stake);
                Ok(())
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SIMULATED STAKER
// ════════════════════════════════════════════════════════════════════════════

struct Inner {
    state: Mutex<ChainState>,
    reads: Mutex<HashMap<StateField, u64>>,
    gas_lookups: AtomicU64,
    sends: AtomicU64,
    subscriptions: AtomicU64,
}

/// In-memory staking contract. Cheap to clone; clones share one chain.
#[derive(Clone)]
pub struct SimulatedStaker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SimulatedStaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SimulatedStaker")
            .field("block_number", &state.block_number)
            .field("seconds_left", &state.seconds_left)
            .field("completed", &state.completed)
            .field("events", &state.events.len())
            .finish()
    }
}

impl SimulatedStaker {
    /// Creates a chain at block 1 with the given threshold and deadline.
    pub fn new(threshold: Amount, seconds_left: u64) -> Self {
        let gas_prices = [
            (GasTier::Slow, Amount::from(1_000_000_000u64)),
            (GasTier::Average, Amount::from(2_000_000_000u64)),
            (GasTier::Fast, Amount::from(3_000_000_000u64)),
            (GasTier::Fastest, Amount::from(5_000_000_000u64)),
        ]
        .into_iter()
        .collect();

        let state = ChainState {
            block_number: 1,
            threshold,
            seconds_left,
            completed: false,
            open_for_withdraw: false,
            total_staked: Amount::ZERO,
            stakes: HashMap::new(),
            native: HashMap::new(),
            addresses: ContractAddresses {
                staker: Address::from([0x5E; 20]),
                external: Address::from([0xE7; 20]),
            },
            native_price_usd: Some(DEFAULT_NATIVE_PRICE_USD),
            names: HashMap::new(),
            events: Vec::new(),
            receipts: HashMap::new(),
            next_tx: 0,
            read_behavior: HashMap::new(),
            gas_prices,
            gas_unavailable: false,
            reject_sends: None,
            pending_stream_errors: 0,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                reads: Mutex::new(HashMap::new()),
                gas_lookups: AtomicU64::new(0),
                sends: AtomicU64::new(0),
                subscriptions: AtomicU64::new(0),
            }),
        }
    }

    /// Write handle signing as `from`.
    pub fn signer(&self, from: Address) -> SimulatedSigner {
        SimulatedSigner {
            chain: self.clone(),
            from,
        }
    }

    // ── test helpers ────────────────────────────────────────────────────

    /// Addresses of the simulated staking and external contracts.
    pub fn addresses(&self) -> ContractAddresses {
        self.inner.state.lock().addresses
    }

    /// Credits native balance to `account`.
    pub fn fund(&self, account: Address, amount: Amount) {
        self.inner.state.lock().credit(account, amount);
    }

    /// `None` makes the price feed fail.
    pub fn set_native_price(&self, usd: Option<f64>) {
        self.inner.state.lock().native_price_usd = usd;
    }

    pub fn register_name(&self, account: Address, name: &str) {
        self.inner.state.lock().names.insert(account, name.to_string());
    }

    /// Moves the clock forward; the deadline saturates at zero.
    pub fn advance_time(&self, seconds: u64) {
        let mut state = self.inner.state.lock();
        state.seconds_left = state.seconds_left.saturating_sub(seconds);
    }

    pub fn set_threshold(&self, threshold: Amount) {
        self.inner.state.lock().threshold = threshold;
    }

    /// Mines an empty block.
    pub fn mine_block(&self) -> u64 {
        let mut state = self.inner.state.lock();
        state.block_number += 1;
        state.block_number
    }

    /// Appends a raw log entry, e.g. to replay an already delivered event.
    pub fn push_event(&self, record: StakeEventRecord) {
        self.inner.state.lock().events.push(record);
    }

    pub fn set_read_behavior(&self, field: StateField, behavior: ReadBehavior) {
        self.inner.state.lock().read_behavior.insert(field, behavior);
    }

    pub fn set_gas_unavailable(&self, unavailable: bool) {
        self.inner.state.lock().gas_unavailable = unavailable;
    }

    /// Makes every following `send` fail with [`ContractError::Rejected`].
    pub fn reject_sends(&self, reason: Option<&str>) {
        self.inner.state.lock().reject_sends = reason.map(str::to_string);
    }

    /// Makes open subscriptions yield `count` errors before further logs.
    pub fn inject_stream_errors(&self, count: u64) {
        self.inner.state.lock().pending_stream_errors += count;
    }

    pub fn block_number(&self) -> u64 {
        self.inner.state.lock().block_number
    }

    pub fn stake_of(&self, account: Address) -> Amount {
        self.inner
            .state
            .lock()
            .stakes
            .get(&account)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn read_calls(&self, field: StateField) -> u64 {
        self.inner.reads.lock().get(&field).copied().unwrap_or(0)
    }

    pub fn gas_lookups(&self) -> u64 {
        self.inner.gas_lookups.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> u64 {
        self.inner.sends.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> u64 {
        self.inner.subscriptions.load(Ordering::SeqCst)
    }

    // ── internals ───────────────────────────────────────────────────────

    /// Counts the call and applies injected behaviour. The lock is released
    /// before any await.
    async fn enter_read(&self, field: StateField) -> Result<(), ContractError> {
        *self.inner.reads.lock().entry(field).or_insert(0) += 1;
        let behavior = self.inner.state.lock().behavior(field);
        match behavior {
            ReadBehavior::Normal => Ok(()),
            ReadBehavior::Fail => Err(ContractError::Network(format!(
                "injected failure for {}",
                field.contract_call()
            ))),
            ReadBehavior::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            ReadBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl StakerReader for SimulatedStaker {
    async fn threshold(&self) -> Result<Amount, ContractError> {
        self.enter_read(StateField::Threshold).await?;
        Ok(self.inner.state.lock().threshold)
    }

    async fn balances(&self, account: Address) -> Result<Amount, ContractError> {
        self.enter_read(StateField::BalanceStaked).await?;
        Ok(self.stake_of(account))
    }

    async fn time_left(&self) -> Result<u64, ContractError> {
        self.enter_read(StateField::SecondsLeft).await?;
        Ok(self.inner.state.lock().seconds_left)
    }

    async fn completed(&self) -> Result<bool, ContractError> {
        self.enter_read(StateField::Completed).await?;
        Ok(self.inner.state.lock().completed)
    }
}

#[async_trait]
impl GasPriceOracle for SimulatedStaker {
    async fn gas_price(&self, tier: GasTier) -> Result<Amount, ContractError> {
        self.inner.gas_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.inner.state.lock();
        if state.gas_unavailable {
            return Err(ContractError::Network("gas oracle unavailable".into()));
        }
        state
            .gas_prices
            .get(&tier)
            .copied()
            .ok_or_else(|| ContractError::Network(format!("no price for tier {}", tier)))
    }
}

#[async_trait]
impl BalanceProvider for SimulatedStaker {
    async fn balance_of(&self, account: Address) -> Result<Amount, ContractError> {
        Ok(self.inner.state.lock().native_of(account))
    }
}

#[async_trait]
impl PriceFeed for SimulatedStaker {
    async fn native_price_usd(&self) -> Result<f64, ContractError> {
        self.inner
            .state
            .lock()
            .native_price_usd
            .ok_or_else(|| ContractError::Network("price feed unavailable".into()))
    }
}

#[async_trait]
impl NameResolver for SimulatedStaker {
    async fn lookup_name(&self, address: Address) -> Result<Option<String>, ContractError> {
        Ok(self.inner.state.lock().names.get(&address).cloned())
    }
}

impl StakeEventSource for SimulatedStaker {
    fn subscribe(
        &self,
        event_name: &str,
        from_block: u64,
    ) -> Result<StakeEventStream, ContractError> {
        use futures::stream::unfold;

        if event_name != STAKE_EVENT {
            return Err(ContractError::UnknownEvent(event_name.to_string()));
        }
        self.inner.subscriptions.fetch_add(1, Ordering::SeqCst);
        debug!("simulated subscription to {} from block {}", event_name, from_block);

        struct SubscriptionState {
            chain: SimulatedStaker,
            from_block: u64,
            cursor: usize,
        }

        let initial = SubscriptionState {
            chain: self.clone(),
            from_block,
            cursor: 0,
        };

        let stream: StakeEventStream = Box::pin(unfold(initial, |mut sub| async move {
            loop {
                // Scope the guard so it is dropped before the sleep below.
                let next = {
                    let mut state = sub.chain.inner.state.lock();
                    if state.pending_stream_errors > 0 {
                        state.pending_stream_errors -= 1;
                        Some(Err(ContractError::Network("subscription dropped".into())))
                    } else {
                        let found = state.events[sub.cursor.min(state.events.len())..]
                            .iter()
                            .position(|e| e.block_number >= sub.from_block);
                        found.map(|offset| {
                            let idx = sub.cursor + offset;
                            sub.cursor = idx + 1;
                            Ok(state.events[idx])
                        })
                    }
                };

                if let Some(item) = next {
                    return Some((item, sub));
                }
                tokio::time::sleep(SUBSCRIPTION_POLL).await;
            }
        }));
        Ok(stream)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SIGNER
// ════════════════════════════════════════════════════════════════════════════

/// Write handle of [`SimulatedStaker`] bound to one account.
#[derive(Debug, Clone)]
pub struct SimulatedSigner {
    chain: SimulatedStaker,
    from: Address,
}

#[async_trait]
impl StakerWriter for SimulatedSigner {
    fn signer(&self) -> Address {
        self.from
    }

    async fn send(&self, tx: &PendingTransaction) -> Result<TxHandle, ContractError> {
        self.chain.inner.sends.fetch_add(1, Ordering::SeqCst);
        let mut state = self.chain.inner.state.lock();

        if let Some(reason) = &state.reject_sends {
            return Err(ContractError::Rejected(reason.clone()));
        }
        if tx.gas_price == Amount::ZERO {
            return Err(ContractError::Rejected("gas price is zero".into()));
        }
        let value = tx.call.value();
        if state.native_of(self.from) < value {
            return Err(ContractError::Rejected("insufficient funds".into()));
        }

        state.block_number += 1;
        let block = state.block_number;
        let tx_hash = state.next_hash();

        // The value leaves the sender before the call runs; a revert returns it.
        state.debit(self.from, value);
        let success = match state.apply(self.from, &tx.call, block) {
            Ok(()) => true,
            Err(reason) => {
                debug!("simulated {} reverted: {}", tx.call.method(), reason);
                state.credit(self.from, value);
                false
            }
        };

        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: block,
                success,
            },
        );
        Ok(TxHandle { tx_hash })
    }

    async fn wait_for_receipt(&self, handle: &TxHandle) -> Result<TxReceipt, ContractError> {
        self.chain
            .inner
            .state
            .lock()
            .receipts
            .get(&handle.tx_hash)
            .copied()
            .ok_or_else(|| ContractError::Network("unknown transaction".into()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
