//! # Staker Dashboard
//!
//! Client-side core of a staking-contract dashboard: keeps a local view of
//! the contract in sync, renders its countdown, follows `Stake` events and
//! submits user actions.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       DashboardSession                        │
//! │                                                               │
//! │  BalanceWatcher / timer ──▶ StateSyncEngine ──▶ ContractStateView
//! │                                                      │        │
//! │                                   decompose() ◀──────┘        │
//! │                                   TimeBreakdown               │
//! │                                                               │
//! │  StakeEventSource ──▶ EventFeed ──▶ StakeEventLog             │
//! │                                                               │
//! │  actions ──▶ TransactionSubmitter ──▶ StakerWriter            │
//! │                                                               │
//! │  BalanceProvider / PriceFeed ──▶ PoolWatcher ──▶ PoolView     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `state_sync`: concurrent per-field refresh of the contract view
//! - `duration`: seconds → days / hours / minutes / seconds strings
//! - `event_feed`: bounded, deduplicated, arrival-ordered event log
//! - `tx_submitter`: single-attempt write path with gas tier pricing
//! - `triggers`: balance-change and timer refresh triggers
//! - `pool`: display-only pool balances and native price
//! - `session`: wiring, user actions and teardown
//! - `metrics`: lock-free counters with Prometheus export
//!
//! ## Failure Model
//!
//! Every failure is local. A failed read keeps the last value, a broken
//! event stream is resubscribed, a failed transaction is reported to the
//! caller. Nothing here panics or retries a write.

pub mod duration;
pub mod event_feed;
pub mod metrics;
pub mod pool;
pub mod session;
pub mod shutdown;
pub mod state_sync;
pub mod triggers;
pub mod tx_submitter;

pub use duration::{decompose, DurationError, TimeBreakdown};
pub use event_feed::{AppendOutcome, EventFeed, FeedError, FeedSettings, StakeEventLog};
pub use metrics::{DashboardMetrics, MetricsSnapshot};
pub use pool::{fiat_value, PoolView, PoolWatcher};
pub use session::{Collaborators, DashboardSession, DashboardSnapshot, SessionSettings};
pub use shutdown::Shutdown;
pub use state_sync::{RefreshReport, StateSyncEngine, SyncError, SyncTrigger};
pub use triggers::{run_timer, BalanceWatcher};
pub use tx_submitter::{SubmitError, TransactionSubmitter, TxFailure, TxOutcome, TxStage, TxStatus};
