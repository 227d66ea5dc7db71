//! State Sync Engine
//!
//! Keeps the local [`ContractStateView`] in step with the staking contract.
//!
//! ## Refresh Flow
//!
//! ```text
//! SyncTrigger ──▶ refresh()
//!                   │
//!                   ├─ threshold()        ──▶ view.threshold
//!                   ├─ balances(account)  ──▶ view.balance_staked
//!                   ├─ timeLeft()         ──▶ view.seconds_left
//!                   └─ completed()        ──▶ view.completed
//!                   (concurrent, each writes only its own field)
//! ```
//!
//! ## Core Principles
//!
//! - **Independent fields**: a failed, slow or hung read never blocks or
//!   corrupts the other three.
//! - **Stale beats broken**: a failed read keeps the previous value, is
//!   logged and counted. No retries.
//! - **Last write wins per field**: there is no cross-field atomicity.
//! - **No writes after teardown**: results arriving after the session closed
//!   are discarded.
//! - **One read per field in flight**: a pass skips a field whose read from an
//!   earlier pass has not answered yet. A read that never answers therefore
//!   pins one task, not one per trigger.
//!
//! ## Ordering
//!
//! Refreshes triggered close together still run concurrently, but since a
//! field is read by at most one pass at a time, an older pass can never
//! overwrite a newer pass's value of the same field.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use staker_common::{
    format_ether, Address, Amount, ContractError, ContractStateView, StakerReader, StateField,
};

use crate::metrics::DashboardMetrics;
use crate::shutdown::Shutdown;

// ════════════════════════════════════════════════════════════════════════════
// TRIGGER
// ════════════════════════════════════════════════════════════════════════════

/// Why a refresh pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Initial pass when the session starts.
    SessionStart,
    /// The account's native balance changed (coarse "something happened").
    BalanceChanged {
        previous: Option<Amount>,
        current: Amount,
    },
    /// Periodic timer tick.
    Timer,
    /// Explicit user request.
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStart => write!(f, "session start"),
            Self::BalanceChanged { previous, current } => match previous {
                Some(p) => write!(
                    f,
                    "balance changed {} -> {}",
                    format_ether(*p),
                    format_ether(*current)
                ),
                None => write!(f, "balance observed {}", format_ether(*current)),
            },
            Self::Timer => write!(f, "timer"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SYNC ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Per-field fetch failures. Never propagated beyond the refresh report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The read returned an error.
    #[error("fetch of {field} failed: {reason}")]
    FetchFailed {
        field: StateField,
        reason: ContractError,
    },

    /// The read did not answer within the configured timeout.
    #[error("fetch of {field} timed out after {timeout_ms} ms")]
    TimedOut { field: StateField, timeout_ms: u64 },
}

impl SyncError {
    pub fn field(&self) -> StateField {
        match self {
            Self::FetchFailed { field, .. } | Self::TimedOut { field, .. } => *field,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// REFRESH REPORT
// ════════════════════════════════════════════════════════════════════════════

/// What happened to each field during one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub trigger: SyncTrigger,
    /// Fields overwritten with a fresh value.
    pub updated: Vec<StateField>,
    /// Fields left at their previous value because the read failed.
    pub failed: Vec<SyncError>,
    /// Fields released by teardown before their result could be applied.
    pub discarded: Vec<StateField>,
    /// Fields not read because an earlier pass's read is still in flight.
    pub skipped: Vec<StateField>,
}

impl RefreshReport {
    fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            updated: Vec::new(),
            failed: Vec::new(),
            discarded: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// `true` if all four fields were updated.
    pub fn is_complete(&self) -> bool {
        self.updated.len() == StateField::ALL.len()
    }

    fn record(&mut self, outcome: FieldOutcome) {
        match outcome {
            FieldOutcome::Updated(field) => self.updated.push(field),
            FieldOutcome::Failed(err) => self.failed.push(err),
            FieldOutcome::Discarded(field) => self.discarded.push(field),
            FieldOutcome::Skipped(field) => self.skipped.push(field),
        }
    }
}

enum FieldOutcome {
    Updated(StateField),
    Failed(SyncError),
    Discarded(StateField),
    Skipped(StateField),
}

/// Marks a field as being read; released on drop, including when the
/// owning refresh task is aborted.
struct InFlight<'a> {
    fields: &'a Mutex<HashSet<StateField>>,
    field: StateField,
}

impl<'a> InFlight<'a> {
    fn claim(fields: &'a Mutex<HashSet<StateField>>, field: StateField) -> Option<Self> {
        // Built lazily: a guard that is never handed out must not release
        // another pass's claim on drop.
        let claimed = fields.lock().insert(field);
        claimed.then(|| Self { fields, field })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.fields.lock().remove(&self.field);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STATE SYNC ENGINE
// ════════════════════════════════════════════════════════════════════════════

/// Re-fetches the tracked contract fields into the shared view.
///
/// ## Lifecycle
///
/// 1. Create with `new(reader, account, view, shutdown, metrics)`
/// 2. Either call `refresh()` directly, or spawn `run()` with a trigger
///    channel
/// 3. Close the shared [`Shutdown`] to cancel in-flight reads
pub struct StateSyncEngine {
    reader: Arc<dyn StakerReader>,
    account: Address,
    view: Arc<RwLock<ContractStateView>>,
    shutdown: Arc<Shutdown>,
    metrics: Arc<DashboardMetrics>,
    fetch_timeout: Option<Duration>,
    in_flight: Mutex<HashSet<StateField>>,
}

impl StateSyncEngine {
    pub fn new(
        reader: Arc<dyn StakerReader>,
        account: Address,
        view: Arc<RwLock<ContractStateView>>,
        shutdown: Arc<Shutdown>,
        metrics: Arc<DashboardMetrics>,
    ) -> Self {
        Self {
            reader,
            account,
            view,
            shutdown,
            metrics,
            fetch_timeout: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Bounds every read; a timed-out read is handled like a failed one.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Fields whose read has not answered yet.
    pub fn reads_in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Copy of the current view.
    pub fn view(&self) -> ContractStateView {
        self.view.read().clone()
    }

    /// Explicit trigger entry point.
    pub async fn on_trigger(&self, trigger: SyncTrigger) -> RefreshReport {
        self.refresh(trigger).await
    }

    /// Fetches all four fields concurrently and applies each success as it
    /// lands.
    pub async fn refresh(&self, trigger: SyncTrigger) -> RefreshReport {
        let mut report = RefreshReport::new(trigger);
        if self.shutdown.is_closed() {
            report.discarded.extend(StateField::ALL);
            return report;
        }

        self.metrics.record_refresh();
        debug!("refresh ({})", trigger);

        let account = self.account;
        let (threshold, balance, time_left, completed) = tokio::join!(
            self.sync_field(StateField::Threshold, self.reader.threshold(), |v, x| {
                v.threshold = Some(x)
            }),
            self.sync_field(StateField::BalanceStaked, self.reader.balances(account), |v, x| {
                v.balance_staked = Some(x)
            }),
            self.sync_field(StateField::SecondsLeft, self.reader.time_left(), |v, x| {
                v.seconds_left = Some(x)
            }),
            self.sync_field(StateField::Completed, self.reader.completed(), |v, x| {
                v.completed = x
            }),
        );
        for outcome in [threshold, balance, time_left, completed] {
            report.record(outcome);
        }

        if !report.failed.is_empty() {
            info!(
                "refresh ({}) finished with {} stale field(s)",
                trigger,
                report.failed.len()
            );
        }
        report
    }

    /// Awaits one read and, on success, overwrites exactly its field.
    ///
    /// The read is not started if the same field is still being read.
    async fn sync_field<T, Fut, Apply>(
        &self,
        field: StateField,
        fetch: Fut,
        apply: Apply,
    ) -> FieldOutcome
    where
        Fut: Future<Output = Result<T, ContractError>>,
        Apply: FnOnce(&mut ContractStateView, T),
    {
        let Some(_claim) = InFlight::claim(&self.in_flight, field) else {
            debug!("{} still being read; skipped", field);
            return FieldOutcome::Skipped(field);
        };

        let bounded = async {
            match self.fetch_timeout {
                Some(limit) => match tokio::time::timeout(limit, fetch).await {
                    Ok(r) => r.map_err(|reason| SyncError::FetchFailed { field, reason }),
                    Err(_) => Err(SyncError::TimedOut {
                        field,
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
                None => fetch
                    .await
                    .map_err(|reason| SyncError::FetchFailed { field, reason }),
            }
        };

        // Teardown releases a fetch that is still in flight.
        let result = tokio::select! {
            _ = self.shutdown.closed() => {
                debug!("fetch of {} released by teardown", field);
                return FieldOutcome::Discarded(field);
            }
            result = bounded => result,
        };

        match result {
            Ok(value) => {
                let mut view = self.view.write();
                // Checked under the write lock: teardown fences on this lock.
                if self.shutdown.is_closed() {
                    debug!("discarding {} result after teardown", field);
                    return FieldOutcome::Discarded(field);
                }
                apply(&mut view, value);
                drop(view);
                self.metrics.record_fetch_success();
                FieldOutcome::Updated(field)
            }
            Err(err) => {
                if self.shutdown.is_closed() {
                    return FieldOutcome::Discarded(field);
                }
                warn!("{}; keeping last known value", err);
                self.metrics.record_fetch_failure();
                FieldOutcome::Failed(err)
            }
        }
    }

    /// Trigger loop: every received trigger starts its own refresh task, so
    /// a hung read in one pass never delays the next trigger.
    ///
    /// Returns when the session closes or all trigger senders are dropped;
    /// refreshes still in flight are aborted.
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<SyncTrigger>) {
        let mut in_flight: JoinSet<RefreshReport> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.closed() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => {
                        let engine = Arc::clone(&self);
                        in_flight.spawn(async move { engine.on_trigger(trigger).await });
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!("refresh task failed: {}", e);
                    }
                }
            }
        }

        in_flight.shutdown().await;
        debug!("sync trigger loop stopped");
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
