//! Refresh trigger sources.
//!
//! The contract state is re-read whenever the account's native balance
//! changes, used as a coarse "something happened" signal. [`BalanceWatcher`]
//! polls a [`BalanceProvider`] and emits [`SyncTrigger::BalanceChanged`];
//! [`run_timer`] optionally adds periodic [`SyncTrigger::Timer`] ticks.
//!
//! Both loops stop when the session's [`Shutdown`] closes or the trigger
//! receiver goes away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use staker_common::{Address, Amount, BalanceProvider};

use crate::shutdown::Shutdown;
use crate::state_sync::SyncTrigger;

/// Emits a trigger whenever the observed balance differs from the last one.
///
/// The first successful observation also triggers, since the initial value
/// is itself a change from "unknown".
pub struct BalanceWatcher {
    provider: Arc<dyn BalanceProvider>,
    account: Address,
    interval: Duration,
    last: Option<Amount>,
}

impl BalanceWatcher {
    pub fn new(provider: Arc<dyn BalanceProvider>, account: Address, interval: Duration) -> Self {
        Self {
            provider,
            account,
            interval,
            last: None,
        }
    }

    /// Last observed balance.
    pub fn last(&self) -> Option<Amount> {
        self.last
    }

    /// Reads the balance once. Returns a trigger if it changed.
    ///
    /// A failed read is logged and yields nothing; the last value is kept.
    pub async fn poll_once(&mut self) -> Option<SyncTrigger> {
        match self.provider.balance_of(self.account).await {
            Ok(current) if self.last != Some(current) => {
                let previous = self.last.replace(current);
                Some(SyncTrigger::BalanceChanged { previous, current })
            }
            Ok(_) => None,
            Err(e) => {
                warn!("balance poll for {} failed: {}", self.account, e);
                None
            }
        }
    }

    pub async fn run(mut self, triggers: mpsc::Sender<SyncTrigger>, shutdown: Arc<Shutdown>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.closed() => break,
                _ = ticker.tick() => {
                    let Some(trigger) = self.poll_once().await else {
                        continue;
                    };
                    debug!("{}", trigger);
                    if triggers.send(trigger).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("balance watcher stopped");
    }
}

/// Sends a [`SyncTrigger::Timer`] every `period`. The first tick fires one
/// full period after start.
pub async fn run_timer(
    period: Duration,
    triggers: mpsc::Sender<SyncTrigger>,
    shutdown: Arc<Shutdown>,
) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.closed() => break,
            _ = ticker.tick() => {
                if triggers.send(SyncTrigger::Timer).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("refresh timer stopped");
}
