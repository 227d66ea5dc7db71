//! Pool Watcher
//!
//! Display-only figures shown next to the contract view:
//!
//! | Figure | Source |
//! |--------|--------|
//! | total staked | native balance of the staking contract |
//! | external balance | native balance of the contract that receives the pool |
//! | native price | [`PriceFeed`], for the fiat value of the account's stake |
//!
//! Each figure is polled independently on its own interval, the way the
//! dashboard's balance widgets refresh themselves. A failed read keeps the
//! last value. None of these figures feed back into [`ContractStateView`].
//!
//! [`ContractStateView`]: staker_common::ContractStateView

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use staker_common::{
    format_units, Amount, BalanceProvider, ContractAddresses, ContractError, PriceFeed,
};

use crate::metrics::DashboardMetrics;
use crate::shutdown::Shutdown;

/// Last known display figures; `None` until first read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolView {
    /// Pooled stake held by the staking contract.
    pub total_staked: Option<Amount>,
    /// Balance of the external contract; the completed pool ends up here.
    pub external_balance: Option<Amount>,
    /// USD per whole native token.
    pub native_price_usd: Option<f64>,
}

/// USD value of `amount` at `price`. Display only; not exact.
pub fn fiat_value(amount: Amount, decimals: u8, price: f64) -> Option<f64> {
    let whole: f64 = format_units(amount, decimals).parse().ok()?;
    Some(whole * price)
}

/// Polls the pool balances and the price into a shared [`PoolView`].
pub struct PoolWatcher {
    balances: Arc<dyn BalanceProvider>,
    prices: Option<Arc<dyn PriceFeed>>,
    contracts: ContractAddresses,
    view: Arc<RwLock<PoolView>>,
    shutdown: Arc<Shutdown>,
    metrics: Arc<DashboardMetrics>,
    fetch_timeout: Option<Duration>,
}

impl PoolWatcher {
    pub fn new(
        balances: Arc<dyn BalanceProvider>,
        prices: Option<Arc<dyn PriceFeed>>,
        contracts: ContractAddresses,
        view: Arc<RwLock<PoolView>>,
        shutdown: Arc<Shutdown>,
        metrics: Arc<DashboardMetrics>,
    ) -> Self {
        Self {
            balances,
            prices,
            contracts,
            view,
            shutdown,
            metrics,
            fetch_timeout: None,
        }
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn view(&self) -> PoolView {
        *self.view.read()
    }

    /// Reads every figure once, concurrently. Returns how many were updated.
    pub async fn poll_once(&self) -> usize {
        let price = async {
            match &self.prices {
                Some(feed) => {
                    self.read("native price", feed.native_price_usd(), |v, p| {
                        v.native_price_usd = Some(p)
                    })
                    .await
                }
                None => false,
            }
        };

        let (staked, external, price) = tokio::join!(
            self.read(
                "total staked",
                self.balances.balance_of(self.contracts.staker),
                |v, x| v.total_staked = Some(x),
            ),
            self.read(
                "external balance",
                self.balances.balance_of(self.contracts.external),
                |v, x| v.external_balance = Some(x),
            ),
            price,
        );
        [staked, external, price].into_iter().filter(|u| *u).count()
    }

    async fn read<T, Fut, Apply>(&self, what: &str, fetch: Fut, apply: Apply) -> bool
    where
        Fut: Future<Output = Result<T, ContractError>>,
        Apply: FnOnce(&mut PoolView, T),
    {
        let bounded = async {
            match self.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(ContractError::Timeout)),
                None => fetch.await,
            }
        };

        let result = tokio::select! {
            _ = self.shutdown.closed() => return false,
            result = bounded => result,
        };

        match result {
            Ok(value) => {
                let mut view = self.view.write();
                if self.shutdown.is_closed() {
                    return false;
                }
                apply(&mut view, value);
                true
            }
            Err(e) => {
                if !self.shutdown.is_closed() {
                    warn!("{} read failed: {}; keeping last value", what, e);
                    self.metrics.record_display_fetch_failure();
                }
                false
            }
        }
    }

    /// Polls every `interval` until the session closes.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.closed() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        debug!("pool watcher stopped");
    }
}
