//! Dashboard Session
//!
//! Owns the contract view and the event log for one connected account and
//! wires the engines around them.
//!
//! ## Task Layout
//!
//! ```text
//!  BalanceWatcher ─┐
//!  refresh timer  ─┼──▶ mpsc<SyncTrigger> ──▶ StateSyncEngine::run ──▶ view
//!  refresh_now()  ─┘
//!
//!  StakeEventSource ──▶ EventFeed follower ──▶ event log
//!
//!  PoolWatcher ──▶ pool balances, native price (display only)
//!
//!  execute / withdraw / send_ether / stake_fixed ──▶ TransactionSubmitter
//! ```
//!
//! The submitter never touches the view; a confirmed call changes the
//! account's native balance, which the watcher turns into a refresh.
//!
//! ## Teardown
//!
//! [`DashboardSession::shutdown`] closes the shared signal, fences on the
//! view locks so no write can land afterwards, stops the feed and waits for
//! every background task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use staker_common::{
    parse_nonzero_units, Address, Amount, BalanceProvider, ConfigError, ContractAddresses,
    ContractStateView, DashboardConfig, GasPriceOracle, GasTier, NameResolver, PriceFeed,
    SimulatedStaker, StakeEventRecord, StakeEventSource, StakerCall, StakerReader, StakerWriter,
};

use crate::duration::TimeBreakdown;
use crate::event_feed::{EventFeed, FeedError, FeedSettings};
use crate::metrics::DashboardMetrics;
use crate::pool::{fiat_value, PoolView, PoolWatcher};
use crate::shutdown::Shutdown;
use crate::state_sync::{RefreshReport, StateSyncEngine, SyncTrigger};
use crate::triggers::{run_timer, BalanceWatcher};
use crate::tx_submitter::{SubmitError, TransactionSubmitter, TxOutcome, TxStatus};

const TRIGGER_CHANNEL_CAPACITY: usize = 32;

// ════════════════════════════════════════════════════════════════════════════
// COLLABORATORS & SETTINGS
// ════════════════════════════════════════════════════════════════════════════

/// Externally provided chain access.
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn StakerReader>,
    /// `None` when no wallet is connected; writes then fail fast.
    pub writer: Option<Arc<dyn StakerWriter>>,
    pub gas_oracle: Arc<dyn GasPriceOracle>,
    pub balances: Arc<dyn BalanceProvider>,
    pub events: Arc<dyn StakeEventSource>,
    /// Display-only fiat conversion; `None` hides fiat values.
    pub prices: Option<Arc<dyn PriceFeed>>,
    /// Display-only address names; `None` shows raw addresses.
    pub names: Option<Arc<dyn NameResolver>>,
    pub contracts: ContractAddresses,
}

impl Collaborators {
    /// Everything backed by one in-memory chain, optionally signing as
    /// `signer`.
    pub fn simulated(chain: &SimulatedStaker, signer: Option<Address>) -> Self {
        let writer = signer.map(|from| Arc::new(chain.signer(from)) as Arc<dyn StakerWriter>);
        Self {
            reader: Arc::new(chain.clone()),
            writer,
            gas_oracle: Arc::new(chain.clone()),
            balances: Arc::new(chain.clone()),
            events: Arc::new(chain.clone()),
            prices: Some(Arc::new(chain.clone())),
            names: Some(Arc::new(chain.clone())),
            contracts: chain.addresses(),
        }
    }
}

/// Validated, typed session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub account: Address,
    pub gas_tier: GasTier,
    pub feed: FeedSettings,
    pub balance_poll_interval: Duration,
    pub refresh_interval: Option<Duration>,
    pub fetch_timeout: Option<Duration>,
    /// Value of the fixed stake action, smallest unit.
    pub stake_value: Amount,
    pub decimals: u8,
}

impl SessionSettings {
    pub fn from_config(config: &DashboardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            account: config.account_address()?,
            gas_tier: config.gas_tier,
            feed: FeedSettings {
                event_name: config.event_name.clone(),
                window: config.event_window,
                from_block: config.from_block,
                resubscribe_delay: config.resubscribe_delay(),
            },
            balance_poll_interval: config.balance_poll_interval(),
            refresh_interval: config.refresh_interval(),
            fetch_timeout: config.fetch_timeout(),
            stake_value: config.fixed_stake_value()?,
            decimals: config.decimals,
        })
    }
}

/// What the dashboard renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub view: ContractStateView,
    pub countdown: TimeBreakdown,
    /// Newest first.
    pub recent_events: Vec<StakeEventRecord>,
    /// Pooled stake, external balance and native price.
    pub pool: PoolView,
    /// USD value of `view.balance_staked`, when both it and a price are known.
    pub your_staked_usd: Option<f64>,
}

// ════════════════════════════════════════════════════════════════════════════
// SESSION
// ════════════════════════════════════════════════════════════════════════════

pub struct DashboardSession {
    settings: SessionSettings,
    view: Arc<RwLock<ContractStateView>>,
    pool: Arc<RwLock<PoolView>>,
    names: Option<Arc<dyn NameResolver>>,
    contracts: ContractAddresses,
    engine: Arc<StateSyncEngine>,
    feed: EventFeed,
    submitter: TransactionSubmitter,
    triggers: mpsc::Sender<SyncTrigger>,
    shutdown: Arc<Shutdown>,
    metrics: Arc<DashboardMetrics>,
    tasks: Vec<JoinHandle<()>>,
}

impl DashboardSession {
    /// Subscribes to events, spawns the background tasks and queues the
    /// initial sync. Must be called inside a tokio runtime.
    pub fn start(collaborators: Collaborators, settings: SessionSettings) -> Result<Self, FeedError> {
        let shutdown = Arc::new(Shutdown::new());
        let metrics = Arc::new(DashboardMetrics::new());
        let view = Arc::new(RwLock::new(ContractStateView::default()));
        let pool = Arc::new(RwLock::new(PoolView::default()));

        let feed = EventFeed::subscribe(
            collaborators.events,
            settings.feed.clone(),
            Arc::clone(&metrics),
        )?;

        let engine = Arc::new(
            StateSyncEngine::new(
                collaborators.reader,
                settings.account,
                Arc::clone(&view),
                Arc::clone(&shutdown),
                Arc::clone(&metrics),
            )
            .with_fetch_timeout(settings.fetch_timeout),
        );

        let submitter = TransactionSubmitter::new(
            collaborators.writer,
            collaborators.gas_oracle,
            settings.gas_tier,
            Arc::clone(&metrics),
        );

        let (triggers, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        let mut tasks = vec![tokio::spawn(Arc::clone(&engine).run(trigger_rx))];

        let pool_watcher = PoolWatcher::new(
            Arc::clone(&collaborators.balances),
            collaborators.prices,
            collaborators.contracts,
            Arc::clone(&pool),
            Arc::clone(&shutdown),
            Arc::clone(&metrics),
        )
        .with_fetch_timeout(settings.fetch_timeout);
        tasks.push(tokio::spawn(
            pool_watcher.run(settings.balance_poll_interval),
        ));

        let watcher = BalanceWatcher::new(
            collaborators.balances,
            settings.account,
            settings.balance_poll_interval,
        );
        tasks.push(tokio::spawn(
            watcher.run(triggers.clone(), Arc::clone(&shutdown)),
        ));

        if let Some(period) = settings.refresh_interval {
            tasks.push(tokio::spawn(run_timer(
                period,
                triggers.clone(),
                Arc::clone(&shutdown),
            )));
        }

        if let Err(e) = triggers.try_send(SyncTrigger::SessionStart) {
            warn!("initial sync not queued: {}", e);
        }

        info!(
            "dashboard session started for {} (tier {})",
            settings.account, settings.gas_tier
        );

        Ok(Self {
            settings,
            view,
            pool,
            names: collaborators.names,
            contracts: collaborators.contracts,
            engine,
            feed,
            submitter,
            triggers,
            shutdown,
            metrics,
            tasks,
        })
    }

    pub fn account(&self) -> Address {
        self.settings.account
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<DashboardMetrics> {
        &self.metrics
    }

    pub fn view(&self) -> ContractStateView {
        self.view.read().clone()
    }

    pub fn pool(&self) -> PoolView {
        *self.pool.read()
    }

    pub fn contracts(&self) -> ContractAddresses {
        self.contracts
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let view = self.view();
        let pool = self.pool();
        let your_staked_usd = match (view.balance_staked, pool.native_price_usd) {
            (Some(staked), Some(price)) => fiat_value(staked, self.settings.decimals, price),
            _ => None,
        };
        DashboardSnapshot {
            countdown: TimeBreakdown::from_observed(view.seconds_left),
            view,
            recent_events: self.feed.newest_first(),
            pool,
            your_staked_usd,
        }
    }

    /// Registered name of `address`, or the address itself when there is no
    /// resolver, no name, or the lookup fails.
    pub async fn display_name(&self, address: Address) -> String {
        let Some(names) = self.names.as_ref() else {
            return address.to_string();
        };
        match names.lookup_name(address).await {
            Ok(Some(name)) => name,
            Ok(None) => address.to_string(),
            Err(e) => {
                debug!("name lookup for {} failed: {}", address, e);
                address.to_string()
            }
        }
    }

    /// Sender for additional trigger sources.
    pub fn trigger_sender(&self) -> mpsc::Sender<SyncTrigger> {
        self.triggers.clone()
    }

    /// Runs a manual refresh and waits for it.
    pub async fn refresh_now(&self) -> RefreshReport {
        self.engine.on_trigger(SyncTrigger::Manual).await
    }

    /// Transaction lifecycle updates.
    pub fn tx_updates(&self) -> broadcast::Receiver<TxStatus> {
        self.submitter.updates()
    }

    // ── actions ─────────────────────────────────────────────────────────

    pub async fn execute(&self) -> Result<TxOutcome, SubmitError> {
        self.submitter.submit(StakerCall::Execute).await
    }

    /// Withdraws the session account's stake.
    pub async fn withdraw(&self) -> Result<TxOutcome, SubmitError> {
        self.submitter
            .submit(StakerCall::Withdraw {
                account: self.settings.account,
            })
            .await
    }

    /// Sends a user-entered amount as a plain transfer. Empty, malformed
    /// and zero amounts are refused before anything is dispatched.
    pub async fn send_ether(&self, input: &str) -> Result<TxOutcome, SubmitError> {
        let value = parse_nonzero_units(input, self.settings.decimals)?;
        self.submitter
            .submit(StakerCall::TransferEther { value })
            .await
    }

    /// Stakes the configured fixed amount.
    pub async fn stake_fixed(&self) -> Result<TxOutcome, SubmitError> {
        self.submitter
            .submit(StakerCall::Stake {
                value: self.settings.stake_value,
            })
            .await
    }

    /// Tears the session down and waits for its tasks.
    pub async fn shutdown(mut self) {
        self.shutdown.close();
        // Any write that passed its closed-check finishes before this returns.
        drop(self.view.write());
        drop(self.pool.write());

        self.feed.stop().await;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("session task failed: {}", e);
            }
        }
        debug!("dashboard session for {} stopped", self.settings.account);
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.shutdown.close();
    }
}
