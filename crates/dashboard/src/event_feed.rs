//! Event Feed
//!
//! Follows the contract's `Stake` events and keeps a bounded, ordered log of
//! the most recent ones.
//!
//! ## Log Semantics
//!
//! ```text
//! arrival ──▶ [ oldest ... newest ] ──▶ evicted when full
//!                 (capacity = window)
//! ```
//!
//! - Records are kept in arrival order, newest at the tail. The feed never
//!   sorts by block number.
//! - A record whose `(block_number, sender, amount)` triple was already
//!   seen is dropped, even after it has been evicted. The log remembers the
//!   last `window * SEEN_HISTORY_FACTOR` identities for this. Redeliveries
//!   after a resubscription or a reorg collapse this way. Two genuinely
//!   identical stakes in one block are indistinguishable by that key and
//!   also collapse.
//! - Once the log is closed nothing is appended.
//!
//! ## Recovery
//!
//! When the stream yields an error or ends, the follower waits the
//! resubscribe delay and subscribes again from the block of the newest
//! retained record (or the configured start block). Replays, including
//! already evicted records of that block, are removed by the identity check.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use staker_common::{
    format_ether, ContractError, StakeEventRecord, StakeEventSource, StakeEventStream,
};

use crate::metrics::DashboardMetrics;
use crate::shutdown::Shutdown;

/// Identities remembered per retained record.
pub const SEEN_HISTORY_FACTOR: usize = 8;

// ════════════════════════════════════════════════════════════════════════════
// FEED ERROR
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// A window of zero records cannot hold anything.
    #[error("event window must hold at least one record")]
    ZeroWindow,

    /// The initial subscription was refused.
    #[error("subscription failed: {0}")]
    Subscribe(#[from] ContractError),
}

// ════════════════════════════════════════════════════════════════════════════
// STAKE EVENT LOG
// ════════════════════════════════════════════════════════════════════════════

/// Result of offering a record to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Added at the tail; `evicted` is the oldest record if the log was full.
    Appended { evicted: Option<StakeEventRecord> },
    /// Already seen; dropped.
    Duplicate,
    /// The log is closed; dropped.
    Closed,
}

/// Fixed-capacity, arrival-ordered event log.
#[derive(Debug, Clone)]
pub struct StakeEventLog {
    records: VecDeque<StakeEventRecord>,
    capacity: usize,
    seen: HashSet<StakeEventRecord>,
    seen_order: VecDeque<StakeEventRecord>,
    closed: bool,
}

impl StakeEventLog {
    pub fn new(capacity: usize) -> Result<Self, FeedError> {
        if capacity == 0 {
            return Err(FeedError::ZeroWindow);
        }
        Ok(Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            closed: false,
        })
    }

    pub fn push(&mut self, record: StakeEventRecord) -> AppendOutcome {
        if self.closed {
            return AppendOutcome::Closed;
        }
        if !self.seen.insert(record) {
            return AppendOutcome::Duplicate;
        }
        self.seen_order.push_back(record);
        if self.seen_order.len() > self.seen_limit() {
            if let Some(forgotten) = self.seen_order.pop_front() {
                self.seen.remove(&forgotten);
            }
        }

        let evicted = if self.records.len() == self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        AppendOutcome::Appended { evicted }
    }

    /// Stops accepting records. Retained records stay readable.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> Vec<StakeEventRecord> {
        self.records.iter().copied().collect()
    }

    /// Retained records, newest first, for display.
    pub fn newest_first(&self) -> Vec<StakeEventRecord> {
        self.records.iter().rev().copied().collect()
    }

    /// Most recently arrived record.
    pub fn newest(&self) -> Option<StakeEventRecord> {
        self.records.back().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn seen_limit(&self) -> usize {
        self.capacity.saturating_mul(SEEN_HISTORY_FACTOR)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// EVENT FEED
// ════════════════════════════════════════════════════════════════════════════

/// Settings of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub event_name: String,
    pub window: usize,
    pub from_block: u64,
    pub resubscribe_delay: Duration,
}

/// Live subscription feeding a [`StakeEventLog`].
///
/// ## Lifecycle
///
/// 1. `subscribe()` opens the stream and spawns the follower task
/// 2. Read the log through `log()`, `records()` or `newest_first()`
/// 3. `stop()` closes the log, ends the task and waits for it
pub struct EventFeed {
    log: Arc<RwLock<StakeEventLog>>,
    shutdown: Arc<Shutdown>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventFeed {
    /// Opens the subscription and starts following it.
    ///
    /// Fails if the window is zero or the source refuses the first
    /// subscription (e.g. unknown event name). Later stream failures are
    /// recovered from in the background.
    pub fn subscribe(
        source: Arc<dyn StakeEventSource>,
        settings: FeedSettings,
        metrics: Arc<DashboardMetrics>,
    ) -> Result<Self, FeedError> {
        let log = Arc::new(RwLock::new(StakeEventLog::new(settings.window)?));
        let stream = source.subscribe(&settings.event_name, settings.from_block)?;
        info!(
            "subscribed to {} events from block {} (window {})",
            settings.event_name, settings.from_block, settings.window
        );

        let shutdown = Arc::new(Shutdown::new());
        let follower = Follower {
            source,
            settings,
            log: Arc::clone(&log),
            shutdown: Arc::clone(&shutdown),
            metrics,
        };
        let task = tokio::spawn(follower.run(stream));

        Ok(Self {
            log,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn log(&self) -> &Arc<RwLock<StakeEventLog>> {
        &self.log
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> Vec<StakeEventRecord> {
        self.log.read().records()
    }

    /// Retained records, newest first.
    pub fn newest_first(&self) -> Vec<StakeEventRecord> {
        self.log.read().newest_first()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_closed()
    }

    /// Releases the subscription. No record is appended once this returns.
    ///
    /// Safe to call more than once.
    pub async fn stop(&self) {
        self.log.write().close();
        self.shutdown.close();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("event follower task failed: {}", e);
            }
        }
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.log.write().close();
        self.shutdown.close();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FOLLOWER TASK
// ════════════════════════════════════════════════════════════════════════════

struct Follower {
    source: Arc<dyn StakeEventSource>,
    settings: FeedSettings,
    log: Arc<RwLock<StakeEventLog>>,
    shutdown: Arc<Shutdown>,
    metrics: Arc<DashboardMetrics>,
}

impl Follower {
    async fn run(self, first: StakeEventStream) {
        let mut stream = Some(first);

        loop {
            let mut current = match stream.take() {
                Some(s) => s,
                None => {
                    if !self.pause().await {
                        break;
                    }
                    let from_block = self.resume_block();
                    match self.source.subscribe(&self.settings.event_name, from_block) {
                        Ok(s) => {
                            info!(
                                "resubscribed to {} events from block {}",
                                self.settings.event_name, from_block
                            );
                            s
                        }
                        Err(e) => {
                            warn!("resubscription failed: {}", e);
                            self.metrics.record_stream_error();
                            continue;
                        }
                    }
                }
            };

            let reconnect = loop {
                tokio::select! {
                    _ = self.shutdown.closed() => break false,
                    item = current.next() => match item {
                        Some(Ok(record)) => self.accept(record),
                        Some(Err(e)) => {
                            warn!("event stream error: {}", e);
                            self.metrics.record_stream_error();
                            break true;
                        }
                        None => {
                            warn!("event stream ended");
                            self.metrics.record_stream_error();
                            break true;
                        }
                    },
                }
            };

            if !reconnect {
                break;
            }
        }

        debug!("event follower stopped");
    }

    fn accept(&self, record: StakeEventRecord) {
        let outcome = self.log.write().push(record);
        match outcome {
            AppendOutcome::Appended { evicted } => {
                self.metrics.record_event_appended();
                debug!(
                    "stake by {} of {} at block {}",
                    record.sender,
                    format_ether(record.amount),
                    record.block_number
                );
                if let Some(old) = evicted {
                    debug!("evicted event from block {}", old.block_number);
                }
            }
            AppendOutcome::Duplicate => {
                self.metrics.record_duplicate_dropped();
                debug!("dropped duplicate event from block {}", record.block_number);
            }
            AppendOutcome::Closed => {}
        }
    }

    /// Waits the resubscribe delay. `false` if the feed stopped meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.closed() => false,
            _ = tokio::time::sleep(self.settings.resubscribe_delay) => true,
        }
    }

    fn resume_block(&self) -> u64 {
        self.log
            .read()
            .newest()
            .map(|r| r.block_number)
            .unwrap_or(self.settings.from_block)
            .max(self.settings.from_block)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use staker_common::{Address, Amount, SimulatedStaker, STAKE_EVENT};

    fn rec(block: u64, sender: u8, amount: u64) -> StakeEventRecord {
        StakeEventRecord {
            block_number: block,
            sender: Address::from([sender; 20]),
            amount: Amount::from(amount),
        }
    }

    fn settings(window: usize) -> FeedSettings {
        FeedSettings {
            event_name: STAKE_EVENT.to_string(),
            window,
            from_block: 1,
            resubscribe_delay: Duration::from_millis(10),
        }
    }

    async fn wait_for_len(feed: &EventFeed, len: usize) {
        for _ in 0..200 {
            if feed.log().read().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("feed never reached {} records", len);
    }

    // ── Test 1: arrival order is kept ───────────────────────────────────

    #[test]
    fn log_keeps_arrival_order() {
        let mut log = StakeEventLog::new(10).unwrap_or_else(|e| panic!("{}", e));
        for b in [10, 12, 11] {
            log.push(rec(b, 1, 5));
        }
        let blocks: Vec<u64> = log.records().iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![10, 12, 11]);
        let newest: Vec<u64> = log.newest_first().iter().map(|r| r.block_number).collect();
        assert_eq!(newest, vec![11, 12, 10]);
    }

    // ── Test 2: repeated triple yields one record ───────────────────────

    #[test]
    fn log_drops_duplicate_triple() {
        let mut log = StakeEventLog::new(10).unwrap_or_else(|e| panic!("{}", e));
        assert!(matches!(log.push(rec(5, 1, 7)), AppendOutcome::Appended { evicted: None }));
        assert_eq!(log.push(rec(5, 1, 7)), AppendOutcome::Duplicate);
        // Any differing component is a different record.
        log.push(rec(5, 1, 8));
        log.push(rec(5, 2, 7));
        log.push(rec(6, 1, 7));
        assert_eq!(log.len(), 4);
    }

    // ── Test 3: oldest is evicted first ─────────────────────────────────

    #[test]
    fn log_evicts_oldest_when_full() {
        let mut log = StakeEventLog::new(2).unwrap_or_else(|e| panic!("{}", e));
        log.push(rec(1, 1, 1));
        log.push(rec(2, 1, 1));
        assert_eq!(
            log.push(rec(3, 1, 1)),
            AppendOutcome::Appended { evicted: Some(rec(1, 1, 1)) }
        );
        assert_eq!(log.records(), vec![rec(2, 1, 1), rec(3, 1, 1)]);
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn log_drops_replay_of_evicted_record() {
        let mut log = StakeEventLog::new(2).unwrap_or_else(|e| panic!("{}", e));
        for b in [1, 2, 3] {
            log.push(rec(b, 1, 1));
        }
        assert_eq!(log.push(rec(1, 1, 1)), AppendOutcome::Duplicate);
        let newest: Vec<u64> = log.newest_first().iter().map(|r| r.block_number).collect();
        assert_eq!(newest, vec![3, 2]);
    }

    #[test]
    fn log_seen_history_is_bounded() {
        let mut log = StakeEventLog::new(1).unwrap_or_else(|e| panic!("{}", e));
        let limit = SEEN_HISTORY_FACTOR as u64;
        for b in 1..=limit + 1 {
            log.push(rec(b, 1, 1));
        }
        assert_eq!(log.seen.len(), SEEN_HISTORY_FACTOR);
        // Block 1 fell out of the history; block 2 is still remembered.
        assert_eq!(log.push(rec(2, 1, 1)), AppendOutcome::Duplicate);
        assert!(matches!(log.push(rec(1, 1, 1)), AppendOutcome::Appended { .. }));
    }

    #[test]
    fn log_rejects_zero_window_and_closed_appends() {
        assert!(matches!(StakeEventLog::new(0), Err(FeedError::ZeroWindow)));

        let mut log = StakeEventLog::new(3).unwrap_or_else(|e| panic!("{}", e));
        log.push(rec(1, 1, 1));
        log.close();
        assert_eq!(log.push(rec(2, 1, 1)), AppendOutcome::Closed);
        assert_eq!(log.len(), 1);
    }

    // ── Test 4: live feed keeps delivery order and dedups ───────────────

    #[tokio::test]
    async fn feed_follows_stream() {
        let chain = SimulatedStaker::new(Amount::from(1u64), 30);
        let metrics = Arc::new(DashboardMetrics::new());
        let feed = EventFeed::subscribe(Arc::new(chain.clone()), settings(5), Arc::clone(&metrics))
            .unwrap_or_else(|e| panic!("subscribe: {}", e));

        chain.push_event(rec(10, 1, 5));
        chain.push_event(rec(12, 2, 5));
        chain.push_event(rec(12, 2, 5));
        chain.push_event(rec(11, 3, 5));
        wait_for_len(&feed, 3).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let blocks: Vec<u64> = feed.records().iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![10, 12, 11]);
        let snap = metrics.snapshot();
        assert_eq!(snap.events_appended, 3);
        assert_eq!(snap.duplicates_dropped, 1);

        feed.stop().await;
    }

    // ── Test 5: nothing is appended after stop ──────────────────────────

    #[tokio::test]
    async fn no_append_after_stop() {
        let chain = SimulatedStaker::new(Amount::from(1u64), 30);
        let feed = EventFeed::subscribe(
            Arc::new(chain.clone()),
            settings(5),
            Arc::new(DashboardMetrics::new()),
        )
        .unwrap_or_else(|e| panic!("subscribe: {}", e));

        chain.push_event(rec(2, 1, 1));
        wait_for_len(&feed, 1).await;

        feed.stop().await;
        feed.stop().await;
        assert!(!feed.is_running());

        chain.push_event(rec(3, 1, 1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feed.records(), vec![rec(2, 1, 1)]);
    }

    // ── Test 6: stream errors are recovered from ────────────────────────

    #[tokio::test]
    async fn resubscribes_after_stream_error() {
        let chain = SimulatedStaker::new(Amount::from(1u64), 30);
        let metrics = Arc::new(DashboardMetrics::new());
        let feed = EventFeed::subscribe(Arc::new(chain.clone()), settings(5), Arc::clone(&metrics))
            .unwrap_or_else(|e| panic!("subscribe: {}", e));

        chain.push_event(rec(2, 1, 1));
        wait_for_len(&feed, 1).await;

        chain.inject_stream_errors(1);
        chain.push_event(rec(4, 1, 1));
        wait_for_len(&feed, 2).await;

        assert_eq!(feed.records(), vec![rec(2, 1, 1), rec(4, 1, 1)]);
        let snap = metrics.snapshot();
        assert_eq!(snap.stream_errors, 1);
        assert_eq!(chain.subscriptions(), 2);
        // The resubscription replays block 2; it is dropped by identity.
        assert_eq!(snap.duplicates_dropped, 1);

        feed.stop().await;
    }

    #[tokio::test]
    async fn unknown_event_is_refused() {
        let chain = SimulatedStaker::new(Amount::from(1u64), 30);
        let mut s = settings(5);
        s.event_name = "Withdraw".to_string();
        let res = EventFeed::subscribe(Arc::new(chain), s, Arc::new(DashboardMetrics::new()));
        assert!(matches!(
            res,
            Err(FeedError::Subscribe(ContractError::UnknownEvent(_)))
        ));
    }

    #[tokio::test]
    async fn zero_window_is_refused_before_subscribing() {
        let chain = SimulatedStaker::new(Amount::from(1u64), 30);
        let res = EventFeed::subscribe(
            Arc::new(chain.clone()),
            settings(0),
            Arc::new(DashboardMetrics::new()),
        );
        assert!(matches!(res, Err(FeedError::ZeroWindow)));
        assert_eq!(chain.subscriptions(), 0);
    }
}
