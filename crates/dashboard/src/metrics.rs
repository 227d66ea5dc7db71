//! Dashboard Metrics
//!
//! Lock-free counters for the sync, feed and submission paths.
//!
//! ## Metrics Tracked
//!
//! | Metric | Description |
//! |--------|-------------|
//! | refreshes | Refresh passes started |
//! | fetch_successes | Contract reads that updated a field |
//! | fetch_failures | Contract reads that failed or timed out |
//! | display_fetch_failures | Pool balance or price reads that failed |
//! | events_appended | Stake events added to the log |
//! | duplicates_dropped | Redelivered events discarded by identity |
//! | stream_errors | Event stream errors / disconnects |
//! | tx_submitted | Transactions accepted by the node |
//! | tx_confirmed | Transactions mined successfully |
//! | tx_failed | Transactions rejected, reverted or lost |
//!
//! Increments use `Ordering::Relaxed`; reads use `Ordering::SeqCst`.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = DashboardMetrics::new();
//! metrics.record_fetch_failure();
//! println!("{}", metrics.to_prometheus());
//! ```

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

// ════════════════════════════════════════════════════════════════════════════════
// DASHBOARD METRICS
// ════════════════════════════════════════════════════════════════════════════════

/// Counters shared by every dashboard component.
///
/// Only `AtomicU64` fields, so the struct is `Send + Sync` by construction.
#[derive(Debug, Default)]
pub struct DashboardMetrics {
    pub refreshes: AtomicU64,
    pub fetch_successes: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub display_fetch_failures: AtomicU64,
    pub events_appended: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub stream_errors: AtomicU64,
    pub tx_submitted: AtomicU64,
    pub tx_confirmed: AtomicU64,
    pub tx_failed: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub refreshes: u64,
    pub fetch_successes: u64,
    pub fetch_failures: u64,
    pub display_fetch_failures: u64,
    pub events_appended: u64,
    pub duplicates_dropped: u64,
    pub stream_errors: u64,
    pub tx_submitted: u64,
    pub tx_confirmed: u64,
    pub tx_failed: u64,
}

impl DashboardMetrics {
    /// All counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // INCREMENT METHODS
    // ════════════════════════════════════════════════════════════════════════════

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_success(&self) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_display_fetch_failure(&self) {
        self.display_fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_appended(&self) {
        self.events_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_submitted(&self) {
        self.tx_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_confirmed(&self) {
        self.tx_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_failed(&self) {
        self.tx_failed.fetch_add(1, Ordering::Relaxed);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // READ METHODS
    // ════════════════════════════════════════════════════════════════════════════

    /// Reads every counter with `SeqCst`.
    ///
    /// Not atomic across fields; each counter is read independently.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes: self.refreshes.load(Ordering::SeqCst),
            fetch_successes: self.fetch_successes.load(Ordering::SeqCst),
            fetch_failures: self.fetch_failures.load(Ordering::SeqCst),
            display_fetch_failures: self.display_fetch_failures.load(Ordering::SeqCst),
            events_appended: self.events_appended.load(Ordering::SeqCst),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::SeqCst),
            stream_errors: self.stream_errors.load(Ordering::SeqCst),
            tx_submitted: self.tx_submitted.load(Ordering::SeqCst),
            tx_confirmed: self.tx_confirmed.load(Ordering::SeqCst),
            tx_failed: self.tx_failed.load(Ordering::SeqCst),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // PROMETHEUS EXPORT
    // ════════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus exposition format.
    ///
    /// ```text
    /// # HELP staker_dashboard_refreshes_total Refresh passes started
    /// # TYPE staker_dashboard_refreshes_total counter
    /// staker_dashboard_refreshes_total 0
    /// ...
    /// ```
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let rows: [(&str, &str, u64); 10] = [
            ("refreshes_total", "Refresh passes started", s.refreshes),
            ("fetch_successes_total", "Contract reads that updated a field", s.fetch_successes),
            ("fetch_failures_total", "Contract reads that failed or timed out", s.fetch_failures),
            (
                "display_fetch_failures_total",
                "Pool balance or price reads that failed",
                s.display_fetch_failures,
            ),
            ("events_appended_total", "Stake events added to the log", s.events_appended),
            ("duplicates_dropped_total", "Redelivered events discarded", s.duplicates_dropped),
            ("stream_errors_total", "Event stream errors and disconnects", s.stream_errors),
            ("tx_submitted_total", "Transactions accepted by the node", s.tx_submitted),
            ("tx_confirmed_total", "Transactions mined successfully", s.tx_confirmed),
            ("tx_failed_total", "Transactions rejected, reverted or lost", s.tx_failed),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                "# HELP staker_dashboard_{name} {help}\n\
                 # TYPE staker_dashboard_{name} counter\n\
                 staker_dashboard_{name} {value}\n"
            );
        }
        out
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<DashboardMetrics>();
    }
    let _ = check;
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_all_zero() {
        assert_eq!(DashboardMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn increments_are_counted() {
        let m = DashboardMetrics::new();
        m.record_refresh();
        m.record_fetch_failure();
        m.record_fetch_failure();
        m.record_duplicate_dropped();
        m.record_tx_confirmed();

        let s = m.snapshot();
        assert_eq!(s.refreshes, 1);
        assert_eq!(s.fetch_failures, 2);
        assert_eq!(s.duplicates_dropped, 1);
        assert_eq!(s.tx_confirmed, 1);
        assert_eq!(s.tx_failed, 0);
    }

    #[test]
    fn prometheus_format() {
        let m = DashboardMetrics::new();
        m.record_event_appended();
        let text = m.to_prometheus();

        assert!(text.contains("# TYPE staker_dashboard_events_appended_total counter"));
        assert!(text.contains("staker_dashboard_events_appended_total 1\n"));
        assert!(text.contains("staker_dashboard_tx_failed_total 0\n"));
        assert_eq!(text.matches("# HELP").count(), 10);
    }
}
