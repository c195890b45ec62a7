//! Pipeline counters for the oracle node.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated metrics for the poller and dispatcher.
///
/// Thread-safe via atomics; shared via `Arc<Metrics>`.
#[derive(Default)]
pub struct Metrics {
    /// Raw logs returned by the coordinator filter.
    pub logs_seen: AtomicU64,
    /// `RandomnessRequest` events addressed to this oracle.
    pub requests_matched: AtomicU64,
    /// `RandomnessRequest` events for other oracles.
    pub requests_foreign: AtomicU64,
    /// Matched requests skipped because the ledger already has them.
    pub requests_duplicate: AtomicU64,
    /// Fulfillments accepted by the node.
    pub requests_fulfilled: AtomicU64,
    /// Fulfillments recorded with `failed` status.
    pub requests_failed: AtomicU64,
    /// Poll iterations that ended in an error.
    pub poll_errors: AtomicU64,
    /// Next block the poller will scan.
    pub checkpoint: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_logs(&self, count: usize) {
        self.logs_seen.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.requests_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign(&self) {
        self.requests_foreign.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.requests_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fulfillment(&self) {
        self.requests_fulfilled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the checkpoint. Never moves it backwards.
    pub fn set_checkpoint(&self, next_block: u64) {
        self.checkpoint.fetch_max(next_block, Ordering::Relaxed);
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "logs_seen": self.logs_seen.load(Ordering::Relaxed),
            "requests_matched": self.requests_matched.load(Ordering::Relaxed),
            "requests_foreign": self.requests_foreign.load(Ordering::Relaxed),
            "requests_duplicate": self.requests_duplicate.load(Ordering::Relaxed),
            "requests_fulfilled": self.requests_fulfilled.load(Ordering::Relaxed),
            "requests_failed": self.requests_failed.load(Ordering::Relaxed),
            "poll_errors": self.poll_errors.load(Ordering::Relaxed),
            "checkpoint": self.checkpoint.load(Ordering::Relaxed),
        })
    }
}
