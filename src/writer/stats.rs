//! Writer statistics
//!
//! Counters are bumped from drain workers and flush tasks concurrently.
//! Every popped record ends up in exactly one of `records_committed`,
//! `records_failed` or `records_lost` once the writer has stopped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct WriterStats {
    records_popped: AtomicU64,
    pop_errors: AtomicU64,
    batches_flushed: AtomicU64,
    records_committed: AtomicU64,
    records_failed: AtomicU64,
    records_lost: AtomicU64,
    submit_errors: AtomicU64,
}

/// Point-in-time copy of [`WriterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStatsSnapshot {
    pub records_popped: u64,
    pub pop_errors: u64,
    pub batches_flushed: u64,
    pub records_committed: u64,
    /// Records the sink refused individually
    pub records_failed: u64,
    /// Records in batches whose submission failed in transport
    pub records_lost: u64,
    pub submit_errors: u64,
}

impl WriterStatsSnapshot {
    /// Records that reached a final outcome
    pub fn records_settled(&self) -> u64 {
        self.records_committed + self.records_failed + self.records_lost
    }
}

impl WriterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_popped(&self) {
        self.records_popped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pop_error(&self) {
        self.pop_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, committed: u64, failed: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.records_committed.fetch_add(committed, Ordering::Relaxed);
        self.records_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Popped records that never made it into a batch
    pub(crate) fn record_lost(&self, lost: u64) {
        self.records_lost.fetch_add(lost, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_error(&self, lost: u64) {
        self.submit_errors.fetch_add(1, Ordering::Relaxed);
        self.records_lost.fetch_add(lost, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            records_popped: self.records_popped.load(Ordering::Relaxed),
            pop_errors: self.pop_errors.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_lost: self.records_lost.load(Ordering::Relaxed),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
        }
    }
}
