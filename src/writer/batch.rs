//! Batch accumulation
//!
//! Records pile up until either the batch holds `bulk_max` of them or the
//! flush interval has elapsed since the last flush. Deadlines are tokio
//! instants so the batching loop can `sleep_until` them.

use crate::metric::MetricRecord;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on the slots reserved up front for a batch; larger batches
/// grow on demand
const MAX_PREALLOCATED: usize = 4096;

/// A sealed batch ready for submission
#[derive(Debug)]
pub struct Batch {
    /// Monotonic id, for correlating flush logs
    pub id: u64,
    pub records: Vec<MetricRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owned by the batching loop alone
pub struct BatchAccumulator {
    records: Vec<MetricRecord>,
    bulk_max: usize,
    flush_interval: Duration,
    last_flush: Instant,
    next_id: u64,
}

impl BatchAccumulator {
    pub fn new(bulk_max: usize, flush_interval: Duration) -> Self {
        BatchAccumulator {
            records: Vec::with_capacity(bulk_max.min(MAX_PREALLOCATED)),
            bulk_max,
            flush_interval,
            last_flush: Instant::now(),
            next_id: 0,
        }
    }

    /// Add a record. Returns the sealed batch once it reaches `bulk_max`.
    pub fn add(&mut self, record: MetricRecord) -> Option<Batch> {
        self.records.push(record);
        if self.records.len() >= self.bulk_max {
            self.take()
        } else {
            None
        }
    }

    /// Seal whatever is accumulated. The interval restarts even when there
    /// is nothing to seal.
    pub fn take(&mut self) -> Option<Batch> {
        self.last_flush = Instant::now();
        if self.records.is_empty() {
            return None;
        }
        let fresh = Vec::with_capacity(self.bulk_max.min(MAX_PREALLOCATED));
        let records = std::mem::replace(&mut self.records, fresh);
        let id = self.next_id;
        self.next_id += 1;
        Some(Batch { id, records })
    }

    /// When the next time-triggered flush is due
    pub fn deadline(&self) -> Instant {
        self.last_flush + self.flush_interval
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
