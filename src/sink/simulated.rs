//! Simulated Sink with Fault Injection
//!
//! Wraps another sink. Each submission may fail outright (transport error,
//! nothing stored) and each record of a surviving submission may be refused
//! individually. All decisions come from one seeded RNG.

use super::{Sink, SinkError, SubmitOutcome};
use crate::metric::MetricRecord;
use crate::simulation::DeterministicRng;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Configuration for simulated sink faults
#[derive(Debug, Clone)]
pub struct SimulatedSinkConfig {
    /// Probability that a whole submission fails in transport
    pub submit_fail_prob: f64,
    /// Probability that an individual record is refused
    pub record_reject_prob: f64,
}

impl Default for SimulatedSinkConfig {
    fn default() -> Self {
        SimulatedSinkConfig {
            submit_fail_prob: 0.05,    // 5%
            record_reject_prob: 0.01,  // 1%
        }
    }
}

impl SimulatedSinkConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedSinkConfig {
            submit_fail_prob: 0.25,
            record_reject_prob: 0.1,
        }
    }

    pub fn no_faults() -> Self {
        SimulatedSinkConfig {
            submit_fail_prob: 0.0,
            record_reject_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedSinkStats {
    pub submit_attempts: u64,
    pub submit_failures: u64,
    /// Records in batches that failed in transport
    pub records_lost: u64,
    pub records_rejected: u64,
    pub records_accepted: u64,
}

struct SimulatedSinkState {
    rng: DeterministicRng,
    stats: SimulatedSinkStats,
}

/// Sink wrapper that injects seeded failures
pub struct SimulatedSink<S: Sink> {
    inner: S,
    config: SimulatedSinkConfig,
    state: Arc<Mutex<SimulatedSinkState>>,
}

impl<S: Sink> SimulatedSink<S> {
    pub fn new(inner: S, seed: u64, config: SimulatedSinkConfig) -> Self {
        SimulatedSink {
            inner,
            config,
            state: Arc::new(Mutex::new(SimulatedSinkState {
                rng: DeterministicRng::new(seed),
                stats: SimulatedSinkStats::default(),
            })),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> SimulatedSinkStats {
        self.state.lock().stats.clone()
    }

    /// Decide the fate of a batch: `None` on transport failure, otherwise the
    /// records that survive per-record rejection.
    fn roll(&self, batch: &[MetricRecord]) -> Option<Vec<MetricRecord>> {
        let mut state = self.state.lock();
        state.stats.submit_attempts += 1;

        if state.rng.gen_bool(self.config.submit_fail_prob) {
            state.stats.submit_failures += 1;
            state.stats.records_lost += batch.len() as u64;
            return None;
        }

        let mut kept = Vec::with_capacity(batch.len());
        for record in batch {
            if state.rng.gen_bool(self.config.record_reject_prob) {
                state.stats.records_rejected += 1;
            } else {
                kept.push(record.clone());
            }
        }
        Some(kept)
    }
}

impl<S: Sink> Sink for SimulatedSink<S> {
    fn schema_exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, SinkError>> + Send + '_>> {
        self.inner.schema_exists()
    }

    fn create_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        self.inner.create_schema()
    }

    fn submit<'a>(
        &'a self,
        batch: &'a [MetricRecord],
    ) -> Pin<Box<dyn Future<Output = Result<SubmitOutcome, SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let kept = match self.roll(batch) {
                Some(kept) => kept,
                None => return Err(SinkError::Transport("simulated submit failure".to_string())),
            };
            let rejected = (batch.len() - kept.len()) as u64;

            let mut outcome = self.inner.submit(&kept).await?;
            outcome.failed += rejected;
            self.state.lock().stats.records_accepted += outcome.succeeded;
            Ok(outcome)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        self.inner.close()
    }
}
