//! Simulated Buffer with Fault Injection
//!
//! Wraps another buffer and fails a seeded fraction of pops and pushes. A
//! failed pop never consumes a record, so the wrapped queue stays intact.

use super::{Buffer, BufferError};
use crate::metric::MetricRecord;
use crate::simulation::DeterministicRng;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Configuration for simulated buffer faults
#[derive(Debug, Clone)]
pub struct SimulatedBufferConfig {
    /// Probability that a pop fails before touching the queue
    pub pop_fail_prob: f64,
    /// Probability that a push fails before touching the queue
    pub push_fail_prob: f64,
}

impl Default for SimulatedBufferConfig {
    fn default() -> Self {
        SimulatedBufferConfig {
            pop_fail_prob: 0.05,  // 5%
            push_fail_prob: 0.0,
        }
    }
}

impl SimulatedBufferConfig {
    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedBufferConfig {
            pop_fail_prob: 0.0,
            push_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedBufferStats {
    pub pop_attempts: u64,
    pub pop_failures: u64,
    pub push_attempts: u64,
    pub push_failures: u64,
}

struct SimulatedBufferState {
    rng: DeterministicRng,
    stats: SimulatedBufferStats,
}

/// Buffer wrapper that injects seeded failures
pub struct SimulatedBuffer<B: Buffer> {
    inner: B,
    config: SimulatedBufferConfig,
    state: Arc<Mutex<SimulatedBufferState>>,
}

impl<B: Buffer> SimulatedBuffer<B> {
    pub fn new(inner: B, seed: u64, config: SimulatedBufferConfig) -> Self {
        SimulatedBuffer {
            inner,
            config,
            state: Arc::new(Mutex::new(SimulatedBufferState {
                rng: DeterministicRng::new(seed),
                stats: SimulatedBufferStats::default(),
            })),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn stats(&self) -> SimulatedBufferStats {
        self.state.lock().stats.clone()
    }

    fn should_fail_pop(&self) -> bool {
        let mut state = self.state.lock();
        state.stats.pop_attempts += 1;
        let fail = state.rng.gen_bool(self.config.pop_fail_prob);
        if fail {
            state.stats.pop_failures += 1;
        }
        fail
    }

    fn should_fail_push(&self) -> bool {
        let mut state = self.state.lock();
        state.stats.push_attempts += 1;
        let fail = state.rng.gen_bool(self.config.push_fail_prob);
        if fail {
            state.stats.push_failures += 1;
        }
        fail
    }
}

impl<B: Buffer> Buffer for SimulatedBuffer<B> {
    fn push<'a>(
        &'a self,
        record: MetricRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), BufferError>> + Send + 'a>> {
        Box::pin(async move {
            if self.should_fail_push() {
                return Err(BufferError::Unavailable("simulated push failure".to_string()));
            }
            self.inner.push(record).await
        })
    }

    fn pop<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<MetricRecord, BufferError>> + Send + 'a>> {
        Box::pin(async move {
            if self.should_fail_pop() {
                return Err(BufferError::Unavailable("simulated pop failure".to_string()));
            }
            self.inner.pop().await
        })
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
