//! Record Buffer Abstraction
//!
//! Decouples decode throughput from write throughput. The writer only needs
//! push and a waiting pop; the queue technology behind it is pluggable.
//!
//! Implementations:
//! - `InMemoryBuffer`: FIFO with async wakeups, for tests and single-process use
//! - `SimulatedBuffer`: wraps another buffer and injects retrieval failures

mod memory;
mod simulated;

pub use memory::InMemoryBuffer;
pub use simulated::{SimulatedBuffer, SimulatedBufferConfig, SimulatedBufferStats};

use crate::metric::MetricRecord;
use std::future::Future;
use std::pin::Pin;

/// Error type for buffer operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Transient retrieval or storage failure; the caller may retry
    Unavailable(String),
    /// The buffer was closed and holds no more records
    Closed,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Unavailable(msg) => write!(f, "buffer unavailable: {}", msg),
            BufferError::Closed => write!(f, "buffer closed"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Blocking FIFO of normalized records
///
/// `pop` must be cancel-safe: dropping the future before it resolves must
/// not lose a record.
pub trait Buffer: Send + Sync + 'static {
    /// Enqueue a record
    fn push<'a>(
        &'a self,
        record: MetricRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), BufferError>> + Send + 'a>>;

    /// Wait for and remove the oldest record
    fn pop<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<MetricRecord, BufferError>> + Send + 'a>>;

    /// Number of records currently queued
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
