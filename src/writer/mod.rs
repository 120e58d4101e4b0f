//! Batch Writing
//!
//! Pulls records out of the buffer and commits them to the sink in bulk.
//! See [`BatchWriter`] for the task layout and shutdown order.

mod batch;
mod batch_writer;
mod config;
pub mod dst;
mod stats;

pub use batch::{Batch, BatchAccumulator};
pub use batch_writer::{spawn_batch_writer, BatchWriter, BatchWriterHandle};
pub use config::{WriterConfig, MAX_BULK_MAX, MAX_CONCURRENCY, MAX_PIPE_CAPACITY};
pub use stats::{WriterStats, WriterStatsSnapshot};
