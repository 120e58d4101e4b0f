//! Batch Writer
//!
//! Drains the buffer into the sink in bulk.
//!
//! ```text
//! Buffer ──pop──► drain worker ×N ──► pipe ──► batching loop ──► flush task ×N ──► Sink
//! ```
//!
//! Delivery is at-most-once: a batch that fails in transport is logged and
//! dropped, never resubmitted.
//!
//! Shutdown order on cancellation: drain workers stop popping and exit,
//! which closes the pipe; the batching loop drains what is left in the pipe,
//! flushes the partial batch, waits for in-flight flushes and closes the sink.

use super::batch::{Batch, BatchAccumulator};
use super::config::WriterConfig;
use super::stats::{WriterStats, WriterStatsSnapshot};
use crate::buffer::{Buffer, BufferError};
use crate::metric::MetricRecord;
use crate::sink::Sink;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Moves records from a [`Buffer`] to a [`Sink`] in batches
pub struct BatchWriter<B: Buffer + ?Sized, S: Sink + ?Sized> {
    config: WriterConfig,
    buffer: Arc<B>,
    sink: Arc<S>,
    stats: Arc<WriterStats>,
}

impl<B: Buffer + ?Sized, S: Sink + ?Sized> BatchWriter<B, S> {
    pub fn new(config: WriterConfig, buffer: Arc<B>, sink: Arc<S>) -> Self {
        BatchWriter {
            config,
            buffer,
            sink,
            stats: Arc::new(WriterStats::new()),
        }
    }

    /// Shared counters, live while the writer runs
    pub fn stats(&self) -> Arc<WriterStats> {
        self.stats.clone()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Create the destination schema unless it already exists. Failures are
    /// logged; writing proceeds either way.
    pub async fn ensure_schema(&self) {
        match self.sink.schema_exists().await {
            Ok(true) => debug!("Sink schema already present"),
            Ok(false) => match self.sink.create_schema().await {
                Ok(()) => info!("Created sink schema"),
                Err(e) => error!("Failed to create sink schema: {}", e),
            },
            Err(e) => error!("Failed to check sink schema: {}", e),
        }
    }

    /// Run until `shutdown` fires (or the buffer closes) and everything
    /// popped has been flushed. Returns the final statistics.
    pub async fn run(self, shutdown: CancellationToken) -> WriterStatsSnapshot {
        self.ensure_schema().await;

        let concurrency = self.config.concurrency.max(1);
        let (pipe_tx, mut pipe_rx) = mpsc::channel(self.config.pipe_capacity());

        let mut drains = JoinSet::new();
        for worker_id in 0..concurrency {
            drains.spawn(drain_worker(
                worker_id,
                self.buffer.clone(),
                pipe_tx.clone(),
                self.stats.clone(),
                shutdown.clone(),
            ));
        }
        // The pipe closes once every drain worker has exited
        drop(pipe_tx);

        info!(
            "Batch writer started: concurrency={}, bulk_max={}, flush_interval={:?}",
            concurrency, self.config.bulk_max, self.config.flush_interval
        );

        let flush_slots = Arc::new(Semaphore::new(concurrency));
        let mut flushes = JoinSet::new();
        let mut accumulator =
            BatchAccumulator::new(self.config.bulk_max.max(1), self.config.flush_interval);

        loop {
            tokio::select! {
                received = pipe_rx.recv() => match received {
                    Some(record) => {
                        if let Some(batch) = accumulator.add(record) {
                            self.dispatch(batch, &flush_slots, &mut flushes).await;
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(accumulator.deadline()) => {
                    if let Some(batch) = accumulator.take() {
                        debug!("Flush interval elapsed with {} records pending", batch.len());
                        self.dispatch(batch, &flush_slots, &mut flushes).await;
                    }
                }
            }
        }

        if let Some(batch) = accumulator.take() {
            debug!("Flushing final partial batch of {} records", batch.len());
            self.dispatch(batch, &flush_slots, &mut flushes).await;
        }

        while let Some(result) = drains.join_next().await {
            if let Err(e) = result {
                error!("Drain worker failed: {}", e);
            }
        }
        while let Some(result) = flushes.join_next().await {
            if let Err(e) = result {
                error!("Flush task failed: {}", e);
            }
        }

        if let Err(e) = self.sink.close().await {
            error!("Failed to close sink: {}", e);
        }

        let snapshot = self.stats.snapshot();
        info!(
            "Batch writer stopped: popped={}, committed={}, failed={}, lost={}",
            snapshot.records_popped,
            snapshot.records_committed,
            snapshot.records_failed,
            snapshot.records_lost
        );
        snapshot
    }

    /// Hand a batch to the flush pool, waiting for a free slot
    async fn dispatch(&self, batch: Batch, slots: &Arc<Semaphore>, flushes: &mut JoinSet<()>) {
        while let Some(result) = flushes.try_join_next() {
            if let Err(e) = result {
                error!("Flush task failed: {}", e);
            }
        }

        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Flush pool unavailable, dropping batch {}: {}", batch.id, e);
                self.stats.record_lost(batch.len() as u64);
                return;
            }
        };

        let sink = self.sink.clone();
        let stats = self.stats.clone();
        flushes.spawn(async move {
            let _permit = permit;
            flush_batch(&*sink, &stats, batch).await;
        });
    }
}

/// Pop records until cancelled or the buffer closes, forwarding each to the pipe
async fn drain_worker<B: Buffer + ?Sized>(
    worker_id: usize,
    buffer: Arc<B>,
    pipe: mpsc::Sender<MetricRecord>,
    stats: Arc<WriterStats>,
    shutdown: CancellationToken,
) {
    debug!("Drain worker {} started", worker_id);
    loop {
        let popped = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            popped = buffer.pop() => popped,
        };

        match popped {
            Ok(record) => {
                stats.record_popped();
                // Already popped: finish the hand-off even if shutdown fires meanwhile
                if pipe.send(record).await.is_err() {
                    error!("Batching loop gone, drain worker {} dropping record", worker_id);
                    stats.record_lost(1);
                    break;
                }
            }
            Err(BufferError::Closed) => {
                debug!("Buffer closed, drain worker {} exiting", worker_id);
                break;
            }
            Err(e) => {
                stats.record_pop_error();
                warn!("Failed to pop record from buffer: {}", e);
                tokio::task::yield_now().await;
            }
        }
    }
    debug!("Drain worker {} stopped", worker_id);
}

/// Submit one batch, bracketed by the before/after commit hooks
async fn flush_batch<S: Sink + ?Sized>(sink: &S, stats: &WriterStats, batch: Batch) {
    let started = Instant::now();
    before_commit(&batch);

    let outcome = sink.submit(&batch.records).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(outcome) => {
            stats.record_flush(outcome.succeeded, outcome.failed);
            if outcome.failed > 0 {
                warn!(
                    "Batch {} partially failed: {} of {} records refused",
                    batch.id,
                    outcome.failed,
                    batch.len()
                );
            }
            info!(
                "Batch {} committed {} records ({} failed) in {:?}",
                batch.id, outcome.succeeded, outcome.failed, elapsed
            );
        }
        Err(e) => {
            stats.record_submit_error(batch.len() as u64);
            error!(
                alert = true,
                "Batch {} submission failed after {:?}, {} records discarded: {}",
                batch.id,
                elapsed,
                batch.len(),
                e
            );
        }
    }
}

fn before_commit(batch: &Batch) {
    debug!("Committing batch {} with {} records", batch.id, batch.len());
}

/// Handle to a spawned [`BatchWriter`]
#[derive(Clone)]
pub struct BatchWriterHandle {
    shutdown: CancellationToken,
    stats: Arc<WriterStats>,
}

impl BatchWriterHandle {
    /// Stop popping and flush what is left. Await the join handle for the
    /// final statistics.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Spawn a batch writer and return its handle + join handle
///
/// The writer stops when `shutdown` or the handle's own `shutdown()` fires.
pub fn spawn_batch_writer<B, S>(
    config: WriterConfig,
    buffer: Arc<B>,
    sink: Arc<S>,
    shutdown: &CancellationToken,
) -> (BatchWriterHandle, JoinHandle<WriterStatsSnapshot>)
where
    B: Buffer + ?Sized,
    S: Sink + ?Sized,
{
    let writer = BatchWriter::new(config, buffer, sink);
    let token = shutdown.child_token();
    let handle = BatchWriterHandle {
        shutdown: token.clone(),
        stats: writer.stats(),
    };
    let task = tokio::spawn(writer.run(token));
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InMemoryBuffer;
    use crate::sink::InMemorySink;
    use std::collections::BTreeMap;
    use std::time::{Duration, UNIX_EPOCH};

    fn record(i: usize) -> MetricRecord {
        MetricRecord::new(format!("m{}", i), UNIX_EPOCH, i as f64, BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_closed_buffer_drains_and_stops() {
        let buffer = Arc::new(InMemoryBuffer::new());
        for i in 0..25 {
            buffer.push(record(i)).await.unwrap();
        }
        buffer.close();

        let sink = Arc::new(InMemorySink::new());
        let writer = BatchWriter::new(WriterConfig::test(), buffer, sink.clone());
        let stats = writer.run(CancellationToken::new()).await;

        assert_eq!(stats.records_popped, 25);
        assert_eq!(stats.records_committed, 25);
        assert_eq!(sink.record_count(), 25);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_once() {
        let sink = Arc::new(InMemorySink::new());
        let writer = BatchWriter::new(WriterConfig::test(), Arc::new(InMemoryBuffer::new()), sink.clone());
        writer.ensure_schema().await;
        writer.ensure_schema().await;
        assert_eq!(sink.schema_creates(), 1);
    }

    #[tokio::test]
    async fn test_handle_shutdown_stops_writer() {
        let buffer = Arc::new(InMemoryBuffer::new());
        let sink = Arc::new(InMemorySink::new());
        let root = CancellationToken::new();
        let (handle, task) = spawn_batch_writer(WriterConfig::test(), buffer.clone(), sink.clone(), &root);

        buffer.push(record(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.shutdown();
        assert!(handle.is_shutting_down());
        assert!(!root.is_cancelled());

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("writer should stop")
            .unwrap();
        assert_eq!(stats.records_committed, 1);
        assert!(sink.is_closed());
    }
}
