//! Batch Writer Integration Tests
//!
//! Flush triggers, shutdown ordering and failure accounting against the
//! in-memory buffer and sink.

use metrics_capacitor::buffer::{
    Buffer, InMemoryBuffer, SimulatedBuffer, SimulatedBufferConfig,
};
use metrics_capacitor::sink::InMemorySink;
use metrics_capacitor::writer::{spawn_batch_writer, BatchWriter, WriterConfig};
use metrics_capacitor::MetricRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

const HOUR: Duration = Duration::from_secs(3600);

fn record(i: usize) -> MetricRecord {
    MetricRecord::new(format!("m{}", i), UNIX_EPOCH, i as f64, BTreeMap::new()).unwrap()
}

fn config(concurrency: usize, bulk_max: usize, flush_interval: Duration) -> WriterConfig {
    WriterConfig {
        concurrency,
        bulk_max,
        flush_interval,
        pipe_factor: 2,
    }
}

async fn fill(buffer: &impl Buffer, n: usize) {
    for i in 0..n {
        buffer.push(record(i)).await.unwrap();
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_flush_at_bulk_max_before_interval() {
    let buffer = Arc::new(InMemoryBuffer::new());
    let sink = Arc::new(InMemorySink::new());
    let shutdown = CancellationToken::new();
    let (_handle, task) = spawn_batch_writer(config(1, 5, HOUR), buffer.clone(), sink.clone(), &shutdown);

    fill(buffer.as_ref(), 5).await;
    wait_until(|| sink.batches().len() == 1).await;
    assert_eq!(sink.batches()[0].len(), 5);

    shutdown.cancel();
    let stats = task.await.unwrap();
    assert_eq!(stats.batches_flushed, 1);
    assert_eq!(stats.records_committed, 5);
}

#[tokio::test]
async fn test_flush_after_interval_with_fewer_records() {
    let buffer = Arc::new(InMemoryBuffer::new());
    let sink = Arc::new(InMemorySink::new());
    let shutdown = CancellationToken::new();
    let (_handle, task) = spawn_batch_writer(
        config(2, 1000, Duration::from_millis(50)),
        buffer.clone(),
        sink.clone(),
        &shutdown,
    );

    fill(buffer.as_ref(), 3).await;
    wait_until(|| sink.record_count() == 3).await;

    shutdown.cancel();
    let stats = task.await.unwrap();
    assert_eq!(stats.records_committed, 3);
}

#[tokio::test]
async fn test_shutdown_flushes_partial_batch_and_closes_sink() {
    let buffer = Arc::new(InMemoryBuffer::new());
    let sink = Arc::new(InMemorySink::new());
    let shutdown = CancellationToken::new();
    let (handle, task) = spawn_batch_writer(config(2, 100, HOUR), buffer.clone(), sink.clone(), &shutdown);

    fill(buffer.as_ref(), 7).await;
    wait_until(|| handle.stats().records_popped == 7).await;
    assert_eq!(sink.record_count(), 0);

    shutdown.cancel();
    let stats = task.await.unwrap();
    assert_eq!(stats.records_committed, 7);
    assert_eq!(sink.record_count(), 7);
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_cancellation_interrupts_blocked_pop() {
    let buffer = Arc::new(InMemoryBuffer::new());
    let sink = Arc::new(InMemorySink::new());
    let shutdown = CancellationToken::new();
    let (_handle, task) = spawn_batch_writer(config(4, 10, HOUR), buffer.clone(), sink.clone(), &shutdown);

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("writer should stop promptly")
        .unwrap();
    assert_eq!(stats.records_popped, 0);
    assert!(sink.is_closed());

    // Nothing was consumed after shutdown
    buffer.push(record(0)).await.unwrap();
    assert_eq!(buffer.len(), 1);
}

#[tokio::test]
async fn test_pop_errors_are_counted_and_retried() {
    let config_faults = SimulatedBufferConfig {
        pop_fail_prob: 0.5,
        push_fail_prob: 0.0,
    };
    let buffer = Arc::new(SimulatedBuffer::new(InMemoryBuffer::new(), 42, config_faults));
    fill(buffer.inner(), 20).await;
    buffer.inner().close();

    let sink = Arc::new(InMemorySink::new());
    let writer = BatchWriter::new(config(2, 8, HOUR), buffer.clone(), sink.clone());
    let stats = writer.run(CancellationToken::new()).await;

    assert_eq!(stats.records_committed, 20);
    assert!(stats.pop_errors > 0);
    assert_eq!(stats.pop_errors, buffer.stats().pop_failures);
    assert_eq!(sink.record_count(), 20);
}

#[tokio::test]
async fn test_partial_failures_counted_not_resubmitted() {
    let buffer = Arc::new(InMemoryBuffer::new());
    fill(buffer.as_ref(), 10).await;
    buffer.close();

    let sink = Arc::new(InMemorySink::with_rejections(|r| {
        r.name() == "m3" || r.name() == "m7"
    }));
    let writer = BatchWriter::new(config(1, 5, HOUR), buffer, sink.clone());
    let stats = writer.run(CancellationToken::new()).await;

    assert_eq!(stats.batches_flushed, 2);
    assert_eq!(stats.records_committed, 8);
    assert_eq!(stats.records_failed, 2);
    assert_eq!(sink.record_count(), 8);
    assert_eq!(stats.records_settled(), stats.records_popped);
}

#[tokio::test]
async fn test_transport_failure_discards_batch() {
    let buffer = Arc::new(InMemoryBuffer::new());
    fill(buffer.as_ref(), 10).await;
    buffer.close();

    let sink = Arc::new(InMemorySink::new());
    sink.fail_next_submits(1);
    let writer = BatchWriter::new(config(1, 5, HOUR), buffer, sink.clone());
    let stats = writer.run(CancellationToken::new()).await;

    assert_eq!(stats.submit_errors, 1);
    assert_eq!(stats.records_lost, 5);
    assert_eq!(stats.records_committed, 5);
    assert_eq!(sink.batches().len(), 1);
    assert_eq!(sink.record_count(), 5);
}

#[tokio::test]
async fn test_schema_check_then_create_is_idempotent() {
    let sink = Arc::new(InMemorySink::new());

    for _ in 0..3 {
        let buffer = Arc::new(InMemoryBuffer::new());
        buffer.close();
        let writer = BatchWriter::new(config(1, 5, HOUR), buffer, sink.clone());
        writer.run(CancellationToken::new()).await;
    }

    assert_eq!(sink.schema_creates(), 1);
}
