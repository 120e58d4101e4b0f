//! Batch Writer DST Harness
//!
//! Runs the full writer pipeline against a fault-injecting buffer and sink
//! and checks the accounting invariant:
//!
//! - every pushed record is either still buffered or was popped
//! - every popped record is committed, refused, or lost with its batch
//! - the sink holds exactly the committed records, each at most once

use super::{BatchWriter, WriterConfig, WriterStatsSnapshot};
use crate::buffer::{Buffer, InMemoryBuffer, SimulatedBuffer, SimulatedBufferConfig, SimulatedBufferStats};
use crate::metric::MetricRecord;
use crate::simulation::DeterministicRng;
use crate::sink::{InMemorySink, SimulatedSink, SimulatedSinkConfig, SimulatedSinkStats};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Result of a single DST run
#[derive(Debug, Clone)]
pub struct WriterDSTResult {
    pub seed: u64,
    pub records_pushed: u64,
    pub records_left_in_buffer: u64,
    pub stats: WriterStatsSnapshot,
    pub buffer_stats: SimulatedBufferStats,
    pub sink_stats: SimulatedSinkStats,
    pub passed: bool,
    pub error_message: Option<String>,
}

/// DST configuration
#[derive(Debug, Clone)]
pub struct WriterDSTConfig {
    /// Records pushed per run, drawn from this range
    pub records: (u64, u64),
    pub writer: WriterConfig,
    pub buffer: SimulatedBufferConfig,
    pub sink: SimulatedSinkConfig,
    /// Cancel the writer part-way through instead of letting it drain
    pub cancel_early: bool,
}

impl Default for WriterDSTConfig {
    fn default() -> Self {
        WriterDSTConfig {
            records: (50, 500),
            writer: WriterConfig {
                concurrency: 3,
                bulk_max: 16,
                flush_interval: Duration::from_millis(5),
                pipe_factor: 2,
            },
            buffer: SimulatedBufferConfig::default(),
            sink: SimulatedSinkConfig::default(),
            cancel_early: false,
        }
    }
}

impl WriterDSTConfig {
    /// No faults, full drain
    pub fn baseline() -> Self {
        WriterDSTConfig {
            buffer: SimulatedBufferConfig::no_faults(),
            sink: SimulatedSinkConfig::no_faults(),
            ..Default::default()
        }
    }

    /// Heavy buffer and sink faults
    pub fn chaos() -> Self {
        WriterDSTConfig {
            buffer: SimulatedBufferConfig {
                pop_fail_prob: 0.2,
                push_fail_prob: 0.0,
            },
            sink: SimulatedSinkConfig::high_chaos(),
            ..Default::default()
        }
    }
}

/// Run one seed
pub async fn run_writer_dst(seed: u64, config: WriterDSTConfig) -> WriterDSTResult {
    let mut rng = DeterministicRng::new(seed);
    let count = rng.gen_range(config.records.0, config.records.1.max(config.records.0 + 1));

    let buffer = Arc::new(SimulatedBuffer::new(
        InMemoryBuffer::new(),
        seed.wrapping_add(1),
        config.buffer.clone(),
    ));
    let sink = Arc::new(SimulatedSink::new(
        InMemorySink::new(),
        seed.wrapping_add(2),
        config.sink.clone(),
    ));

    for i in 0..count {
        let record = match MetricRecord::new(format!("m{}", i), UNIX_EPOCH, i as f64, BTreeMap::new()) {
            Ok(record) => record,
            Err(e) => return failed(seed, count, format!("record build failed: {}", e)),
        };
        // Pushes go straight to the inner queue so only pops see faults
        if let Err(e) = buffer.inner().push(record).await {
            return failed(seed, count, format!("push failed: {}", e));
        }
    }

    let shutdown = CancellationToken::new();
    if config.cancel_early {
        let delay = Duration::from_micros(rng.gen_range(0, 2_000));
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.cancel();
        });
    } else {
        buffer.inner().close();
    }

    let writer = BatchWriter::new(config.writer.clone(), buffer.clone(), sink.clone());
    let stats = writer.run(shutdown).await;
    // After an early cancel the buffer may still hold records; close it for good
    buffer.inner().close();

    let left = buffer.len() as u64;
    let stored = sink.inner().records();
    let mut result = WriterDSTResult {
        seed,
        records_pushed: count,
        records_left_in_buffer: left,
        stats,
        buffer_stats: buffer.stats(),
        sink_stats: sink.stats(),
        passed: true,
        error_message: None,
    };

    if let Err(msg) = check_invariants(&result, &stored) {
        result.passed = false;
        result.error_message = Some(msg);
    }
    result
}

fn check_invariants(result: &WriterDSTResult, stored: &[MetricRecord]) -> Result<(), String> {
    let stats = &result.stats;

    if stats.records_popped + result.records_left_in_buffer != result.records_pushed {
        return Err(format!(
            "popped {} + buffered {} != pushed {}",
            stats.records_popped, result.records_left_in_buffer, result.records_pushed
        ));
    }
    if stats.records_settled() != stats.records_popped {
        return Err(format!(
            "settled {} (committed {} + failed {} + lost {}) != popped {}",
            stats.records_settled(),
            stats.records_committed,
            stats.records_failed,
            stats.records_lost,
            stats.records_popped
        ));
    }
    if stored.len() as u64 != stats.records_committed {
        return Err(format!(
            "sink holds {} records but {} were committed",
            stored.len(),
            stats.records_committed
        ));
    }
    if stats.records_lost != result.sink_stats.records_lost {
        return Err(format!(
            "writer counted {} lost, sink dropped {}",
            stats.records_lost, result.sink_stats.records_lost
        ));
    }
    if stats.pop_errors != result.buffer_stats.pop_failures {
        return Err(format!(
            "writer counted {} pop errors, buffer injected {}",
            stats.pop_errors, result.buffer_stats.pop_failures
        ));
    }

    let mut seen = HashSet::with_capacity(stored.len());
    for record in stored {
        if !seen.insert(record.name()) {
            return Err(format!("record {} committed twice", record.name()));
        }
    }
    Ok(())
}

fn failed(seed: u64, pushed: u64, msg: String) -> WriterDSTResult {
    WriterDSTResult {
        seed,
        records_pushed: pushed,
        records_left_in_buffer: 0,
        stats: WriterStatsSnapshot::default(),
        buffer_stats: SimulatedBufferStats::default(),
        sink_stats: SimulatedSinkStats::default(),
        passed: false,
        error_message: Some(msg),
    }
}

/// Run a range of seeds one after another
pub async fn run_writer_dst_batch(
    seeds: std::ops::Range<u64>,
    config: WriterDSTConfig,
) -> Vec<WriterDSTResult> {
    let mut results = Vec::with_capacity(seeds.clone().count());
    for seed in seeds {
        results.push(run_writer_dst(seed, config.clone()).await);
    }
    results
}

pub fn summarize_writer_dst_batch(results: &[WriterDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    let pushed: u64 = results.iter().map(|r| r.records_pushed).sum();
    let committed: u64 = results.iter().map(|r| r.stats.records_committed).sum();
    let refused: u64 = results.iter().map(|r| r.stats.records_failed).sum();
    let lost: u64 = results.iter().map(|r| r.stats.records_lost).sum();
    let pop_errors: u64 = results.iter().map(|r| r.stats.pop_errors).sum();

    let mut summary = format!(
        "Writer DST Batch: {}/{} passed ({} failed)\n\
         Pushed: {}, Committed: {}, Refused: {}, Lost: {}, Pop errors: {}",
        passed, total, failed, pushed, committed, refused, lost, pop_errors
    );

    if failed > 0 {
        summary.push_str("\n\nFailed seeds:");
        for r in results.iter().filter(|r| !r.passed) {
            summary.push_str(&format!(
                "\n  Seed {}: {}",
                r.seed,
                r.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_baseline_commits_everything() {
        let result = run_writer_dst(7, WriterDSTConfig::baseline()).await;
        assert!(result.passed, "{:?}", result.error_message);
        assert_eq!(result.stats.records_committed, result.records_pushed);
        assert_eq!(result.records_left_in_buffer, 0);
    }

    #[tokio::test]
    async fn test_chaos_single_seed() {
        let result = run_writer_dst(3, WriterDSTConfig::chaos()).await;
        assert!(result.passed, "{:?}", result.error_message);
    }
}
