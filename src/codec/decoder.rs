//! Line Decoder
//!
//! Translates text lines into [`MetricRecord`]s. Two grammars share a single
//! anchored pattern; which named groups matched decides the form:
//!
//! ```text
//! Graphite:  <path> <value> [<timestamp>]      servers.web01.load 0.42 1700000000
//! Influx:    <name>,<k=v>[,<k=v>...] <value>   load,host=web01 value=0.42
//! ```
//!
//! Lines matching neither grammar are dropped without an error. Lines that
//! match but carry a bad value or resolve to no name produce a
//! [`DecodeError`].
//!
//! ## Concurrency
//!
//! ```text
//! input ──► reader ──► line queue ──► worker 1 ──┐──► records
//!                                 ──► worker N ──┘──► errors
//! ```
//!
//! Both output channels close once every line read has been decoded.
//! Callers must drain both receivers concurrently.

use crate::clock::{Clock, SystemClock};
use crate::codec::config::DecoderConfig;
use crate::codec::error::DecodeError;
use crate::codec::mutator::{Mutation, PathMutator};
use crate::codec::rules::MutatorRules;
use crate::codec::timestamp::parse_timestamp;
use crate::metric::MetricRecord;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const LINE_PATTERN: &str = concat!(
    r"^(?:",
    r"(?P<path>[A-Za-z0-9_.\-]+) (?P<value>\S+)(?: (?P<timestamp>[0-9]{10,}))?",
    r"|",
    r"(?P<name>[A-Za-z0-9_.\-]+),(?P<fields>\S*) (?:value=)?(?P<tag_value>\S+)",
    r")$",
);

/// Queued lines per decode worker
const LINE_QUEUE_PER_WORKER: usize = 16;

/// Counts for one `decode` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeSummary {
    /// Lines read from the input and queued for decoding
    pub lines: u64,
    /// Records delivered
    pub records: u64,
    /// Decode errors delivered
    pub errors: u64,
    /// Empty or non-matching lines
    pub dropped: u64,
    /// Records or errors whose receiver was already gone
    pub undelivered: u64,
}

#[derive(Debug, Default)]
struct DecodeCounters {
    lines: AtomicU64,
    records: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    undelivered: AtomicU64,
}

impl DecodeCounters {
    fn summary(&self) -> DecodeSummary {
        DecodeSummary {
            lines: self.lines.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }
}

/// Output of [`LineDecoder::decode`]
pub struct DecodeStreams {
    pub records: mpsc::Receiver<MetricRecord>,
    pub errors: mpsc::Receiver<DecodeError>,
    /// Completes after both channels are closed
    pub task: JoinHandle<DecodeSummary>,
}

/// Concurrent line-to-record translator
pub struct LineDecoder<C: Clock = SystemClock> {
    line_pattern: Regex,
    mutator: PathMutator,
    clock: C,
    config: DecoderConfig,
}

impl LineDecoder<SystemClock> {
    pub fn new(rules: Arc<MutatorRules>, config: DecoderConfig) -> Self {
        Self::with_clock(rules, config, SystemClock)
    }
}

impl<C: Clock> LineDecoder<C> {
    /// Create a decoder stamping timestamp-less records from `clock`
    pub fn with_clock(rules: Arc<MutatorRules>, config: DecoderConfig, clock: C) -> Self {
        LineDecoder {
            line_pattern: Regex::new(LINE_PATTERN).expect("hardcoded line pattern must compile"),
            mutator: PathMutator::new(rules),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn mutator(&self) -> &PathMutator {
        &self.mutator
    }

    /// Decode one line.
    ///
    /// Returns `None` for empty lines and lines matching no grammar.
    pub fn decode_line(&self, line: &str) -> Option<Result<MetricRecord, DecodeError>> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        if line.is_empty() {
            return None;
        }

        let captures = self.line_pattern.captures(line)?;
        let now = self.clock.now();
        if captures.name("path").is_some() {
            Some(self.decode_graphite(&captures, now))
        } else {
            Some(self.decode_influx(&captures, now))
        }
    }

    /// Decode a batch of lines synchronously, splitting results by kind
    pub fn decode_lines<'a, I>(&self, lines: I) -> (Vec<MetricRecord>, Vec<DecodeError>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for line in lines {
            match self.decode_line(line) {
                Some(Ok(record)) => records.push(record),
                Some(Err(e)) => errors.push(e),
                None => {}
            }
        }
        (records, errors)
    }

    fn decode_graphite(
        &self,
        captures: &Captures<'_>,
        now: SystemTime,
    ) -> Result<MetricRecord, DecodeError> {
        let path = group(captures, "path");
        let timestamp = parse_timestamp(
            group(captures, "timestamp"),
            now,
            self.config.fractional_timestamps,
        );
        let value = parse_value(group(captures, "value"))?;
        let Mutation { name, fields } = self.mutator.mutate(path)?;

        MetricRecord::new(name, timestamp, value, fields)
            .map_err(|e| DecodeError::name_resolution_failed(path).with_source(e))
    }

    fn decode_influx(
        &self,
        captures: &Captures<'_>,
        now: SystemTime,
    ) -> Result<MetricRecord, DecodeError> {
        let name = group(captures, "name");
        let value = parse_value(group(captures, "tag_value"))?;
        let fields = parse_tag_fields(group(captures, "fields"));

        MetricRecord::new(name, now, value, fields)
            .map_err(|e| DecodeError::name_resolution_failed(name).with_source(e))
    }
}

impl<C: Clock> LineDecoder<C> {
    /// Decode an async line stream through a bounded worker pool.
    ///
    /// Must be called from within a Tokio runtime. When `shutdown` fires, no
    /// further lines are read or queued, even while the workers are stalled;
    /// lines already queued are still decoded.
    pub fn decode<R>(self: Arc<Self>, input: R, shutdown: CancellationToken) -> DecodeStreams
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let workers = self.config.workers.max(1);
        let capacity = self.config.channel_capacity.max(1);

        let (record_tx, records) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(capacity);
        let (line_tx, line_rx) = mpsc::channel(workers.saturating_mul(LINE_QUEUE_PER_WORKER));
        let line_rx = Arc::new(Mutex::new(line_rx));
        let counters = Arc::new(DecodeCounters::default());

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(decode_worker(
                worker_id,
                Arc::clone(&self),
                line_rx.clone(),
                record_tx.clone(),
                error_tx.clone(),
                counters.clone(),
            ));
        }
        drop(record_tx);
        drop(error_tx);

        let task = tokio::spawn(async move {
            read_lines(input, line_tx, &counters, shutdown).await;
            while let Some(joined) = pool.join_next().await {
                if let Err(e) = joined {
                    error!("Decode worker failed: {}", e);
                }
            }
            let summary = counters.summary();
            debug!(
                "Decoded {} lines: {} records, {} errors, {} dropped",
                summary.lines, summary.records, summary.errors, summary.dropped
            );
            summary
        });

        DecodeStreams {
            records,
            errors,
            task,
        }
    }
}

async fn read_lines<R>(
    input: R,
    lines: mpsc::Sender<String>,
    counters: &DecodeCounters,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                let sent = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    sent = lines.send(line) => sent,
                };
                if sent.is_err() {
                    return;
                }
                counters.lines.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Failed to read input: {}", e);
                return;
            }
        }
    }
    info!("Decoder shutting down, no further lines will be read");
}

async fn decode_worker<C: Clock>(
    worker_id: usize,
    decoder: Arc<LineDecoder<C>>,
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    records: mpsc::Sender<MetricRecord>,
    errors: mpsc::Sender<DecodeError>,
    counters: Arc<DecodeCounters>,
) {
    loop {
        let line = { lines.lock().await.recv().await };
        let Some(line) = line else { break };

        match decoder.decode_line(&line) {
            Some(Ok(record)) => match records.send(record).await {
                Ok(()) => {
                    counters.records.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    counters.undelivered.fetch_add(1, Ordering::Relaxed);
                    debug!("Decode worker {}: record receiver dropped", worker_id);
                }
            },
            Some(Err(e)) => match errors.send(e).await {
                Ok(()) => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    counters.undelivered.fetch_add(1, Ordering::Relaxed);
                    debug!("Decode worker {}: error receiver dropped", worker_id);
                }
            },
            None => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn group<'t>(captures: &Captures<'t>, name: &str) -> &'t str {
    captures.name(name).map(|m| m.as_str()).unwrap_or("")
}

/// Signed decimal numeral, optional fraction, no exponent
fn parse_value(raw: &str) -> Result<f64, DecodeError> {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(DecodeError::invalid_value(raw));
    }
    raw.parse::<f64>()
        .map_err(|e| DecodeError::invalid_value(raw).with_source(e))
}

/// `k=v,k2=v2`; split on the first `=`, skip empty keys and pairs without `=`
fn parse_tag_fields(blob: &str) -> BTreeMap<String, String> {
    blob.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}
