//! Ingest Pipeline
//!
//! Wires one input stream through the whole chain:
//!
//! ```text
//! input ──► LineDecoder ──► InMemoryBuffer ──► BatchWriter ──► Sink
//! ```
//!
//! Ends at end of input, after everything decoded has been flushed, or when
//! `shutdown` fires.

use crate::buffer::{Buffer, InMemoryBuffer};
use crate::codec::{DecodeStreams, DecodeSummary, LineDecoder, MutatorRules};
use crate::config::Config;
use crate::sink::Sink;
use crate::writer::{spawn_batch_writer, WriterStatsSnapshot};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Error type for pipeline runs
#[derive(Debug)]
pub enum PipelineError {
    /// A pipeline task panicked or was aborted
    Task(JoinError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Task(e) => write!(f, "pipeline task failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Task(e) => Some(e),
        }
    }
}

impl From<JoinError> for PipelineError {
    fn from(e: JoinError) -> Self {
        PipelineError::Task(e)
    }
}

/// Final counts of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub decode: DecodeSummary,
    pub writer: WriterStatsSnapshot,
}

/// Decode `input` and write every record to `sink` in batches
pub async fn run_pipeline<R>(
    config: &Config,
    rules: Arc<MutatorRules>,
    sink: Arc<dyn Sink>,
    input: R,
    shutdown: CancellationToken,
) -> Result<PipelineReport, PipelineError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(InMemoryBuffer::new());
    let (_writer, writer_task) =
        spawn_batch_writer(config.writer.clone(), buffer.clone(), sink, &shutdown);

    let decoder = Arc::new(LineDecoder::new(rules, config.decoder.clone()));
    let DecodeStreams {
        mut records,
        mut errors,
        task: decode_task,
    } = decoder.decode(input, shutdown.clone());

    let error_task = tokio::spawn(async move {
        while let Some(e) = errors.recv().await {
            warn!("Dropping line: {}", e);
        }
    });

    while let Some(record) = records.recv().await {
        if let Err(e) = buffer.push(record).await {
            error!("Failed to buffer record: {}", e);
        }
    }

    let decode = decode_task.await?;
    error_task.await?;
    info!(
        "Input finished: {} lines, {} records, {} errors, {} dropped, {} undelivered",
        decode.lines, decode.records, decode.errors, decode.dropped, decode.undelivered
    );

    // Everything decoded is buffered; let the writer drain it and stop
    buffer.close();
    let writer = writer_task.await?;
    info!(
        "Writer finished: {} batches, {} committed, {} failed, {} lost",
        writer.batches_flushed, writer.records_committed, writer.records_failed, writer.records_lost
    );

    Ok(PipelineReport { decode, writer })
}

/// Run `future` to completion on a new multi-threaded runtime.
///
/// The runtime is shut down without waiting on blocking tasks, so a read
/// parked on stdin does not hold the process open.
pub fn block_on_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}
