//! Batch Sink Abstraction
//!
//! The writer hands finished batches to a [`Sink`]. A sink reports how many
//! records it accepted and how many it refused; a transport error means the
//! whole batch was lost. Nothing is ever resubmitted.
//!
//! Implementations:
//! - `InMemorySink`: records batches for assertions, scripted failures
//! - `JsonLinesSink`: one JSON document per line on any `Write`, tagged
//!   with its daily index
//! - `SimulatedSink`: wraps another sink and injects seeded failures

mod json_lines;
mod memory;
mod simulated;

pub use json_lines::{index_template, JsonLinesSink, DEFAULT_DOC_TYPE, DEFAULT_INDEX};
pub use memory::InMemorySink;
pub use simulated::{SimulatedSink, SimulatedSinkConfig, SimulatedSinkStats};

use crate::metric::MetricRecord;
use serde::Serialize;
use std::future::Future;
use std::io::Error as IoError;
use std::pin::Pin;

/// Per-record result of a bulk submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub succeeded: u64,
    pub failed: u64,
}

impl SubmitOutcome {
    pub fn all_succeeded(count: usize) -> Self {
        SubmitOutcome {
            succeeded: count as u64,
            failed: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Error type for sink operations
#[derive(Debug)]
pub enum SinkError {
    /// The submission did not reach the store
    Transport(String),
    /// I/O error from the underlying writer
    Io(IoError),
    /// The sink was already closed
    Closed,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Transport(msg) => write!(f, "sink transport error: {}", msg),
            SinkError::Io(e) => write!(f, "sink I/O error: {}", e),
            SinkError::Closed => write!(f, "sink closed"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for SinkError {
    fn from(e: IoError) -> Self {
        SinkError::Io(e)
    }
}

/// Destination store for record batches
pub trait Sink: Send + Sync + 'static {
    /// Whether the destination schema (index template) is already in place
    fn schema_exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, SinkError>> + Send + '_>>;

    /// Install the destination schema
    fn create_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Submit one batch
    fn submit<'a>(
        &'a self,
        batch: &'a [MetricRecord],
    ) -> Pin<Box<dyn Future<Output = Result<SubmitOutcome, SinkError>> + Send + 'a>>;

    /// Release the destination; called once after the last flush
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}
