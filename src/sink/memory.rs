//! In-memory sink for tests

use super::{Sink, SinkError, SubmitOutcome};
use crate::metric::MetricRecord;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type RejectFn = dyn Fn(&MetricRecord) -> bool + Send + Sync;

#[derive(Default)]
struct State {
    batches: Vec<Vec<MetricRecord>>,
    schema_exists: bool,
    schema_creates: u64,
    fail_next_submits: u64,
    closed: bool,
}

/// Sink that keeps every accepted record in memory. Clones share state.
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<Mutex<State>>,
    reject: Option<Arc<RejectFn>>,
}

impl std::fmt::Debug for InMemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemorySink")
            .field("batches", &state.batches.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every record the predicate matches
    pub fn with_rejections<F>(predicate: F) -> Self
    where
        F: Fn(&MetricRecord) -> bool + Send + Sync + 'static,
    {
        InMemorySink {
            state: Arc::default(),
            reject: Some(Arc::new(predicate)),
        }
    }

    /// Fail the next `n` submissions with a transport error
    pub fn fail_next_submits(&self, n: u64) {
        self.state.lock().fail_next_submits = n;
    }

    /// Accepted batches, in submission order
    pub fn batches(&self) -> Vec<Vec<MetricRecord>> {
        self.state.lock().batches.clone()
    }

    /// All accepted records, flattened
    pub fn records(&self) -> Vec<MetricRecord> {
        self.state.lock().batches.iter().flatten().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().batches.iter().map(Vec::len).sum()
    }

    pub fn schema_creates(&self) -> u64 {
        self.state.lock().schema_creates
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Sink for InMemorySink {
    fn schema_exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, SinkError>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().schema_exists) })
    }

    fn create_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.schema_exists = true;
            state.schema_creates += 1;
            Ok(())
        })
    }

    fn submit<'a>(
        &'a self,
        batch: &'a [MetricRecord],
    ) -> Pin<Box<dyn Future<Output = Result<SubmitOutcome, SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SinkError::Closed);
            }
            if state.fail_next_submits > 0 {
                state.fail_next_submits -= 1;
                return Err(SinkError::Transport("forced submit failure".to_string()));
            }

            let mut outcome = SubmitOutcome::default();
            let mut accepted = Vec::with_capacity(batch.len());
            for record in batch {
                match &self.reject {
                    Some(reject) if reject(record) => outcome.failed += 1,
                    _ => {
                        outcome.succeeded += 1;
                        accepted.push(record.clone());
                    }
                }
            }
            state.batches.push(accepted);
            Ok(outcome)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            self.state.lock().closed = true;
            Ok(())
        })
    }
}
