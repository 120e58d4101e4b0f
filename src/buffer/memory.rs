//! In-memory FIFO buffer
//!
//! Records live in a `VecDeque` behind a `parking_lot::Mutex`. Waiting pops
//! park on a `Notify`; the registration happens before the queue is checked so
//! a push landing between the check and the await is never missed.

use super::{Buffer, BufferError};
use crate::metric::MetricRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Inner {
    queue: Mutex<VecDeque<MetricRecord>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Unbounded in-process buffer. Clones share the same queue.
#[derive(Clone)]
pub struct InMemoryBuffer {
    inner: Arc<Inner>,
}

impl Default for InMemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBuffer")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        InMemoryBuffer {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Stop accepting records. Pops keep draining what is queued, then
    /// return [`BufferError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Remove and return everything queued, oldest first
    pub fn drain(&self) -> Vec<MetricRecord> {
        self.inner.queue.lock().drain(..).collect()
    }

    fn try_pop(&self) -> Option<MetricRecord> {
        self.inner.queue.lock().pop_front()
    }

    async fn pop_wait(&self) -> Result<MetricRecord, BufferError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.try_pop() {
                return Ok(record);
            }
            if self.is_closed() {
                return Err(BufferError::Closed);
            }

            notified.await;
        }
    }
}

impl Buffer for InMemoryBuffer {
    fn push<'a>(
        &'a self,
        record: MetricRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), BufferError>> + Send + 'a>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(BufferError::Closed);
            }
            self.inner.queue.lock().push_back(record);
            self.inner.notify.notify_one();
            Ok(())
        })
    }

    fn pop<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<MetricRecord, BufferError>> + Send + 'a>> {
        Box::pin(self.pop_wait())
    }

    fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }
}
