//! Clock Abstraction
//!
//! The decoder stamps records that carry no timestamp with "now". Going
//! through this trait keeps that decision testable:
//!
//! - `SystemClock`: wall-clock time for production
//! - `ManualClock`: frozen time that only moves when told to

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock trait for decode-time stamping
pub trait Clock: Send + Sync + Clone + 'static {
    /// Get current wall-clock time
    fn now(&self) -> SystemTime;
}

/// Production clock using real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for deterministic tests
///
/// Time only advances via `advance()` or `set()`. Clones share state.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Nanoseconds since the Unix epoch
    nanos: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::from_unix_secs(0)
    }
}

impl ManualClock {
    /// Create a clock frozen at the given Unix second
    pub fn from_unix_secs(secs: u64) -> Self {
        ManualClock {
            nanos: Arc::new(AtomicU64::new(secs.saturating_mul(1_000_000_000))),
        }
    }

    /// Advance time by the given duration
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Set time to a specific Unix second
    pub fn set_unix_secs(&self, secs: u64) {
        self.nanos
            .store(secs.saturating_mul(1_000_000_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
