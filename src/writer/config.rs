//! Batch Writer Configuration

use crate::config::{duration_millis, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest pipe the writer will allocate, whatever the multiplier says
pub const MAX_PIPE_CAPACITY: usize = 1 << 24;

/// Largest accepted `bulk_max`
pub const MAX_BULK_MAX: usize = 1 << 20;

/// Largest accepted `concurrency`
pub const MAX_CONCURRENCY: usize = 1024;

/// Configuration for the batch writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Drain workers and concurrent flushes (default: 4)
    pub concurrency: usize,
    /// Records per batch before a size-triggered flush (default: 1000)
    pub bulk_max: usize,
    /// Maximum time between flushes, in milliseconds (default: 5s)
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Pipe capacity multiplier: capacity = bulk_max * concurrency * pipe_factor
    pub pipe_factor: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            concurrency: 4,
            bulk_max: 1000,
            flush_interval: Duration::from_secs(5),
            pipe_factor: 100,
        }
    }
}

impl WriterConfig {
    /// Configuration for testing (small batches, fast flushes)
    pub fn test() -> Self {
        WriterConfig {
            concurrency: 2,
            bulk_max: 10,
            flush_interval: Duration::from_millis(50),
            pipe_factor: 4,
        }
    }

    /// Capacity of the pipe between drain workers and the batching loop
    pub fn pipe_capacity(&self) -> usize {
        self.bulk_max
            .saturating_mul(self.concurrency)
            .saturating_mul(self.pipe_factor)
            .clamp(1, MAX_PIPE_CAPACITY)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::Invalid(format!(
                "writer.concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if !(1..=MAX_BULK_MAX).contains(&self.bulk_max) {
            return Err(ConfigError::Invalid(format!(
                "writer.bulk_max must be between 1 and {}",
                MAX_BULK_MAX
            )));
        }
        if self.pipe_factor == 0 {
            return Err(ConfigError::Invalid("writer.pipe_factor must be at least 1".to_string()));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "writer.flush_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
