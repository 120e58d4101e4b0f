//! Logging Configuration
//!
//! Level and output format for the process-wide `tracing` subscriber.
//! `RUST_LOG`, when set, takes precedence over `level`.

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `metrics_capacitor=debug` (default: info)
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for tests
    pub fn test() -> Self {
        LoggingConfig {
            level: "debug".to_string(),
            json: false,
        }
    }
}
