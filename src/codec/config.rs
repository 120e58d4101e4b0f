//! Decoder Configuration

use crate::codec::timestamp::FractionalTimestamps;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest accepted `workers`
pub const MAX_DECODE_WORKERS: usize = 1024;

/// Largest accepted `channel_capacity`
pub const MAX_CHANNEL_CAPACITY: usize = 1 << 24;

/// Configuration for the line decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Mutator rule file (None = no rules, every path takes the fallback)
    pub rules_file: Option<PathBuf>,
    /// Number of decode worker tasks (default: 8)
    pub workers: usize,
    /// Capacity of the record and error hand-off channels (default: 1024)
    pub channel_capacity: usize,
    /// How timestamps longer than 10 digits are read (default: compat)
    pub fractional_timestamps: FractionalTimestamps,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            rules_file: None,
            workers: 8,
            channel_capacity: 1024,
            fractional_timestamps: FractionalTimestamps::Compat,
        }
    }
}

impl DecoderConfig {
    /// Configuration for testing (few workers, tiny channels)
    pub fn test() -> Self {
        DecoderConfig {
            rules_file: None,
            workers: 2,
            channel_capacity: 4,
            fractional_timestamps: FractionalTimestamps::Compat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert!(config.rules_file.is_none());
        assert_eq!(config.workers, 8);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.fractional_timestamps, FractionalTimestamps::Compat);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DecoderConfig = toml::from_str("workers = 3").unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.channel_capacity, 1024);
    }
}
