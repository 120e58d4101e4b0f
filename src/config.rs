//! Process Configuration
//!
//! One TOML file with a table per component. Every key is optional:
//!
//! ```toml
//! [decoder]
//! rules_file = "/etc/metrics-capacitor/rules.conf"
//! workers = 8
//! fractional_timestamps = "compat"
//!
//! [writer]
//! concurrency = 4
//! bulk_max = 1000
//! flush_interval = 5000
//!
//! [sink]
//! kind = "file"
//! path = "/var/lib/metrics-capacitor/records.jsonl"
//! index = "metrics"
//! doc_type = "raw"
//! template_path = "/var/lib/metrics-capacitor/template.json"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Environment variables override the file:
//! - `METCAP_RULES_FILE`: mutator rule file
//! - `METCAP_LOG_LEVEL`: log filter
//! - `METCAP_WRITER_CONCURRENCY`: writer concurrency
//! - `METCAP_BULK_MAX`: records per batch
//! - `METCAP_INDEX`: index prefix

use crate::codec::config::{MAX_CHANNEL_CAPACITY, MAX_DECODE_WORKERS};
use crate::codec::DecoderConfig;
use crate::observability::LoggingConfig;
use crate::sink::{DEFAULT_DOC_TYPE, DEFAULT_INDEX};
use crate::writer::WriterConfig;
use serde::{Deserialize, Serialize};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "METCAP_CONFIG";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read
    Io(IoError),
    /// The config file is not valid TOML for this schema
    Parse(toml::de::Error),
    /// A value is out of range or inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<IoError> for ConfigError {
    fn from(e: IoError) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Where committed batches go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// JSON lines on standard output
    #[default]
    Stdout,
    /// JSON lines appended to `sink.path`
    File,
}

/// Sink selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Output path, required when `kind = "file"`
    pub path: Option<PathBuf>,
    /// Index prefix; records go to `<index>-YYYY.MM.DD` (default: "metrics")
    pub index: String,
    /// Document type stamped on every record (default: "raw")
    pub doc_type: String,
    /// Where the index template is kept (None = no template)
    pub template_path: Option<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            kind: SinkKind::Stdout,
            path: None,
            index: DEFAULT_INDEX.to_string(),
            doc_type: DEFAULT_DOC_TYPE.to_string(),
            template_path: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decoder: DecoderConfig,
    pub writer: WriterConfig,
    pub sink: SinkConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Configuration for testing
    pub fn test() -> Self {
        Config {
            decoder: DecoderConfig::test(),
            writer: WriterConfig::test(),
            sink: SinkConfig::default(),
            logging: LoggingConfig::test(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Load from `METCAP_CONFIG` if set (defaults otherwise), apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `METCAP_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `METCAP_*` overrides from an arbitrary lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("METCAP_RULES_FILE") {
            self.decoder.rules_file = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("METCAP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("METCAP_WRITER_CONCURRENCY") {
            self.writer.concurrency = parse_override("METCAP_WRITER_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("METCAP_BULK_MAX") {
            self.writer.bulk_max = parse_override("METCAP_BULK_MAX", &value)?;
        }
        if let Some(index) = lookup("METCAP_INDEX") {
            self.sink.index = index;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DECODE_WORKERS).contains(&self.decoder.workers) {
            return Err(ConfigError::Invalid(format!(
                "decoder.workers must be between 1 and {}",
                MAX_DECODE_WORKERS
            )));
        }
        if !(1..=MAX_CHANNEL_CAPACITY).contains(&self.decoder.channel_capacity) {
            return Err(ConfigError::Invalid(format!(
                "decoder.channel_capacity must be between 1 and {}",
                MAX_CHANNEL_CAPACITY
            )));
        }
        self.writer.validate()?;
        if self.sink.index.is_empty() || self.sink.index.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "sink.index must be non-empty and contain no whitespace".to_string(),
            ));
        }
        if self.sink.doc_type.is_empty() {
            return Err(ConfigError::Invalid("sink.doc_type must not be empty".to_string()));
        }
        if self.sink.kind == SinkKind::File && self.sink.path.is_none() {
            return Err(ConfigError::Invalid(
                "sink.path is required when sink.kind = \"file\"".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a positive integer, got {:?}", key, value)))
}

/// Serde helper for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
