//! Core metric record type

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator placed between name components
pub const NAME_SEPARATOR: &str = ":";

/// Error returned when a record cannot be constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The resolved name was empty
    EmptyName,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::EmptyName => write!(f, "metric name must not be empty"),
        }
    }
}

impl std::error::Error for RecordError {}

/// A single normalized metric sample.
///
/// Immutable once built. Serializes to the document shape the store indexes:
///
/// ```text
/// {"@timestamp": 1700000000000, "name": "cpu", "value": 0.42, "fields": {"host": "web01"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    #[serde(rename = "@timestamp", serialize_with = "epoch_millis")]
    timestamp: SystemTime,
    name: String,
    value: f64,
    fields: BTreeMap<String, String>,
}

impl MetricRecord {
    /// Build a record, rejecting an empty name
    pub fn new(
        name: impl Into<String>,
        timestamp: SystemTime,
        value: f64,
        fields: BTreeMap<String, String>,
    ) -> Result<Self, RecordError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        Ok(MetricRecord {
            timestamp,
            name,
            value,
            fields,
        })
    }

    /// Build a record from name components, joining them with [`NAME_SEPARATOR`]
    pub fn from_components<S: AsRef<str>>(
        components: &[S],
        timestamp: SystemTime,
        value: f64,
        fields: BTreeMap<String, String>,
    ) -> Result<Self, RecordError> {
        let name = components
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join(NAME_SEPARATOR);
        Self::new(name, timestamp, value, fields)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Get a single tag value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Milliseconds since the Unix epoch (negative before it)
    pub fn timestamp_millis(&self) -> i64 {
        millis_since_epoch(self.timestamp)
    }

    /// Daily index this record belongs to: `<prefix>-YYYY.MM.DD` (UTC).
    /// Timestamps outside the calendar range map to the bare prefix.
    pub fn index_name(&self, prefix: &str) -> String {
        match DateTime::<Utc>::from_timestamp_millis(self.timestamp_millis()) {
            Some(day) => format!("{}-{}", prefix, day.format("%Y.%m.%d")),
            None => prefix.to_string(),
        }
    }

    /// Serialize to a single-line JSON document
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn millis_since_epoch(timestamp: SystemTime) -> i64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

fn epoch_millis<S>(timestamp: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(millis_since_epoch(*timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = MetricRecord::new("", at(1), 1.0, BTreeMap::new()).unwrap_err();
        assert_eq!(err, RecordError::EmptyName);
    }

    #[test]
    fn test_from_components_joins_with_colon() {
        let record =
            MetricRecord::from_components(&["cpu", "user"], at(1), 1.0, BTreeMap::new()).unwrap();
        assert_eq!(record.name(), "cpu:user");
    }

    #[test]
    fn test_from_no_components_rejected() {
        let none: [&str; 0] = [];
        assert!(MetricRecord::from_components(&none, at(1), 1.0, BTreeMap::new()).is_err());
    }

    #[test]
    fn test_json_document_shape() {
        let mut fields = BTreeMap::new();
        fields.insert("host".to_string(), "web01".to_string());
        let record = MetricRecord::new("cpu", at(1_700_000_000), 0.42, fields).unwrap();

        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["@timestamp"], 1_700_000_000_000i64);
        assert_eq!(json["name"], "cpu");
        assert_eq!(json["value"], 0.42);
        assert_eq!(json["fields"]["host"], "web01");
    }

    #[test]
    fn test_index_name_is_daily_utc() {
        let record = MetricRecord::new("cpu", at(1_700_000_000), 1.0, BTreeMap::new()).unwrap();
        assert_eq!(record.index_name("metrics"), "metrics-2023.11.14");

        let midnight = MetricRecord::new("cpu", at(1_699_920_000), 1.0, BTreeMap::new()).unwrap();
        assert_eq!(midnight.index_name("metrics"), "metrics-2023.11.14");
        let before = MetricRecord::new("cpu", at(1_699_919_999), 1.0, BTreeMap::new()).unwrap();
        assert_eq!(before.index_name("metrics"), "metrics-2023.11.13");
    }

    #[test]
    fn test_timestamp_millis_keeps_subsecond() {
        let ts = at(10) + Duration::from_millis(250);
        let record = MetricRecord::new("x", ts, 1.0, BTreeMap::new()).unwrap();
        assert_eq!(record.timestamp_millis(), 10_250);
    }
}
