//! Normalized Metric Records
//!
//! Every decoded line, whatever its wire grammar, ends up as a
//! [`MetricRecord`]: a colon-joined name, a timestamp, a float value and a
//! sorted set of tag fields.

mod record;

pub use record::{MetricRecord, RecordError, NAME_SEPARATOR};
