//! Line Decoding and Path Normalization
//!
//! Turns Graphite/Influx text lines into [`MetricRecord`](crate::metric::MetricRecord)s.
//!
//! ## Architecture
//!
//! ```text
//! line ──► LineDecoder ──► (graphite) PathMutator ──► MetricRecord
//!                      └─► (influx)   name + k=v  ──► MetricRecord
//! ```
//!
//! ## Key Features
//!
//! - **Declarative rules**: `pattern|||template` lines, first match wins
//! - **Lenient input**: lines matching no grammar are dropped, not reported
//! - **Bounded fan-out**: a fixed worker pool decodes lines concurrently

pub mod config;
pub mod decoder;
pub mod error;
pub mod mutator;
pub mod rules;
pub mod timestamp;

pub use config::DecoderConfig;
pub use decoder::{DecodeStreams, DecodeSummary, LineDecoder};
pub use error::{DecodeError, DecodeErrorKind};
pub use mutator::{Mutation, PathMutator};
pub use rules::{MutatorRule, MutatorRules, RuleLoadError, Token, RULE_DELIMITER};
pub use timestamp::{parse_timestamp, FractionalTimestamps};
