//! metrics-capacitor
//!
//! Ingests Graphite-style (`path value [timestamp]`) and Influx-style
//! (`name,k=v,... value`) metric lines, normalizes dotted paths into a name
//! plus tag fields with declarative rules, buffers the resulting records and
//! commits them to a sink in batches.
//!
//! ```text
//! input ──► codec::LineDecoder ──► buffer::Buffer ──► writer::BatchWriter ──► sink::Sink
//! ```

pub mod buffer;
pub mod clock;
pub mod codec;
pub mod config;
pub mod metric;
pub mod observability;
pub mod pipeline;
pub mod simulation;
pub mod sink;
pub mod writer;

pub use buffer::{Buffer, BufferError, InMemoryBuffer};
pub use codec::{DecodeError, DecodeErrorKind, LineDecoder, MutatorRules, PathMutator};
pub use config::{Config, ConfigError};
pub use metric::MetricRecord;
pub use pipeline::{run_pipeline, PipelineError, PipelineReport};
pub use sink::{Sink, SinkError, SubmitOutcome};
pub use writer::{spawn_batch_writer, BatchWriter, WriterConfig, WriterStatsSnapshot};
