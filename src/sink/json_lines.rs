//! Newline-delimited JSON sink
//!
//! Writes each record as one document per line, tagged with the daily index
//! it belongs to and the configured document type:
//!
//! ```text
//! {"_index":"metrics-2023.11.14","_type":"raw","@timestamp":1700000000000,"name":"cpu","value":0.42,"fields":{"host":"web01"}}
//! ```
//!
//! With a template path set, the schema step writes the index template for
//! `<index>*` there once; without one, schema checks always succeed.

use super::{Sink, SinkError, SubmitOutcome};
use crate::metric::MetricRecord;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{BufWriter, ErrorKind, Stdout, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Index prefix used when none is configured
pub const DEFAULT_INDEX: &str = "metrics";

/// Document type used when none is configured
pub const DEFAULT_DOC_TYPE: &str = "raw";

/// Index template matching every `<index>*` index.
///
/// Tag fields are stored as exact strings and copied into `@uniq`;
/// `name` and `value` are not analyzed.
pub fn index_template(index: &str, doc_type: &str) -> Value {
    let mapping = json!({
        "_source": { "enabled": false },
        "dynamic_templates": [{
            "fields": {
                "path_match": "fields.*",
                "mapping": { "type": "string", "index": "not_analyzed", "copy_to": "@uniq" }
            }
        }],
        "properties": {
            "@timestamp": { "type": "date", "format": "strict_date_optional_time||epoch_millis" },
            "@uniq": { "type": "string", "index": "not_analyzed" },
            "name": { "type": "string", "index": "not_analyzed" },
            "value": { "type": "double", "index": "not_analyzed" }
        }
    });
    let mut mappings = Map::new();
    mappings.insert(doc_type.to_string(), mapping);

    json!({
        "template": format!("{}*", index),
        "order": 0,
        "mappings": mappings,
    })
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type")]
    doc_type: &'a str,
    #[serde(flatten)]
    record: &'a MetricRecord,
}

struct Output<W> {
    writer: W,
    closed: bool,
}

/// Sink writing JSON lines to any `Write`
pub struct JsonLinesSink<W: Write + Send + 'static> {
    output: Mutex<Output<W>>,
    index: String,
    doc_type: String,
    template_path: Option<PathBuf>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Append to the file at `path`, creating it if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            output: Mutex::new(Output {
                writer,
                closed: false,
            }),
            index: DEFAULT_INDEX.to_string(),
            doc_type: DEFAULT_DOC_TYPE.to_string(),
            template_path: None,
        }
    }

    /// Set the index prefix and document type stamped on every document
    pub fn with_index(mut self, index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        self.index = index.into();
        self.doc_type = doc_type.into();
        self
    }

    /// Keep the index template at `path`
    pub fn with_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Consume the sink and return the underlying writer
    pub fn into_inner(self) -> W {
        self.output.into_inner().writer
    }

    fn write_batch(&self, batch: &[MetricRecord]) -> Result<SubmitOutcome, SinkError> {
        let mut chunk = Vec::with_capacity(batch.len() * 128);
        let mut outcome = SubmitOutcome::default();

        for record in batch {
            let doc = Document {
                index: record.index_name(&self.index),
                doc_type: &self.doc_type,
                record,
            };
            match serde_json::to_vec(&doc) {
                Ok(doc) => {
                    chunk.extend_from_slice(&doc);
                    chunk.push(b'\n');
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    warn!("Failed to serialize record {}: {}", record.name(), e);
                    outcome.failed += 1;
                }
            }
        }

        let mut output = self.output.lock();
        if output.closed {
            return Err(SinkError::Closed);
        }
        output.writer.write_all(&chunk)?;
        output.writer.flush()?;
        Ok(outcome)
    }

    async fn write_template(&self, path: &Path) -> Result<(), SinkError> {
        let body = serde_json::to_vec_pretty(&index_template(&self.index, &self.doc_type))
            .map_err(|e| SinkError::Transport(format!("failed to encode index template: {}", e)))?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        let mut file = match options.open(path).await {
            Ok(file) => file,
            // Someone else created it between the check and now
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&body).await?;
        file.flush().await?;
        info!("Wrote index template for {}* to {}", self.index, path.display());
        Ok(())
    }
}

impl<W: Write + Send + 'static> Sink for JsonLinesSink<W> {
    fn schema_exists(&self) -> Pin<Box<dyn Future<Output = Result<bool, SinkError>> + Send + '_>> {
        Box::pin(async move {
            match &self.template_path {
                Some(path) => Ok(tokio::fs::try_exists(path).await?),
                None => Ok(true),
            }
        })
    }

    fn create_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            match &self.template_path {
                Some(path) => self.write_template(path).await,
                None => Ok(()),
            }
        })
    }

    fn submit<'a>(
        &'a self,
        batch: &'a [MetricRecord],
    ) -> Pin<Box<dyn Future<Output = Result<SubmitOutcome, SinkError>> + Send + 'a>> {
        Box::pin(async move { self.write_batch(batch) })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let mut output = self.output.lock();
            if output.closed {
                return Ok(());
            }
            output.closed = true;
            output.writer.flush()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, UNIX_EPOCH};

    fn record(name: &str, value: f64) -> MetricRecord {
        let mut fields = BTreeMap::new();
        fields.insert("host".to_string(), "web01".to_string());
        MetricRecord::new(name, UNIX_EPOCH + Duration::from_secs(1_700_000_000), value, fields).unwrap()
    }

    #[tokio::test]
    async fn test_writes_one_document_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        let outcome = sink
            .submit(&[record("cpu", 0.5), record("mem", 2.0)])
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::all_succeeded(2));

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);

        let doc: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(doc["_index"], "metrics-2023.11.14");
        assert_eq!(doc["_type"], "raw");
        assert_eq!(doc["@timestamp"], 1_700_000_000_000i64);
        assert_eq!(doc["name"], "cpu");
        assert_eq!(doc["value"], 0.5);
        assert_eq!(doc["fields"]["host"], "web01");
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let sink = JsonLinesSink::create(&path).unwrap();
        sink.submit(&[record("a", 1.0)]).await.unwrap();
        sink.close().await.unwrap();

        let sink = JsonLinesSink::create(&path).unwrap();
        sink.submit(&[record("b", 1.0)]).await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.close().await.unwrap();
        assert!(matches!(
            sink.submit(&[record("a", 1.0)]).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_configured_index_and_doc_type() {
        let sink = JsonLinesSink::new(Vec::new()).with_index("capacitor", "sample");
        sink.submit(&[record("cpu", 1.0)]).await.unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(doc["_index"], "capacitor-2023.11.14");
        assert_eq!(doc["_type"], "sample");
        assert_eq!(doc["name"], "cpu");
    }

    #[tokio::test]
    async fn test_schema_without_template_path_is_present() {
        let sink = JsonLinesSink::new(Vec::new());
        assert!(sink.schema_exists().await.unwrap());
        sink.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_template_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        let sink = JsonLinesSink::new(Vec::new())
            .with_index("capacitor", "sample")
            .with_template_path(&path);

        assert!(!sink.schema_exists().await.unwrap());
        sink.create_schema().await.unwrap();
        assert!(sink.schema_exists().await.unwrap());

        let template: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(template["template"], "capacitor*");
        assert_eq!(
            template["mappings"]["sample"]["properties"]["value"]["type"],
            "double"
        );

        // A second create leaves the existing template alone
        std::fs::write(&path, "{}").unwrap();
        sink.create_schema().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
