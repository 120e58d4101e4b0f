//! Decoder Integration Tests
//!
//! Runs full inputs through `LineDecoder::decode` with rule files on disk.

use metrics_capacitor::clock::ManualClock;
use metrics_capacitor::codec::{
    DecodeErrorKind, DecoderConfig, FractionalTimestamps, LineDecoder, MutatorRules,
};
use metrics_capacitor::MetricRecord;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

const RULES: &str = "\
# host/service layout
^app\\.[a-z0-9]+\\.[a-z]+\\.cpu$|||_.host.service.+

^sys\\.|||_.+
";

fn rules_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(RULES.as_bytes()).unwrap();
    file
}

fn decoder(clock: ManualClock) -> Arc<LineDecoder<ManualClock>> {
    let file = rules_file();
    let rules = MutatorRules::from_file(file.path()).unwrap();
    Arc::new(LineDecoder::with_clock(
        Arc::new(rules),
        DecoderConfig::test(),
        clock,
    ))
}

async fn decode_all(
    decoder: Arc<LineDecoder<ManualClock>>,
    input: &'static str,
) -> (Vec<MetricRecord>, Vec<metrics_capacitor::DecodeError>) {
    let mut streams = decoder.decode(input.as_bytes(), CancellationToken::new());

    // Both receivers must be drained together or the workers stall
    let errors = tokio::spawn(async move {
        let mut errors = Vec::new();
        while let Some(e) = streams.errors.recv().await {
            errors.push(e);
        }
        errors
    });

    let mut records = Vec::new();
    while let Some(record) = streams.records.recv().await {
        records.push(record);
    }
    streams.task.await.unwrap();
    (records, errors.await.unwrap())
}

#[tokio::test]
async fn test_mixed_input_end_to_end() {
    let clock = ManualClock::from_unix_secs(1_800_000_000);
    let input = "app.web01.billing.cpu 0.75 1700000000\n\
                 sys.load 0.42 1700000000\n\
                 sys.load notanumber 1700000000\n\
                 requests,host=web02,dc=east 17\n\
                 this line is garbage\n\
                 \n\
                 other.metric.path 3\n";

    let (mut records, errors) = decode_all(decoder(clock), input).await;
    records.sort_by(|a, b| a.name().cmp(b.name()));

    assert_eq!(records.len(), 4);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), DecodeErrorKind::InvalidValue);
    assert_eq!(errors[0].raw(), "notanumber");

    let cpu = &records[0];
    assert_eq!(cpu.name(), "cpu");
    assert_eq!(cpu.field("host"), Some("web01"));
    assert_eq!(cpu.field("service"), Some("billing"));
    assert_eq!(cpu.value(), 0.75);

    let load = &records[1];
    assert_eq!(load.name(), "load");
    assert_eq!(load.timestamp(), UNIX_EPOCH + Duration::from_secs(1_700_000_000));

    let other = &records[2];
    assert_eq!(other.name(), "other_metric_path");
    assert!(other.fields().is_empty());
    assert_eq!(other.timestamp(), UNIX_EPOCH + Duration::from_secs(1_800_000_000));

    let requests = &records[3];
    assert_eq!(requests.name(), "requests");
    assert_eq!(requests.value(), 17.0);
    assert_eq!(requests.field("dc"), Some("east"));
}

#[tokio::test]
async fn test_last_line_without_newline() {
    let (records, errors) = decode_all(
        decoder(ManualClock::default()),
        "a.b 1\nc.d 2",
    )
    .await;
    assert_eq!(records.len(), 2);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_many_lines_through_small_channels() {
    let mut input = String::new();
    for i in 0..500 {
        input.push_str(&format!("bulk.metric{} {}\n", i, i));
    }
    let input: &'static str = Box::leak(input.into_boxed_str());

    let (records, errors) = decode_all(decoder(ManualClock::default()), input).await;
    assert_eq!(records.len(), 500);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_reads_nothing() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let mut streams = decoder(ManualClock::default()).decode("a.b 1\n".as_bytes(), shutdown);
    assert!(streams.records.recv().await.is_none());
    assert!(streams.errors.recv().await.is_none());

    let summary = streams.task.await.unwrap();
    assert_eq!(summary.lines, 0);
}

#[tokio::test]
async fn test_exact_timestamps_from_config() {
    let config = DecoderConfig {
        fractional_timestamps: FractionalTimestamps::Exact,
        ..DecoderConfig::test()
    };
    let decoder = LineDecoder::with_clock(
        Arc::new(MutatorRules::empty()),
        config,
        ManualClock::default(),
    );

    let record = decoder
        .decode_line("x.y 1 1700000000250")
        .unwrap()
        .unwrap();
    assert_eq!(
        record.timestamp(),
        UNIX_EPOCH + Duration::from_millis(1_700_000_000_250)
    );
}

#[test]
fn test_bad_rule_file_is_fatal() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"^ok$|||a.b\n^(unclosed|||a\n").unwrap();

    let err = MutatorRules::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{}", err);
}
