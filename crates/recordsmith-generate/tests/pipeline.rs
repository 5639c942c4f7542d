use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use recordsmith_core::{DatasetConfig, Field, FieldType, ModelConfig, Record, Specification};
use recordsmith_generate::{
    BatchSource, FailureKind, GenerateOptions, GenerationError, GenerationPipeline, OutputTarget,
    RecordSink, RetryConfig, RunStatus, SinkError, SourceError, StreamSink, StreamTarget,
};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

enum Step {
    Records(Vec<Record>),
    Fail(FailureKind),
    Hang,
}

/// Replays scripted steps, then produces sequential unique records.
struct ScriptedSource {
    script: VecDeque<Step>,
    next_id: u64,
    calls: Vec<(usize, Duration)>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedSource {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            next_id: 0,
            calls: Vec::new(),
            cancel_after: None,
        }
    }

    fn unique() -> Self {
        Self::new(Vec::new())
    }

    fn sequential(&mut self, count: usize) -> Vec<Record> {
        (0..count)
            .map(|_| {
                self.next_id += 1;
                record(json!({"id": self.next_id, "name": format!("user {}", self.next_id)}))
            })
            .collect()
    }
}

#[async_trait]
impl BatchSource for ScriptedSource {
    async fn request_batch(
        &mut self,
        _spec: &Specification,
        desired: usize,
        deadline: Instant,
    ) -> Result<Vec<Record>, SourceError> {
        self.calls
            .push((desired, deadline.saturating_duration_since(Instant::now())));
        if let Some((after, token)) = &self.cancel_after {
            if self.calls.len() >= *after {
                token.cancel();
            }
        }
        match self.script.pop_front() {
            Some(Step::Records(records)) => Ok(records),
            Some(Step::Fail(kind)) => Err(SourceError::new(kind, "scripted failure")),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(self.sequential(desired)),
        }
    }
}

/// Accepts records until the `fail_at`-th write.
#[derive(Default)]
struct FailingSink {
    written: u64,
    fail_at: u64,
}

impl RecordSink for FailingSink {
    fn write(&mut self, _record: Record) -> Result<(), SinkError> {
        if self.written + 1 == self.fail_at {
            return Err(SinkError::Io(io::Error::other("disk full")));
        }
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

/// Output that accepts a fixed number of bytes, then reports a full disk.
struct LimitedTarget {
    data: Vec<u8>,
    budget: usize,
}

impl LimitedTarget {
    fn new(budget: usize) -> Self {
        Self {
            data: Vec::new(),
            budget,
        }
    }

    fn complete_lines(&self) -> u64 {
        self.data.iter().filter(|byte| **byte == b'\n').count() as u64
    }
}

impl Write for LimitedTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.budget.saturating_sub(self.data.len());
        if room == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let size = room.min(buf.len());
        self.data.extend_from_slice(&buf[..size]);
        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamTarget for LimitedTarget {}

fn record(value: serde_json::Value) -> Record {
    Record::try_from(value).expect("record object")
}

fn spec(count: u64, batch_size: u32) -> Specification {
    Specification {
        model: ModelConfig {
            batch_size,
            ..ModelConfig::default()
        },
        dataset: DatasetConfig {
            count,
            domain: "Test users".to_string(),
            fields: vec![
                Field::new("id", FieldType::Integer).required(),
                Field::new("name", FieldType::String),
            ],
        },
    }
}

fn memory_sink() -> StreamSink<Vec<u8>> {
    StreamSink::new(Vec::new())
}

fn output_lines(sink: StreamSink<Vec<u8>>) -> Vec<serde_json::Value> {
    String::from_utf8(sink.into_inner())
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("recordsmith-generate-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[tokio::test]
async fn writes_exactly_the_target_count() {
    let mut pipeline =
        GenerationPipeline::new(ScriptedSource::unique(), memory_sink(), GenerateOptions::default())
            .with_run_id("run-fixed");
    let result = pipeline
        .run(&spec(70, 32), CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(result.report.run_id, "run-fixed");
    assert_eq!(result.report.status, RunStatus::Succeeded);
    assert_eq!(result.report.generated, 70);
    assert!(result.report.complete);
    assert_eq!(result.report.batches, 3);
    assert_eq!(result.report.backend_batches, 3);

    let (source, sink) = pipeline.into_parts();
    let desired: Vec<usize> = source.calls.iter().map(|(desired, _)| *desired).collect();
    assert_eq!(desired, vec![32, 32, 6]);
    assert_eq!(output_lines(sink).len(), 70);
}

#[tokio::test]
async fn equivalent_records_are_written_once() {
    let batch = vec![
        record(json!({"id": 1, "name": " Ann ", "tags": ["b", "a"]})),
        record(json!({"tags": ["a", "b"], "name": "Ann", "id": 1})),
        record(json!({"id": 1.0, "name": "Ann", "tags": ["a", "b"]})),
        record(json!({"id": 2, "name": "Bob"})),
    ];
    let source = ScriptedSource::new(vec![Step::Records(batch)]);
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), GenerateOptions::default());
    let result = pipeline
        .run(&spec(2, 10), CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(result.report.generated, 2);
    assert_eq!(result.report.duplicates, 2);

    let (_, sink) = pipeline.into_parts();
    let lines = output_lines(sink);
    assert_eq!(lines[0], json!({"id": 1, "name": " Ann ", "tags": ["b", "a"]}));
    assert_eq!(lines[1], json!({"id": 2, "name": "Bob"}));
}

#[tokio::test]
async fn duplicates_across_batches_are_filtered() {
    let first = vec![record(json!({"id": 1})), record(json!({"id": 2}))];
    let second = vec![record(json!({"id": 2})), record(json!({"id": 3}))];
    let source = ScriptedSource::new(vec![Step::Records(first), Step::Records(second)]);
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), GenerateOptions::default());
    let result = pipeline
        .run(&spec(3, 2), CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(result.report.generated, 3);
    assert_eq!(result.report.duplicates, 1);
    let (_, sink) = pipeline.into_parts();
    let ids: Vec<_> = output_lines(sink).into_iter().map(|line| line["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test(start_paused = true)]
async fn timeouts_escalate_then_shrink_the_batch() {
    let source = ScriptedSource::new(vec![
        Step::Fail(FailureKind::Timeout),
        Step::Fail(FailureKind::Timeout),
    ]);
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), GenerateOptions::default());
    let result = pipeline
        .run(&spec(32, 32), CancellationToken::new())
        .await
        .expect("run succeeds");

    let calls = &pipeline.source().calls;
    assert_eq!(
        calls[..3],
        [
            (32, Duration::from_secs(30)),
            (32, Duration::from_secs(60)),
            (16, Duration::from_secs(30)),
        ]
    );
    assert_eq!(result.report.generated, 32);
    assert_eq!(result.report.strategy_usage.get("retry"), Some(&1));
    assert_eq!(result.report.strategy_usage.get("shrink"), Some(&1));
    assert_eq!(result.report.failure_kinds.get("timeout"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn persistent_timeouts_fall_back_and_complete() {
    let script = (0..100).map(|_| Step::Fail(FailureKind::Timeout)).collect();
    let mut pipeline = GenerationPipeline::new(
        ScriptedSource::new(script),
        memory_sink(),
        GenerateOptions::default(),
    );
    let result = pipeline
        .run(&spec(10, 5), CancellationToken::new())
        .await
        .expect("fallback completes the run");

    assert_eq!(result.report.status, RunStatus::Succeeded);
    assert_eq!(result.report.generated, 10);
    assert_eq!(result.report.fallback_batches, 2);
    assert_eq!(result.report.backend_batches, 0);
    assert_eq!(result.report.attempts, 6);
    assert_eq!(pipeline.source().calls.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_without_fallback_fails_the_run() {
    let script = (0..10).map(|_| Step::Fail(FailureKind::Unavailable)).collect();
    let options = GenerateOptions::default()
        .with_retry(RetryConfig::default().with_fallback(false));
    let mut pipeline = GenerationPipeline::new(ScriptedSource::new(script), memory_sink(), options);
    let err = pipeline
        .run(&spec(10, 5), CancellationToken::new())
        .await
        .expect_err("no fallback");

    assert!(matches!(err, GenerationError::Exhausted(_)));
    assert_eq!(err.exit_code(), 3);
    let report = err.report().expect("partial report");
    assert_eq!(report.generated, 0);
    assert_eq!(report.failure_kinds.get("unavailable"), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn hanging_backend_is_cut_off_by_the_attempt_timeout() {
    let source = ScriptedSource::new(vec![Step::Hang]);
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), GenerateOptions::default());
    let result = pipeline
        .run(&spec(4, 4), CancellationToken::new())
        .await
        .expect("retry recovers");

    assert_eq!(result.report.generated, 4);
    assert_eq!(result.report.failure_kinds.get("timeout"), Some(&1));
    assert_eq!(pipeline.source().calls.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_stops_a_hanging_backend() {
    let source = ScriptedSource::new(vec![Step::Hang]);
    let options = GenerateOptions::default().with_run_timeout(Some(Duration::from_secs(5)));
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), options);
    let err = pipeline
        .run(&spec(4, 4), CancellationToken::new())
        .await
        .expect_err("deadline");

    assert!(matches!(err, GenerationError::DeadlineExceeded(_)));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn sink_failure_stops_the_run_with_partial_count() {
    let sink = FailingSink {
        fail_at: 5,
        ..FailingSink::default()
    };
    let mut pipeline = GenerationPipeline::new(ScriptedSource::unique(), sink, GenerateOptions::default());
    let err = pipeline
        .run(&spec(20, 10), CancellationToken::new())
        .await
        .expect_err("sink fails");

    assert!(matches!(err, GenerationError::Sink { .. }));
    assert_eq!(err.status(), RunStatus::SinkFailed);
    assert_eq!(err.exit_code(), 5);
    let report = err.report().expect("partial report");
    assert_eq!(report.generated, 4);
    assert!(!report.complete);
}

#[tokio::test]
async fn failed_buffer_drain_reports_persisted_records_only() {
    let sink = StreamSink::with_buffer_limit(LimitedTarget::new(200), 100);
    let mut pipeline = GenerationPipeline::new(ScriptedSource::unique(), sink, GenerateOptions::default());
    let err = pipeline
        .run(&spec(150, 32), CancellationToken::new())
        .await
        .expect_err("output fills up");

    assert_eq!(err.status(), RunStatus::SinkFailed);
    assert_eq!(err.exit_code(), 5);
    let report = err.report().expect("partial report");
    assert!(!report.complete);

    let (_, sink) = pipeline.into_parts();
    assert!(sink.is_failed());
    let persisted = sink.get_ref().complete_lines();
    assert!(persisted > 0 && persisted < 100);
    assert_eq!(report.generated, persisted);
}

#[tokio::test]
async fn failed_final_flush_is_never_reported_complete() {
    let sink = StreamSink::with_buffer_limit(LimitedTarget::new(100), 100);
    let mut pipeline = GenerationPipeline::new(ScriptedSource::unique(), sink, GenerateOptions::default());
    let err = pipeline
        .run(&spec(50, 32), CancellationToken::new())
        .await
        .expect_err("final flush fails");

    assert_eq!(err.status(), RunStatus::SinkFailed);
    let report = err.report().expect("partial report");
    assert!(!report.complete);

    let (_, sink) = pipeline.into_parts();
    let persisted = sink.get_ref().complete_lines();
    assert!(persisted < 50);
    assert_eq!(report.generated, persisted);
}

#[tokio::test]
async fn cancellation_interrupts_between_batches() {
    let cancel = CancellationToken::new();
    let mut source = ScriptedSource::unique();
    source.cancel_after = Some((1, cancel.clone()));
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), GenerateOptions::default());
    let err = pipeline
        .run(&spec(100, 10), cancel)
        .await
        .expect_err("interrupted");

    assert!(matches!(err, GenerationError::Interrupted(_)));
    assert_eq!(err.exit_code(), 130);
    let report = err.report().expect("partial report");
    assert_eq!(report.generated, 10);

    let (_, sink) = pipeline.into_parts();
    assert!(sink.is_closed());
    assert_eq!(output_lines(sink).len(), 10);
}

#[tokio::test]
async fn repeated_duplicate_batches_stall_the_run() {
    let same = || Step::Records(vec![record(json!({"id": 1}))]);
    let source = ScriptedSource::new((0..10).map(|_| same()).collect());
    let options = GenerateOptions {
        max_stalled_batches: 3,
        ..GenerateOptions::default()
    };
    let mut pipeline = GenerationPipeline::new(source, memory_sink(), options);
    let err = pipeline
        .run(&spec(5, 5), CancellationToken::new())
        .await
        .expect_err("stalled");

    assert!(matches!(err, GenerationError::Stalled(_)));
    assert_eq!(err.status(), RunStatus::Exhausted);
    let report = err.report().expect("partial report");
    assert_eq!(report.generated, 1);
    assert_eq!(report.duplicates, 3);
    assert_eq!(pipeline.source().calls.len(), 4);
}

#[tokio::test]
async fn invalid_spec_is_rejected_before_any_request() {
    let mut pipeline =
        GenerationPipeline::new(ScriptedSource::unique(), memory_sink(), GenerateOptions::default());
    let mut invalid = spec(10, 5);
    invalid.dataset.fields.clear();

    let err = pipeline
        .run(&invalid, CancellationToken::new())
        .await
        .expect_err("invalid spec");
    assert!(matches!(err, GenerationError::InvalidSpec(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(err.report().is_none());
    assert!(pipeline.source().calls.is_empty());
}

#[tokio::test]
async fn progress_callback_sees_monotonic_counts() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = Arc::clone(&seen);
    let mut pipeline =
        GenerationPipeline::new(ScriptedSource::unique(), memory_sink(), GenerateOptions::default())
            .with_progress(move |progress| {
                observer.lock().expect("lock").push(progress.generated);
            });
    pipeline
        .run(&spec(25, 10), CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(*seen.lock().expect("lock"), vec![10, 20, 25]);
}

#[tokio::test]
async fn million_records_stream_with_bounded_buffer() {
    let sink = StreamSink::with_buffer_limit(io::sink(), 100);
    let mut pipeline = GenerationPipeline::new(ScriptedSource::unique(), sink, GenerateOptions::default());
    let result = pipeline
        .run(&spec(1_000_000, 1000), CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(result.report.generated, 1_000_000);
    assert!(pipeline.sink().peak_buffered() <= 100);
    assert!(pipeline.sink().bytes_written().unwrap_or(0) > 0);
}

#[tokio::test]
async fn gzip_output_round_trips() {
    let path = temp_path("records.jsonl.gz");
    let target = OutputTarget::parse(path.to_str().expect("utf8 path"));
    assert!(matches!(target, OutputTarget::Gzip(_)));

    let sink = StreamSink::open(&target, 16).expect("open gzip sink");
    let mut pipeline = GenerationPipeline::new(ScriptedSource::unique(), sink, GenerateOptions::default());
    pipeline
        .run(&spec(50, 20), CancellationToken::new())
        .await
        .expect("run succeeds");
    drop(pipeline);

    let file = std::fs::File::open(&path).expect("open output");
    let lines: Vec<String> = BufReader::new(GzDecoder::new(file))
        .lines()
        .collect::<Result<_, _>>()
        .expect("decompress");
    assert_eq!(lines.len(), 50);
    let first: serde_json::Value = serde_json::from_str(&lines[0]).expect("json line");
    assert_eq!(first["id"], json!(1));

    let _ = std::fs::remove_dir_all(path.parent().expect("temp dir"));
}
