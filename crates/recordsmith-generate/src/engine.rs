use std::time::Instant;

use recordsmith_core::Specification;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dedup::Deduplicator;
use crate::errors::GenerationError;
use crate::fallback::FallbackSynthesizer;
use crate::model::{GenerateOptions, GenerationProgress, GenerationReport, RunStatus};
use crate::output::{RecordSink, SinkError};
use crate::retry::{EngineState, Episode, RetryStrategyEngine};
use crate::source::BatchSource;

/// Result of a successful generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub report: GenerationReport,
    pub progress: GenerationProgress,
}

type ProgressCallback = Box<dyn FnMut(&GenerationProgress) + Send>;

/// Drives acquisition, deduplication and output until the target is met.
pub struct GenerationPipeline<S, K> {
    source: S,
    sink: K,
    options: GenerateOptions,
    run_id: Option<String>,
    on_progress: Option<ProgressCallback>,
}

enum Interruption {
    Cancelled,
    Deadline,
}

enum Failure {
    Exhausted(String),
    Stalled,
    Deadline,
    Interrupted,
    Sink(SinkError),
}

impl<S, K> GenerationPipeline<S, K>
where
    S: BatchSource,
    K: RecordSink,
{
    pub fn new(source: S, sink: K, options: GenerateOptions) -> Self {
        Self {
            source,
            sink,
            options,
            run_id: None,
            on_progress: None,
        }
    }

    /// Use `run_id` in logs and the report instead of a fresh UUID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Receive a progress snapshot after every batch.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&GenerationProgress) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Generate `spec.dataset.count` unique records into the sink.
    pub async fn run(
        &mut self,
        spec: &Specification,
        cancel: CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        recordsmith_core::validate_spec(spec)
            .map_err(|err| GenerationError::InvalidSpec(err.to_string()))?;
        self.options
            .retry
            .validate()
            .map_err(GenerationError::InvalidConfig)?;

        let start = Instant::now();
        let deadline = self
            .options
            .run_timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let target = spec.target();
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut engine = RetryStrategyEngine::new(
            self.options.retry.clone(),
            FallbackSynthesizer::new(self.options.seed),
        );
        let mut dedup = Deduplicator::new(self.options.normalization);
        let mut progress = GenerationProgress::new(target);
        let mut report = GenerationReport::new(run_id.clone(), target);
        let mut stalled = 0_u32;

        info!(
            run_id = %run_id,
            target,
            batch_size = spec.model.batch_size,
            model = %spec.model.name,
            seed = self.options.seed,
            "generation started"
        );

        let outcome: Result<(), Failure> = loop {
            if progress.is_complete() {
                break Ok(());
            }
            if cancel.is_cancelled() {
                break Err(Failure::Interrupted);
            }

            let remaining = progress.remaining();
            let batch_size = (spec.batch_size() as u64).min(remaining) as usize;

            let episode = {
                let acquire = engine.acquire(&mut self.source, spec, batch_size);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Interruption::Cancelled),
                    _ = sleep_until(deadline) => Err(Interruption::Deadline),
                    episode = acquire => Ok(episode),
                }
            };
            let episode = match episode {
                Ok(episode) => episode,
                Err(Interruption::Cancelled) => break Err(Failure::Interrupted),
                Err(Interruption::Deadline) => break Err(Failure::Deadline),
            };

            record_episode(&mut report, &episode);
            if episode.state == EngineState::Exhausted {
                let reason = episode
                    .last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no candidates".to_string());
                break Err(Failure::Exhausted(reason));
            }

            let candidates = episode.records.len();
            let survivors = dedup.filter_unique_limit(episode.records, remaining as usize);
            let admitted = survivors.len();

            let mut write_error = None;
            for record in survivors {
                if let Err(err) = self.sink.write(record) {
                    write_error = Some(err);
                    break;
                }
                progress.record_written(start.elapsed());
            }

            let stats = dedup.stats();
            progress.duplicates = stats.duplicates;
            progress.malformed = stats.malformed;
            progress.tick(start.elapsed());

            if let Some(err) = write_error {
                break Err(Failure::Sink(err));
            }

            info!(
                batch = report.batches,
                origin = ?episode.origin,
                candidates,
                admitted,
                generated = progress.generated,
                duplicates = progress.duplicates,
                rate = progress.rate,
                "batch processed"
            );

            if let Some(callback) = self.on_progress.as_mut() {
                callback(&progress);
            }

            if admitted == 0 {
                stalled += 1;
                if stalled >= self.options.max_stalled_batches.max(1) {
                    break Err(Failure::Stalled);
                }
            } else {
                stalled = 0;
            }
        };

        let outcome = match outcome {
            Ok(()) => self
                .sink
                .flush()
                .and_then(|()| self.sink.close())
                .map_err(Failure::Sink),
            Err(Failure::Sink(err)) => Err(Failure::Sink(err)),
            Err(failure) => {
                if let Err(err) = self.sink.flush().and_then(|()| self.sink.close()) {
                    warn!(run_id = %run_id, error = %err, "failed to close output after failure");
                }
                Err(failure)
            }
        };

        progress.tick(start.elapsed());
        report.generated = self.sink.written();
        report.duplicates = progress.duplicates;
        report.malformed = progress.malformed;
        report.bytes_written = self.sink.bytes_written();
        report.duration_ms = start.elapsed().as_millis() as u64;
        report.records_per_sec = progress.rate;

        match outcome {
            Ok(()) => {
                report.status = RunStatus::Succeeded;
                report.complete = report.generated == target;
                info!(
                    run_id = %run_id,
                    generated = report.generated,
                    duplicates = report.duplicates,
                    batches = report.batches,
                    fallback_batches = report.fallback_batches,
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok(GenerationResult { report, progress })
            }
            Err(failure) => {
                let err = match failure {
                    Failure::Exhausted(reason) => {
                        report.status = RunStatus::Exhausted;
                        report.failure = Some(format!("retry budget exhausted: {reason}"));
                        GenerationError::Exhausted(Box::new(report))
                    }
                    Failure::Stalled => {
                        report.status = RunStatus::Exhausted;
                        report.failure = Some(format!(
                            "no new unique records in {} consecutive batches",
                            self.options.max_stalled_batches
                        ));
                        GenerationError::Stalled(Box::new(report))
                    }
                    Failure::Deadline => {
                        report.status = RunStatus::DeadlineExceeded;
                        report.failure = Some("run deadline exceeded".to_string());
                        GenerationError::DeadlineExceeded(Box::new(report))
                    }
                    Failure::Interrupted => {
                        report.status = RunStatus::Interrupted;
                        report.failure = Some("interrupted".to_string());
                        GenerationError::Interrupted(Box::new(report))
                    }
                    Failure::Sink(source) => {
                        report.status = RunStatus::SinkFailed;
                        report.failure = Some(source.to_string());
                        GenerationError::Sink {
                            source,
                            report: Box::new(report),
                        }
                    }
                };
                warn!(
                    run_id = %run_id,
                    status = err.status().as_str(),
                    error = %err,
                    "generation failed"
                );
                Err(err)
            }
        }
    }
}

fn record_episode(report: &mut GenerationReport, episode: &Episode) {
    report.batches += 1;
    report.attempts += u64::from(episode.attempts);
    report.record_origin(episode.origin);
    for transition in &episode.transitions {
        report.record_failure_kind(transition.failure.as_str());
    }
    for strategy in episode.strategies() {
        report.record_strategy(strategy);
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
