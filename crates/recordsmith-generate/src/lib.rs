//! Batch generation engine for recordsmith.
//!
//! Records are requested from a [`BatchSource`] in batches, deduplicated by
//! a normalized content digest and streamed into a [`RecordSink`] until the
//! target count is reached. Backend failures are handled by the
//! [`RetryStrategyEngine`], which retries, shrinks, degrades the request and
//! finally falls back to rule-based synthesis.

pub mod backend;
pub mod dedup;
pub mod engine;
pub mod errors;
pub mod fallback;
pub mod model;
pub mod output;
pub mod retry;
pub mod source;

pub use backend::{BackendHealth, OllamaSource, check_health};
pub use dedup::{DedupStats, Deduplicator, NormalizationPolicy, RecordDigest};
pub use engine::{GenerationPipeline, GenerationResult};
pub use errors::GenerationError;
pub use fallback::FallbackSynthesizer;
pub use model::{GenerateOptions, GenerationProgress, GenerationReport, RunStatus};
pub use output::{OutputTarget, RecordSink, SinkError, StreamSink, StreamTarget};
pub use retry::{EngineState, Episode, EpisodeOrigin, RetryConfig, RetryStrategyEngine, Strategy};
pub use source::{BatchSource, FailureKind, SourceError};
