use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::NormalizationPolicy;
use crate::output::DEFAULT_BUFFER_LIMIT;
use crate::retry::{EpisodeOrigin, RetryConfig, Strategy};

/// Options for the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Retry knobs for the strategy engine.
    pub retry: RetryConfig,
    /// Overall wall-clock budget in milliseconds; `None` disables it.
    pub run_timeout_ms: Option<u64>,
    /// Seed for fallback synthesis.
    pub seed: u64,
    /// Record buffer bound for stream sinks.
    pub buffer_limit: usize,
    /// Consecutive episodes without a new unique record before giving up.
    pub max_stalled_batches: u32,
    /// Normalizations applied before hashing.
    pub normalization: NormalizationPolicy,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            run_timeout_ms: Some(2 * 60 * 60 * 1000),
            seed: 0,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            max_stalled_batches: 10,
            normalization: NormalizationPolicy::default(),
        }
    }
}

impl GenerateOptions {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout_ms = timeout.map(|timeout| timeout.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Live counters for a running pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationProgress {
    pub target: u64,
    pub generated: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub elapsed: Duration,
    /// Records per second since the run started.
    pub rate: f64,
    /// Estimated time to reach the target at the current rate.
    pub eta: Option<Duration>,
}

impl GenerationProgress {
    pub fn new(target: u64) -> Self {
        Self {
            target,
            generated: 0,
            duplicates: 0,
            malformed: 0,
            elapsed: Duration::ZERO,
            rate: 0.0,
            eta: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.generated)
    }

    pub fn is_complete(&self) -> bool {
        self.generated >= self.target
    }

    pub fn percent(&self) -> f64 {
        if self.target == 0 {
            100.0
        } else {
            self.generated as f64 * 100.0 / self.target as f64
        }
    }

    /// Account one written record.
    pub fn record_written(&mut self, elapsed: Duration) {
        self.generated += 1;
        self.tick(elapsed);
    }

    /// Refresh elapsed time, rate and ETA.
    pub fn tick(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        let seconds = elapsed.as_secs_f64();
        self.rate = if seconds > 0.0 {
            self.generated as f64 / seconds
        } else {
            0.0
        };
        self.eta = if self.rate > 0.0 {
            Some(Duration::from_secs_f64(self.remaining() as f64 / self.rate))
        } else {
            None
        };
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    ValidationFailed,
    Exhausted,
    DeadlineExceeded,
    SinkFailed,
    Interrupted,
}

impl RunStatus {
    /// Stable process exit status for the outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Succeeded => 0,
            RunStatus::ValidationFailed => 2,
            RunStatus::Exhausted => 3,
            RunStatus::DeadlineExceeded => 4,
            RunStatus::SinkFailed => 5,
            RunStatus::Interrupted => 130,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::ValidationFailed => "validation_failed",
            RunStatus::Exhausted => "exhausted",
            RunStatus::DeadlineExceeded => "deadline_exceeded",
            RunStatus::SinkFailed => "sink_failed",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub target: u64,
    pub generated: u64,
    pub complete: bool,
    pub duplicates: u64,
    pub malformed: u64,
    pub batches: u64,
    pub attempts: u64,
    pub backend_batches: u64,
    pub degraded_batches: u64,
    pub fallback_batches: u64,
    pub strategy_usage: BTreeMap<String, u64>,
    pub failure_kinds: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    pub duration_ms: u64,
    pub records_per_sec: f64,
}

impl GenerationReport {
    pub fn new(run_id: String, target: u64) -> Self {
        Self {
            run_id,
            status: RunStatus::Succeeded,
            target,
            generated: 0,
            complete: false,
            duplicates: 0,
            malformed: 0,
            batches: 0,
            attempts: 0,
            backend_batches: 0,
            degraded_batches: 0,
            fallback_batches: 0,
            strategy_usage: BTreeMap::new(),
            failure_kinds: BTreeMap::new(),
            failure: None,
            bytes_written: None,
            duration_ms: 0,
            records_per_sec: 0.0,
        }
    }

    pub fn record_strategy(&mut self, strategy: Strategy) {
        *self
            .strategy_usage
            .entry(strategy.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_failure_kind(&mut self, kind: &str) {
        *self.failure_kinds.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_origin(&mut self, origin: EpisodeOrigin) {
        match origin {
            EpisodeOrigin::Backend => self.backend_batches += 1,
            EpisodeOrigin::Degraded => self.degraded_batches += 1,
            EpisodeOrigin::Fallback => self.fallback_batches += 1,
            EpisodeOrigin::None => {}
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}
