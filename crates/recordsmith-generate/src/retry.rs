//! Adaptive batch acquisition.
//!
//! One call to [`RetryStrategyEngine::acquire`] is an episode: it keeps
//! asking the [`BatchSource`] for candidates, escalating through retry,
//! batch shrinking, specification degradation and finally procedural
//! fallback, until it holds a non-empty batch or the budget runs out. The
//! engine never deduplicates.

use std::fmt;
use std::time::Duration;

use recordsmith_core::Specification;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fallback::FallbackSynthesizer;
use crate::source::{BatchSource, FailureKind, SourceError};

/// Fields kept by a degraded specification when none are required.
const DEGRADED_FIELD_LIMIT: usize = 3;

/// Retry knobs, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Backend attempts per episode before falling back.
    pub max_attempts: u32,
    /// Initial timeout for a single backend call, in milliseconds.
    pub base_timeout_ms: u64,
    /// Upper bound for the escalated timeout, in milliseconds.
    pub max_timeout_ms: u64,
    /// Factor applied to the timeout on retry after a timeout.
    pub backoff_multiplier: f64,
    /// Factor applied to the batch size when shrinking.
    pub shrink_factor: f64,
    /// Batch size floor; timeouts at this size degrade the specification.
    pub min_batch_size: usize,
    /// Synthesize records procedurally once the budget is spent.
    pub fallback: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            backoff_multiplier: 2.0,
            shrink_factor: 0.5,
            min_batch_size: 1,
            fallback: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_shrink_factor(mut self, factor: f64) -> Self {
        self.shrink_factor = factor;
        self
    }

    #[must_use]
    pub fn with_min_batch_size(mut self, size: usize) -> Self {
        self.min_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    pub fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Reject knob combinations the transition table cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be positive".to_string());
        }
        if self.base_timeout_ms == 0 {
            return Err("base timeout must be positive".to_string());
        }
        if self.base_timeout_ms > self.max_timeout_ms {
            return Err(format!(
                "base timeout ({}ms) exceeds max timeout ({}ms)",
                self.base_timeout_ms, self.max_timeout_ms
            ));
        }
        if !(self.backoff_multiplier > 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(format!(
                "backoff multiplier must be greater than 1, got {}",
                self.backoff_multiplier
            ));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(format!(
                "shrink factor must be in (0, 1), got {}",
                self.shrink_factor
            ));
        }
        if self.min_batch_size == 0 {
            return Err("min batch size must be positive".to_string());
        }
        Ok(())
    }
}

/// States of the per-episode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Attempting,
    Retrying,
    Shrinking,
    Degrading,
    FallingBack,
    Succeeded,
    Exhausted,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Attempting => "attempting",
            EngineState::Retrying => "retrying",
            EngineState::Shrinking => "shrinking",
            EngineState::Degrading => "degrading",
            EngineState::FallingBack => "falling_back",
            EngineState::Succeeded => "succeeded",
            EngineState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Succeeded | EngineState::FallingBack | EngineState::Exhausted
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovery strategy applied after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Retry,
    Shrink,
    Degrade,
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Retry => "retry",
            Strategy::Shrink => "shrink",
            Strategy::Degrade => "degrade",
            Strategy::Fallback => "fallback",
        }
    }

    fn for_state(state: EngineState) -> Option<Self> {
        match state {
            EngineState::Retrying => Some(Strategy::Retry),
            EngineState::Shrinking => Some(Strategy::Shrink),
            EngineState::Degrading => Some(Strategy::Degrade),
            EngineState::FallingBack => Some(Strategy::Fallback),
            _ => None,
        }
    }
}

/// Per-episode counters; a fresh value starts every episode.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// Attempts made so far (1-based once the first attempt starts).
    pub attempt: u32,
    pub timeout: Duration,
    pub batch_size: usize,
    pub consecutive_failures: u32,
    pub last_strategy: Option<Strategy>,
    /// The next attempt uses the degraded specification.
    pub degraded: bool,
}

impl RetryState {
    pub fn new(config: &RetryConfig, batch_size: usize) -> Self {
        Self {
            attempt: 0,
            timeout: config.base_timeout(),
            batch_size: batch_size.max(1),
            consecutive_failures: 0,
            last_strategy: None,
            degraded: false,
        }
    }

    fn apply(&mut self, next: EngineState, failure: FailureKind, config: &RetryConfig) {
        self.consecutive_failures += 1;
        self.last_strategy = Strategy::for_state(next);
        match next {
            EngineState::Retrying if failure == FailureKind::Timeout => {
                self.timeout = self
                    .timeout
                    .mul_f64(config.backoff_multiplier)
                    .min(config.max_timeout());
            }
            EngineState::Shrinking => {
                let shrunk = (self.batch_size as f64 * config.shrink_factor).floor() as usize;
                self.batch_size = shrunk.max(config.min_batch_size);
                self.timeout = config.base_timeout();
            }
            EngineState::Degrading => self.degraded = true,
            _ => {}
        }
    }
}

/// Transition table: the state that follows a failed attempt.
pub fn next_state(failure: FailureKind, state: &RetryState, config: &RetryConfig) -> EngineState {
    let give_up = if config.fallback {
        EngineState::FallingBack
    } else {
        EngineState::Exhausted
    };

    if state.degraded {
        return give_up;
    }

    let proposed = match failure {
        FailureKind::Timeout if state.attempt <= 1 => EngineState::Retrying,
        FailureKind::Timeout if state.batch_size > config.min_batch_size => EngineState::Shrinking,
        FailureKind::Timeout => EngineState::Degrading,
        FailureKind::Malformed if state.attempt <= 2 => EngineState::Retrying,
        FailureKind::Malformed => EngineState::Degrading,
        FailureKind::Transport | FailureKind::Unavailable => EngineState::Retrying,
    };

    match proposed {
        EngineState::Retrying | EngineState::Shrinking if state.attempt >= config.max_attempts => {
            give_up
        }
        other => other,
    }
}

/// Reduced-difficulty copy of `spec`: required fields only (or the first
/// few when none are required), deterministic sampling, marked domain.
pub fn degrade_spec(spec: &Specification) -> Specification {
    let mut degraded = spec.clone();
    let required: Vec<_> = spec.required_fields().cloned().collect();
    degraded.dataset.fields = if required.is_empty() {
        spec.dataset
            .fields
            .iter()
            .take(DEGRADED_FIELD_LIMIT)
            .cloned()
            .collect()
    } else {
        required
    };
    degraded.model.temperature = 0.0;
    degraded.dataset.domain = format!("Simplified {}", spec.dataset.domain);
    degraded
}

/// One failed attempt and the state it led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub attempt: u32,
    pub failure: FailureKind,
    pub state: EngineState,
    /// Batch size after the transition was applied.
    pub batch_size: usize,
    /// Per-call timeout after the transition was applied.
    pub timeout: Duration,
}

/// Where the records of an episode came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOrigin {
    Backend,
    Degraded,
    Fallback,
    None,
}

/// Outcome of one acquisition episode.
#[derive(Debug, Clone)]
pub struct Episode {
    pub records: Vec<recordsmith_core::Record>,
    /// `Succeeded`, `FallingBack` or `Exhausted`.
    pub state: EngineState,
    pub origin: EpisodeOrigin,
    /// Backend attempts made.
    pub attempts: u32,
    pub transitions: Vec<Transition>,
    pub last_error: Option<SourceError>,
}

impl Episode {
    pub fn strategies(&self) -> impl Iterator<Item = Strategy> + '_ {
        self.transitions
            .iter()
            .filter_map(|transition| Strategy::for_state(transition.state))
    }
}

/// Drives [`BatchSource`] requests through the retry state machine.
#[derive(Debug)]
pub struct RetryStrategyEngine {
    config: RetryConfig,
    fallback: FallbackSynthesizer,
}

impl RetryStrategyEngine {
    pub fn new(config: RetryConfig, fallback: FallbackSynthesizer) -> Self {
        Self { config, fallback }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Obtain up to `count` candidate records for `spec`.
    pub async fn acquire<S>(&mut self, source: &mut S, spec: &Specification, count: usize) -> Episode
    where
        S: BatchSource + ?Sized,
    {
        let batch_size = spec.batch_size().min(count).max(1);
        let mut state = RetryState::new(&self.config, batch_size);
        let mut transitions = Vec::new();
        let mut degraded_spec: Option<Specification> = None;
        let mut last_error = None;

        loop {
            state.attempt += 1;
            let desired = state.batch_size.min(count).max(1);
            let active = if state.degraded {
                &*degraded_spec.get_or_insert_with(|| degrade_spec(spec))
            } else {
                spec
            };
            let deadline = Instant::now() + state.timeout;

            debug!(
                attempt = state.attempt,
                desired,
                timeout_ms = state.timeout.as_millis() as u64,
                degraded = state.degraded,
                "requesting batch"
            );

            let outcome = match tokio::time::timeout_at(
                deadline,
                source.request_batch(active, desired, deadline),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::timeout(format!(
                    "no response within {}ms",
                    state.timeout.as_millis()
                ))),
            };

            let error = match outcome {
                Ok(records) if !records.is_empty() => {
                    let origin = if state.degraded {
                        EpisodeOrigin::Degraded
                    } else {
                        EpisodeOrigin::Backend
                    };
                    return Episode {
                        records,
                        state: EngineState::Succeeded,
                        origin,
                        attempts: state.attempt,
                        transitions,
                        last_error,
                    };
                }
                Ok(_) => SourceError::malformed("backend returned an empty batch"),
                Err(err) => err,
            };

            let next = next_state(error.kind, &state, &self.config);
            state.apply(next, error.kind, &self.config);
            transitions.push(Transition {
                attempt: state.attempt,
                failure: error.kind,
                state: next,
                batch_size: state.batch_size,
                timeout: state.timeout,
            });
            warn!(
                attempt = state.attempt,
                failure = %error.kind,
                error = %error.message,
                next = %next,
                batch_size = state.batch_size,
                timeout_ms = state.timeout.as_millis() as u64,
                "batch attempt failed"
            );
            last_error = Some(error);

            match next {
                EngineState::FallingBack => {
                    let records = self.fallback.synthesize(spec, count);
                    info!(records = records.len(), "synthesized fallback batch");
                    return Episode {
                        records,
                        state: EngineState::FallingBack,
                        origin: EpisodeOrigin::Fallback,
                        attempts: state.attempt,
                        transitions,
                        last_error,
                    };
                }
                EngineState::Exhausted => {
                    return Episode {
                        records: Vec::new(),
                        state: EngineState::Exhausted,
                        origin: EpisodeOrigin::None,
                        attempts: state.attempt,
                        transitions,
                        last_error,
                    };
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsmith_core::{DatasetConfig, Field, FieldType, ModelConfig};

    fn state(attempt: u32, batch_size: usize) -> RetryState {
        let mut state = RetryState::new(&RetryConfig::default(), batch_size);
        state.attempt = attempt;
        state
    }

    #[test]
    fn timeout_escalates_retry_then_shrink_then_degrade() {
        let config = RetryConfig::default().with_max_attempts(10);
        assert_eq!(
            next_state(FailureKind::Timeout, &state(1, 32), &config),
            EngineState::Retrying
        );
        assert_eq!(
            next_state(FailureKind::Timeout, &state(2, 32), &config),
            EngineState::Shrinking
        );
        assert_eq!(
            next_state(FailureKind::Timeout, &state(3, 1), &config),
            EngineState::Degrading
        );
    }

    #[test]
    fn malformed_retries_twice_then_degrades() {
        let config = RetryConfig::default().with_max_attempts(10);
        assert_eq!(
            next_state(FailureKind::Malformed, &state(2, 8), &config),
            EngineState::Retrying
        );
        assert_eq!(
            next_state(FailureKind::Malformed, &state(3, 8), &config),
            EngineState::Degrading
        );
    }

    #[test]
    fn transport_failures_retry_until_budget_is_spent() {
        let config = RetryConfig::default();
        assert_eq!(
            next_state(FailureKind::Unavailable, &state(2, 8), &config),
            EngineState::Retrying
        );
        assert_eq!(
            next_state(FailureKind::Transport, &state(3, 8), &config),
            EngineState::FallingBack
        );
        assert_eq!(
            next_state(FailureKind::Transport, &state(3, 8), &config.clone().with_fallback(false)),
            EngineState::Exhausted
        );
    }

    #[test]
    fn failure_in_degraded_attempt_falls_back() {
        let config = RetryConfig::default();
        let mut degraded = state(1, 4);
        degraded.degraded = true;
        assert_eq!(
            next_state(FailureKind::Transport, &degraded, &config),
            EngineState::FallingBack
        );
    }

    #[test]
    fn applying_transitions_updates_timeout_and_batch() {
        let config = RetryConfig::default();
        let mut current = state(1, 32);
        current.apply(EngineState::Retrying, FailureKind::Timeout, &config);
        assert_eq!(current.timeout, Duration::from_secs(60));
        assert_eq!(current.batch_size, 32);

        current.apply(EngineState::Shrinking, FailureKind::Timeout, &config);
        assert_eq!(current.timeout, Duration::from_secs(30));
        assert_eq!(current.batch_size, 16);

        current.apply(EngineState::Retrying, FailureKind::Malformed, &config);
        assert_eq!(current.timeout, Duration::from_secs(30));
        assert_eq!(current.consecutive_failures, 3);
        assert_eq!(current.last_strategy, Some(Strategy::Retry));
    }

    #[test]
    fn timeout_escalation_is_capped() {
        let config = RetryConfig::default()
            .with_base_timeout(Duration::from_secs(200))
            .with_max_timeout(Duration::from_secs(300));
        let mut current = RetryState::new(&config, 4);
        current.apply(EngineState::Retrying, FailureKind::Timeout, &config);
        assert_eq!(current.timeout, Duration::from_secs(300));
    }

    #[test]
    fn degraded_spec_keeps_required_fields() {
        let spec = Specification {
            model: ModelConfig::default(),
            dataset: DatasetConfig {
                count: 10,
                domain: "Orders".to_string(),
                fields: vec![
                    Field::new("id", FieldType::Uuid).required(),
                    Field::new("note", FieldType::Text),
                    Field::new("total", FieldType::Float).required(),
                ],
            },
        };
        let degraded = degrade_spec(&spec);
        let names: Vec<_> = degraded
            .dataset
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "total"]);
        assert_eq!(degraded.model.temperature, 0.0);
        assert_eq!(degraded.dataset.domain, "Simplified Orders");
        assert_eq!(spec.dataset.fields.len(), 3);
    }

    #[test]
    fn degraded_spec_without_required_fields_keeps_first_three() {
        let fields = (0..5)
            .map(|idx| Field::new(format!("f{idx}"), FieldType::String))
            .collect();
        let spec = Specification {
            model: ModelConfig::default(),
            dataset: DatasetConfig {
                count: 1,
                domain: "x".to_string(),
                fields,
            },
        };
        assert_eq!(degrade_spec(&spec).dataset.fields.len(), 3);
    }

    #[test]
    fn config_validation_rejects_bad_knobs() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::default().with_backoff_multiplier(1.0).validate().is_err());
        assert!(RetryConfig::default().with_shrink_factor(1.0).validate().is_err());
        assert!(RetryConfig::default().with_max_attempts(0).validate().is_err());
        assert!(
            RetryConfig::default()
                .with_base_timeout(Duration::from_secs(10))
                .with_max_timeout(Duration::from_secs(5))
                .validate()
                .is_err()
        );
    }
}
