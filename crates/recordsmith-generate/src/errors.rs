use thiserror::Error;

use crate::model::{GenerationReport, RunStatus};
use crate::output::SinkError;

/// Terminal failures of a generation run.
///
/// Every variant raised after the run started carries the report
/// accumulated so far; records already written stay in place.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid specification: {0}")]
    InvalidSpec(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("retry budget exhausted with {}/{} records written", .0.generated, .0.target)]
    Exhausted(Box<GenerationReport>),
    #[error("no new unique records after repeated batches ({}/{} written)", .0.generated, .0.target)]
    Stalled(Box<GenerationReport>),
    #[error("run deadline exceeded with {}/{} records written", .0.generated, .0.target)]
    DeadlineExceeded(Box<GenerationReport>),
    #[error("interrupted with {}/{} records written", .0.generated, .0.target)]
    Interrupted(Box<GenerationReport>),
    #[error("output failed after {} records: {source}", report.generated)]
    Sink {
        source: SinkError,
        report: Box<GenerationReport>,
    },
}

impl GenerationError {
    pub fn status(&self) -> RunStatus {
        match self {
            GenerationError::InvalidSpec(_) | GenerationError::InvalidConfig(_) => {
                RunStatus::ValidationFailed
            }
            GenerationError::Exhausted(_) | GenerationError::Stalled(_) => RunStatus::Exhausted,
            GenerationError::DeadlineExceeded(_) => RunStatus::DeadlineExceeded,
            GenerationError::Interrupted(_) => RunStatus::Interrupted,
            GenerationError::Sink { .. } => RunStatus::SinkFailed,
        }
    }

    /// Report of the partial run, when the run had started.
    pub fn report(&self) -> Option<&GenerationReport> {
        match self {
            GenerationError::InvalidSpec(_) | GenerationError::InvalidConfig(_) => None,
            GenerationError::Exhausted(report)
            | GenerationError::Stalled(report)
            | GenerationError::DeadlineExceeded(report)
            | GenerationError::Interrupted(report)
            | GenerationError::Sink { report, .. } => Some(report),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status().exit_code()
    }
}
