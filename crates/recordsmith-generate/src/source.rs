use std::fmt;

use async_trait::async_trait;
use recordsmith_core::{Record, Specification};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Classified failure of a batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No output before the deadline.
    Timeout,
    /// The backend could not be reached.
    Transport,
    /// Output could not be interpreted as records.
    Malformed,
    /// The backend was reachable but refused or errored.
    Unavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Malformed => "malformed",
            FailureKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`BatchSource`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: FailureKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }
}

/// Produces candidate records for a specification.
///
/// Implementations must give up with [`FailureKind::Timeout`] once `deadline`
/// passes and may return fewer than `desired` records.
#[async_trait]
pub trait BatchSource: Send {
    async fn request_batch(
        &mut self,
        spec: &Specification,
        desired: usize,
        deadline: Instant,
    ) -> Result<Vec<Record>, SourceError>;
}

#[async_trait]
impl<S: BatchSource + ?Sized> BatchSource for Box<S> {
    async fn request_batch(
        &mut self,
        spec: &Specification,
        desired: usize,
        deadline: Instant,
    ) -> Result<Vec<Record>, SourceError> {
        (**self).request_batch(spec, desired, deadline).await
    }
}
