use thiserror::Error;

/// Core error type shared across Recordsmith crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The specification violates structural invariants.
    #[error("invalid specification: {0}")]
    InvalidSpec(String),
    /// A value could not be interpreted as a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by Recordsmith crates.
pub type Result<T> = std::result::Result<T, Error>;
