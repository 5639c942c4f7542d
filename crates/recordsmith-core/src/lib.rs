//! Core contracts shared across Recordsmith crates.
//!
//! This crate defines the record value model flowing through the generation
//! pipeline, the declarative specification types, and the structural
//! invariants every other crate relies on.

pub mod error;
pub mod record;
pub mod spec;
pub mod validation;
pub mod value;

pub use error::{Error, Result};
pub use record::Record;
pub use spec::{DatasetConfig, Field, FieldType, ModelConfig, Specification};
pub use validation::validate_spec;
pub use value::Value;

/// Upper bound on records requested by a single specification.
pub const MAX_RECORD_COUNT: u64 = 10_000_000;

/// Upper bound on the configured batch size.
pub const MAX_BATCH_SIZE: u32 = 1000;

/// Upper bound on fields declared by a dataset.
pub const MAX_FIELDS: usize = 100;
