//! Specification loading, defaults, validation and built-in templates.

pub mod errors;
pub mod load;
pub mod schema;
pub mod templates;
pub mod validate;

pub use errors::{IssueSeverity, Result, SpecError, ValidationIssue, ValidationReport};
pub use load::{
    SpecFormat, apply_defaults, load_document, load_spec, parse_document, parse_duration,
    parse_json, parse_yaml, spec_from_document, to_yaml,
};
pub use schema::{spec_json_schema, spec_json_schema_value};
pub use templates::{template, template_names};
pub use validate::{ValidatedSpec, validate_spec, validate_spec_json, validate_spec_semantics};
