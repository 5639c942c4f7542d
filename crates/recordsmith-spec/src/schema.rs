use schemars::schema::RootSchema;
use schemars::schema_for;

use recordsmith_core::Specification;

use crate::errors::Result;

/// Emit the JSON Schema for specification documents.
pub fn spec_json_schema() -> RootSchema {
    schema_for!(Specification)
}

/// The specification JSON Schema as a `serde_json::Value`, ready to compile.
pub fn spec_json_schema_value() -> Result<serde_json::Value> {
    Ok(serde_json::to_value(spec_json_schema())?)
}
