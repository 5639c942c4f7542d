use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::spec::{FieldType, Specification};
use crate::{MAX_BATCH_SIZE, MAX_FIELDS, MAX_RECORD_COUNT};

/// Validate the structural invariants of a specification.
///
/// This checks:
/// - target count and batch size are positive and bounded
/// - at least one field is declared, without duplicates
/// - enum fields carry values and ranges are well-formed
pub fn validate_spec(spec: &Specification) -> Result<()> {
    let count = spec.dataset.count;
    if count == 0 || count > MAX_RECORD_COUNT {
        return Err(Error::InvalidSpec(format!(
            "record count must be in 1..={MAX_RECORD_COUNT}, got {count}"
        )));
    }

    let batch_size = spec.model.batch_size;
    if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
        return Err(Error::InvalidSpec(format!(
            "batch size must be in 1..={MAX_BATCH_SIZE}, got {batch_size}"
        )));
    }

    let fields = &spec.dataset.fields;
    if fields.is_empty() {
        return Err(Error::InvalidSpec(
            "at least one field is required".to_string(),
        ));
    }
    if fields.len() > MAX_FIELDS {
        return Err(Error::InvalidSpec(format!(
            "too many fields (max {MAX_FIELDS}), got {}",
            fields.len()
        )));
    }

    let mut names = BTreeSet::new();
    for field in fields {
        if field.name.is_empty() {
            return Err(Error::InvalidSpec("field name is required".to_string()));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidSpec(format!(
                "duplicate field name: {}",
                field.name
            )));
        }
        if field.field_type == FieldType::Enum && field.values.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "enum field '{}' requires values",
                field.name
            )));
        }
        if !field.range.is_empty() {
            match field.bounds() {
                Some((min, max)) if min < max => {}
                _ => {
                    return Err(Error::InvalidSpec(format!(
                        "field '{}' range must be [min, max] with min < max",
                        field.name
                    )));
                }
            }
        }
    }

    Ok(())
}
