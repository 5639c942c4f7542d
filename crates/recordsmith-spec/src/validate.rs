use std::collections::HashSet;

use jsonschema::JSONSchema;
use recordsmith_core::{
    Field, FieldType, MAX_BATCH_SIZE, MAX_FIELDS, MAX_RECORD_COUNT, Specification,
};
use regex::Regex;
use serde_json::Value;

use crate::errors::{IssueSeverity, SpecError, ValidationIssue, ValidationReport};
use crate::load::{parse_duration, spec_from_document};
use crate::schema::spec_json_schema_value;

const MAX_FIELD_NAME_LEN: usize = 50;

/// Validated specification with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    pub spec: Specification,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a specification document against the specification JSON Schema.
pub fn validate_spec_json(
    spec_json: &Value,
    spec_schema: &Value,
) -> Result<ValidationReport, SpecError> {
    let compiled =
        JSONSchema::compile(spec_schema).map_err(|err| SpecError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(spec_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }

    Ok(report)
}

/// Check the semantic rules a parsed specification must satisfy.
pub fn validate_spec_semantics(spec: &Specification) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_model(spec, &mut report);
    validate_dataset(spec, &mut report);

    report
}

/// Validate the specification end-to-end, returning structured issues on failure.
pub fn validate_spec(spec_json: &Value) -> Result<ValidatedSpec, ValidationReport> {
    let structural = spec_json_schema_value()
        .and_then(|schema| validate_spec_json(spec_json, &schema))
        .map_err(|err| {
            ValidationReport::from_error(ValidationIssue::error(
                "schema_validation_error",
                "/",
                err.to_string(),
            ))
        })?;

    if !structural.is_ok() {
        return Err(structural);
    }

    let spec = spec_from_document(spec_json).map_err(|err| {
        ValidationReport::from_error(ValidationIssue::error(
            "invalid_spec_document",
            "/",
            err.to_string(),
        ))
    })?;

    let semantic = validate_spec_semantics(&spec);
    if !semantic.is_ok() {
        return Err(semantic);
    }

    Ok(ValidatedSpec {
        spec,
        warnings: semantic.warnings,
    })
}

fn validate_model(spec: &Specification, report: &mut ValidationReport) {
    let model = &spec.model;

    if model.name.trim().is_empty() {
        report.push_error(
            ValidationIssue::error("missing_model", "/model/name", "model name is required")
                .with_hint("set model.name (ex.: llama3.1:8b)"),
        );
    }

    if model.batch_size == 0 {
        report.push_error(
            ValidationIssue::error(
                "invalid_batch_size",
                "/model/batch_size",
                "batch size must be positive",
            )
            .with_hint("set batch_size to a positive integer"),
        );
    } else if model.batch_size > MAX_BATCH_SIZE {
        report.push_error(ValidationIssue::error(
            "batch_size_too_large",
            "/model/batch_size",
            format!(
                "batch size too large (max {MAX_BATCH_SIZE}), got {}",
                model.batch_size
            ),
        ));
    }

    if !(0.0..=2.0).contains(&model.temperature) {
        report.push_error(ValidationIssue::error(
            "invalid_temperature",
            "/model/temperature",
            format!(
                "temperature must be between 0 and 2, got {:.2}",
                model.temperature
            ),
        ));
    }

    if !model.endpoint.starts_with("http://") && !model.endpoint.starts_with("https://") {
        report.push_error(
            ValidationIssue::error(
                "invalid_endpoint",
                "/model/endpoint",
                format!("endpoint '{}' is not an HTTP/HTTPS URL", model.endpoint),
            )
            .with_hint("use a URL such as http://localhost:11434"),
        );
    }

    if let Some(timeout) = &model.timeout {
        match parse_duration(timeout) {
            Ok(duration) if !duration.is_zero() => {}
            Ok(_) => report.push_error(ValidationIssue::error(
                "invalid_timeout",
                "/model/timeout",
                "timeout must be greater than zero",
            )),
            Err(err) => report.push_error(
                ValidationIssue::error("invalid_timeout", "/model/timeout", err.to_string())
                    .with_hint("use a duration such as 30s, 5m or 1h30m"),
            ),
        }
    }
}

fn validate_dataset(spec: &Specification, report: &mut ValidationReport) {
    let dataset = &spec.dataset;

    if dataset.count == 0 {
        report.push_error(
            ValidationIssue::error(
                "invalid_count",
                "/dataset/count",
                "record count must be positive",
            )
            .with_hint("set count to a positive integer"),
        );
    } else if dataset.count > MAX_RECORD_COUNT {
        report.push_error(ValidationIssue::error(
            "count_too_large",
            "/dataset/count",
            format!(
                "record count too large (max {MAX_RECORD_COUNT}), got {}",
                dataset.count
            ),
        ));
    }

    if dataset.domain.trim().is_empty() {
        report.push_error(ValidationIssue::error(
            "missing_domain",
            "/dataset/domain",
            "domain description is required",
        ));
    }

    if dataset.fields.is_empty() {
        report.push_error(
            ValidationIssue::error(
                "missing_fields",
                "/dataset/fields",
                "at least one field is required",
            )
            .with_hint("declare the fields each record should carry"),
        );
        return;
    }

    if dataset.fields.len() > MAX_FIELDS {
        report.push_error(ValidationIssue::error(
            "too_many_fields",
            "/dataset/fields",
            format!(
                "too many fields (max {MAX_FIELDS}), got {}",
                dataset.fields.len()
            ),
        ));
    }

    let mut seen = HashSet::new();
    for (idx, field) in dataset.fields.iter().enumerate() {
        let base_path = format!("/dataset/fields/{idx}");
        validate_field(field, &base_path, report);

        if !seen.insert(field.name.as_str()) {
            report.push_error(
                ValidationIssue::error(
                    "duplicate_field",
                    format!("{base_path}/name"),
                    format!("duplicate field name: {}", field.name),
                )
                .with_hint("field names must be unique within a dataset"),
            );
        }
    }

    if !dataset.fields.iter().any(|field| field.required) {
        report.push_warning(
            ValidationIssue::warning(
                "no_required_fields",
                "/dataset/fields",
                "no field is marked as required",
            )
            .with_hint("mark the identifying fields as required to reject sparse records"),
        );
    }
}

fn validate_field(field: &Field, base_path: &str, report: &mut ValidationReport) {
    if !is_valid_field_name(&field.name) {
        report.push_error(ValidationIssue::error(
            "invalid_field_name",
            format!("{base_path}/name"),
            format!(
                "invalid field name '{}' (letters, digits and underscores, \
                 not starting with a digit, at most {MAX_FIELD_NAME_LEN} characters)",
                field.name
            ),
        ));
    }

    if field.field_type == FieldType::Enum && field.values.is_empty() {
        report.push_error(
            ValidationIssue::error(
                "enum_without_values",
                format!("{base_path}/values"),
                format!("enum field '{}' requires values", field.name),
            )
            .with_hint("list the allowed values under `values`"),
        );
    }

    if field.field_type != FieldType::Enum && !field.values.is_empty() {
        report.push_warning(ValidationIssue::warning(
            "values_on_non_enum",
            format!("{base_path}/values"),
            format!(
                "values are ignored for {} field '{}'",
                field.field_type, field.name
            ),
        ));
    }

    if !field.range.is_empty() {
        if !field.field_type.is_numeric() {
            report.push_warning(ValidationIssue::warning(
                "range_on_non_numeric",
                format!("{base_path}/range"),
                format!(
                    "range is ignored for {} field '{}'",
                    field.field_type, field.name
                ),
            ));
        }
        match field.bounds() {
            Some((min, max)) if min < max => {}
            Some((min, max)) => report.push_error(ValidationIssue::error(
                "invalid_range",
                format!("{base_path}/range"),
                format!("range min ({min}) must be less than max ({max})"),
            )),
            None => report.push_error(ValidationIssue::error(
                "invalid_range",
                format!("{base_path}/range"),
                "range must have exactly 2 values [min, max]",
            )),
        }
    }

    if let Some(pattern) = &field.pattern {
        if let Err(err) = Regex::new(pattern) {
            report.push_error(ValidationIssue::error(
                "invalid_pattern",
                format!("{base_path}/pattern"),
                format!("invalid regex pattern '{pattern}': {err}"),
            ));
        }
    }
}

fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_FIELD_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_follow_identifier_rules() {
        assert!(is_valid_field_name("created_at"));
        assert!(is_valid_field_name("_internal2"));
        assert!(!is_valid_field_name("2fast"));
        assert!(!is_valid_field_name("with-dash"));
        assert!(!is_valid_field_name(""));
        assert!(!is_valid_field_name(&"a".repeat(51)));
    }
}
