use std::fs;
use std::path::Path;
use std::time::Duration;

use recordsmith_core::Specification;
use serde_json::Value;

use crate::errors::{Result, SpecError};

/// Per-request timeout applied when a document does not set one.
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";

/// Field names that are always treated as required.
const PRIMARY_FIELDS: [&str; 3] = ["id", "email", "name"];

/// Serialization format of a specification document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Json,
}

impl SpecFormat {
    /// Pick the format from the file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }
}

/// Read a specification document without interpreting it.
pub fn load_document(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)?;
    parse_document(&contents, SpecFormat::from_path(path))
}

pub fn parse_document(contents: &str, format: SpecFormat) -> Result<Value> {
    let document = match format {
        SpecFormat::Json => serde_json::from_str(contents)?,
        SpecFormat::Yaml => serde_yaml::from_str(contents)?,
    };
    Ok(document)
}

/// Load a specification file and apply defaults.
pub fn load_spec(path: &Path) -> Result<Specification> {
    let document = load_document(path)?;
    spec_from_document(&document)
}

pub fn parse_yaml(contents: &str) -> Result<Specification> {
    let document = parse_document(contents, SpecFormat::Yaml)?;
    spec_from_document(&document)
}

pub fn parse_json(contents: &str) -> Result<Specification> {
    let document = parse_document(contents, SpecFormat::Json)?;
    spec_from_document(&document)
}

/// Deserialize a parsed document and apply defaults.
pub fn spec_from_document(document: &Value) -> Result<Specification> {
    let mut spec: Specification = serde_json::from_value(document.clone())?;
    apply_defaults(&mut spec);
    Ok(spec)
}

/// Fill blank values left after deserialization.
///
/// Serde defaults cover absent keys; this also covers keys present with an
/// empty value and marks the primary fields as required.
pub fn apply_defaults(spec: &mut Specification) {
    let defaults = recordsmith_core::ModelConfig::default();
    if spec.model.endpoint.trim().is_empty() {
        spec.model.endpoint = defaults.endpoint;
    }
    if spec.model.name.trim().is_empty() {
        spec.model.name = defaults.name;
    }
    if spec
        .model
        .timeout
        .as_deref()
        .is_none_or(|timeout| timeout.trim().is_empty())
    {
        spec.model.timeout = Some(DEFAULT_REQUEST_TIMEOUT.to_string());
    }
    if spec.dataset.domain.trim().is_empty() {
        spec.dataset.domain = "Generic data".to_string();
    }

    for field in &mut spec.dataset.fields {
        if PRIMARY_FIELDS.contains(&field.name.as_str()) {
            field.required = true;
        }
    }
}

/// Render a specification as YAML.
pub fn to_yaml(spec: &Specification) -> Result<String> {
    Ok(serde_yaml::to_string(spec)?)
}

/// Parse a duration such as `30s`, `5m`, `2h`, `1h30m`, `1.5h` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(SpecError::Duration(input.to_string()));
    }

    let invalid = || SpecError::Duration(input.to_string());
    let mut total = 0.0_f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let amount: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += amount * seconds;
    }

    if !total.is_finite() {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("30s").expect("30s"), Duration::from_secs(30));
        assert_eq!(parse_duration("2h").expect("2h"), Duration::from_secs(7200));
        assert_eq!(
            parse_duration("1h30m").expect("1h30m"),
            Duration::from_secs(5400)
        );
        assert_eq!(
            parse_duration("250ms").expect("250ms"),
            Duration::from_millis(250)
        );
        assert_eq!(
            parse_duration("1.5h").expect("1.5h"),
            Duration::from_secs(5400)
        );
    }

    #[test]
    fn rejects_malformed_durations() {
        for input in ["", "30", "s", "10x", "1h-5m"] {
            assert!(parse_duration(input).is_err(), "{input} should fail");
        }
    }

    #[test]
    fn defaults_fill_blank_values_and_primary_fields() {
        let spec = parse_yaml(
            r#"
model:
  endpoint: ""
dataset:
  domain: ""
  fields:
    - name: id
      type: integer
    - name: note
"#,
        )
        .expect("parse yaml");

        assert_eq!(spec.model.endpoint, "http://localhost:11434");
        assert_eq!(spec.model.timeout.as_deref(), Some("30s"));
        assert_eq!(spec.dataset.domain, "Generic data");
        assert!(spec.dataset.fields[0].required);
        assert!(!spec.dataset.fields[1].required);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SpecFormat::from_path(Path::new("a.json")), SpecFormat::Json);
        assert_eq!(SpecFormat::from_path(Path::new("a.yml")), SpecFormat::Yaml);
        assert_eq!(SpecFormat::from_path(Path::new("spec")), SpecFormat::Yaml);
    }
}
