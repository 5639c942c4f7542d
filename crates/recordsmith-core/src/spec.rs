use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declarative dataset description consumed by the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Specification {
    /// Generative backend configuration.
    pub model: ModelConfig,
    /// Dataset shape and target size.
    pub dataset: DatasetConfig,
}

impl Specification {
    /// Number of unique records to produce.
    pub fn target(&self) -> u64 {
        self.dataset.count
    }

    /// Configured batch size for backend requests.
    pub fn batch_size(&self) -> usize {
        self.model.batch_size as usize
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.dataset.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.dataset.fields.iter().filter(|field| field.required)
    }
}

/// Generative backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelConfig {
    /// Base URL of the backend (ex.: `http://localhost:11434`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier served by the backend.
    #[serde(default = "default_model")]
    pub name: String,
    /// Records requested per backend call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Sampling temperature; lower is more deterministic.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-request timeout as a duration string (ex.: `30s`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            name: default_model(),
            batch_size: default_batch_size(),
            temperature: default_temperature(),
            timeout: None,
        }
    }
}

/// Dataset shape and target size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatasetConfig {
    /// Number of unique records to generate.
    #[serde(default = "default_count")]
    pub count: u64,
    /// Free-text description of the data domain.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Ordered field declarations.
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// Regular expression the value should match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Inclusive `[min, max]` bounds for numeric fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range: Vec<i64>,
    /// Allowed values for enum fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: None,
            required: false,
            pattern: None,
            range: Vec::new(),
            values: Vec::new(),
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = vec![min, max];
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Range bounds when exactly two values were declared.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self.range.as_slice() {
            [min, max] => Some((*min, *max)),
            _ => None,
        }
    }
}

/// Declared type tag of a field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
    Date,
    Time,
    Email,
    Url,
    Uuid,
    Phone,
    Enum,
    Object,
    Array,
}

impl FieldType {
    pub const ALL: [FieldType; 15] = [
        FieldType::String,
        FieldType::Text,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Datetime,
        FieldType::Date,
        FieldType::Time,
        FieldType::Email,
        FieldType::Url,
        FieldType::Uuid,
        FieldType::Phone,
        FieldType::Enum,
        FieldType::Object,
        FieldType::Array,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Uuid => "uuid",
            FieldType::Phone => "phone",
            FieldType::Enum => "enum",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_batch_size() -> u32 {
    32
}

fn default_temperature() -> f64 {
    0.7
}

fn default_count() -> u64 {
    1000
}

fn default_domain() -> String {
    "Generic data".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}
