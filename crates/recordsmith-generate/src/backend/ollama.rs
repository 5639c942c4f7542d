use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recordsmith_core::{Record, Specification};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::source::{BatchSource, FailureKind, SourceError};

/// Share of required fields a parsed record must carry to be kept.
const REQUIRED_FIELD_RATIO: f64 = 0.8;

/// [`BatchSource`] backed by an Ollama `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaSource {
    client: reqwest::Client,
    seed: Option<u64>,
    requests: u64,
}

impl Default for OllamaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            seed: None,
            requests: 0,
        }
    }

    /// Pass a per-request seed derived from `seed` to the backend.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Requests issued so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl BatchSource for OllamaSource {
    async fn request_batch(
        &mut self,
        spec: &Specification,
        desired: usize,
        deadline: Instant,
    ) -> Result<Vec<Record>, SourceError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(SourceError::timeout("deadline passed before the request"));
        }

        let mut options = serde_json::Map::new();
        options.insert("temperature".to_string(), json!(spec.model.temperature));
        if let Some(seed) = self.seed {
            options.insert("seed".to_string(), json!(seed.wrapping_add(self.requests)));
        }
        let body = json!({
            "model": spec.model.name,
            "prompt": build_prompt(spec, desired),
            "stream": false,
            "options": options,
        });
        self.requests += 1;

        let url = format!("{}/api/generate", endpoint_base(&spec.model.endpoint));
        let response = self
            .client
            .post(&url)
            .timeout(budget)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_request_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::unavailable(format!(
                "unexpected status {status}: {}",
                text.trim()
            )));
        }

        let payload: GenerateResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                SourceError::timeout(err.to_string())
            } else {
                SourceError::malformed(format!("failed to decode response: {err}"))
            }
        })?;
        if let Some(error) = payload.error.filter(|error| !error.is_empty()) {
            return Err(SourceError::unavailable(format!("backend error: {error}")));
        }

        debug!(
            chars = payload.response.len(),
            desired, "received backend response"
        );
        let records = parse_response(&payload.response, spec);
        if records.is_empty() {
            return Err(SourceError::malformed(
                "could not parse any valid JSON records from the response",
            ));
        }
        Ok(records)
    }
}

fn classify_request_error(err: &reqwest::Error) -> SourceError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_status() {
        FailureKind::Unavailable
    } else if err.is_decode() || err.is_body() {
        FailureKind::Malformed
    } else {
        FailureKind::Transport
    };
    SourceError::new(kind, err.to_string())
}

fn endpoint_base(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

/// Generation prompt for `count` records of `spec`.
pub fn build_prompt(spec: &Specification, count: usize) -> String {
    let mut prompt = format!(
        "Generate {count} unique JSON records for {}.\n\n\
         Each record should be a valid JSON object with the following fields:\n",
        spec.dataset.domain
    );

    for field in &spec.dataset.fields {
        prompt.push_str(&format!("- {} ({})", field.name, field.field_type));
        if field.required {
            prompt.push_str(" [required]");
        }
        if let Some(description) = field.description.as_deref().filter(|d| !d.is_empty()) {
            prompt.push_str(&format!(": {description}"));
        }
        if let Some(pattern) = field.pattern.as_deref().filter(|p| !p.is_empty()) {
            prompt.push_str(&format!(" (pattern: {pattern})"));
        }
        if let Some((min, max)) = field.bounds() {
            prompt.push_str(&format!(" (range: {min}-{max})"));
        }
        if !field.values.is_empty() {
            prompt.push_str(&format!(" (values: {})", field.values.join(", ")));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRequirements:\n\
         - Each record must be unique\n\
         - Output only valid JSON objects, one per line\n\
         - Follow the field constraints exactly\n\
         - Make the data realistic and diverse\n\
         - Do not include any explanatory text\n\n\
         Generate the records now:",
    );
    prompt
}

/// Extract records from free-form model output.
///
/// Top-level `{...}` spans are located with a string-aware scanner, parsed
/// (with trailing commas repaired when needed) and kept when they carry
/// enough of the required fields.
pub fn parse_response(text: &str, spec: &Specification) -> Vec<Record> {
    object_spans(text)
        .into_iter()
        .filter_map(|span| parse_object(span))
        .filter(|record| has_required_fields(record, spec))
        .collect()
}

fn parse_object(span: &str) -> Option<Record> {
    let value = serde_json::from_str::<serde_json::Value>(span)
        .or_else(|_| serde_json::from_str(&strip_trailing_commas(span)))
        .ok()?;
    Record::try_from(value).ok()
}

fn has_required_fields(record: &Record, spec: &Specification) -> bool {
    let required: Vec<_> = spec.required_fields().collect();
    if required.is_empty() {
        return !record.is_empty();
    }
    let present = required
        .iter()
        .filter(|field| record.contains_key(&field.name))
        .count();
    present as f64 / required.len() as f64 >= REQUIRED_FIELD_RATIO
}

/// Balanced top-level object spans, ignoring braces inside strings.
fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn strip_trailing_commas(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = span.chars().collect();

    for (idx, ch) in chars.iter().enumerate() {
        let ch = *ch;
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Result of probing an Ollama endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub endpoint: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl BackendHealth {
    /// True when `name` is installed; an untagged name matches `:latest`.
    pub fn has_model(&self, name: &str) -> bool {
        self.models.iter().any(|model| {
            model == name
                || (!name.contains(':')
                    && model.strip_suffix(":latest").is_some_and(|base| base == name))
        })
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Probe `/api/version` and `/api/tags`. Failures are reported in the
/// returned health value rather than as errors.
pub async fn check_health(endpoint: &str, timeout: Duration) -> BackendHealth {
    let mut health = BackendHealth {
        endpoint: endpoint.to_string(),
        running: false,
        version: None,
        models: Vec::new(),
        error: None,
        checked_at: Utc::now(),
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            health.error = Some(format!("failed to build client: {err}"));
            return health;
        }
    };
    let base = endpoint_base(endpoint);

    match fetch_json::<VersionResponse>(&client, &format!("{base}/api/version")).await {
        Ok(version) => health.version = Some(version.version),
        Err(err) => {
            health.error = Some(format!("failed to get version: {err}"));
            return health;
        }
    }

    match fetch_json::<TagsResponse>(&client, &format!("{base}/api/tags")).await {
        Ok(tags) => {
            health.models = tags.models.into_iter().map(|model| model.name).collect();
            health.running = true;
        }
        Err(err) => health.error = Some(format!("failed to list models: {err}")),
    }
    health
}

async fn fetch_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, reqwest::Error> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<T>()
        .await
}
