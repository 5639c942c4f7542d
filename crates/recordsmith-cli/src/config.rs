use std::path::{Path, PathBuf};
use std::time::Duration;

use recordsmith_generate::{GenerateOptions, NormalizationPolicy, RetryConfig};
use recordsmith_spec::parse_duration;
use serde::Deserialize;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "recordsmith.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("toml decode error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of `recordsmith.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub retry: RetrySection,
    pub output: OutputSection,
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    /// Per-request timeout, as a duration string.
    pub base_timeout: Option<String>,
    pub max_timeout: Option<String>,
    pub backoff_multiplier: Option<f64>,
    pub shrink_factor: Option<f64>,
    pub min_batch_size: Option<usize>,
    pub fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub path: Option<String>,
    pub buffer_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub dir: Option<PathBuf>,
    /// Overall wall-clock budget; `"0"` disables it.
    pub timeout: Option<String>,
    pub seed: Option<u64>,
    pub max_stalled_batches: Option<u32>,
    pub trim_strings: Option<bool>,
    pub sort_scalar_lists: Option<bool>,
}

impl CliConfig {
    /// Load `explicit`, or `recordsmith.toml` when it exists, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Retry knobs from the file layered over `base`.
    pub fn retry_config(&self, base: RetryConfig) -> Result<RetryConfig, ConfigError> {
        let section = &self.retry;
        let mut retry = base;
        if let Some(attempts) = section.max_attempts {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(timeout) = section.base_timeout.as_deref() {
            retry = retry.with_base_timeout(duration(timeout, "retry.base_timeout")?);
        }
        if let Some(timeout) = section.max_timeout.as_deref() {
            retry = retry.with_max_timeout(duration(timeout, "retry.max_timeout")?);
        }
        if let Some(multiplier) = section.backoff_multiplier {
            retry = retry.with_backoff_multiplier(multiplier);
        }
        if let Some(factor) = section.shrink_factor {
            retry = retry.with_shrink_factor(factor);
        }
        if let Some(size) = section.min_batch_size {
            retry = retry.with_min_batch_size(size);
        }
        if let Some(enabled) = section.fallback {
            retry = retry.with_fallback(enabled);
        }
        Ok(retry)
    }

    /// Pipeline options from the file; retry knobs are layered over `retry`.
    pub fn generate_options(&self, retry: RetryConfig) -> Result<GenerateOptions, ConfigError> {
        let mut options = GenerateOptions::default().with_retry(self.retry_config(retry)?);
        if let Some(timeout) = self.run.timeout.as_deref() {
            options = options.with_run_timeout(run_timeout(timeout)?);
        }
        if let Some(seed) = self.run.seed {
            options = options.with_seed(seed);
        }
        if let Some(limit) = self.run.max_stalled_batches {
            options.max_stalled_batches = limit;
        }
        if let Some(limit) = self.output.buffer_limit {
            options.buffer_limit = limit;
        }
        let defaults = NormalizationPolicy::default();
        options.normalization = NormalizationPolicy {
            trim_strings: self.run.trim_strings.unwrap_or(defaults.trim_strings),
            sort_scalar_lists: self
                .run
                .sort_scalar_lists
                .unwrap_or(defaults.sort_scalar_lists),
        };
        Ok(options)
    }
}

/// Parse a run timeout; zero means no deadline.
pub fn run_timeout(value: &str) -> Result<Option<Duration>, ConfigError> {
    let timeout = duration(value, "run.timeout")?;
    Ok((!timeout.is_zero()).then_some(timeout))
}

fn duration(value: &str, key: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|err| ConfigError::Invalid(format!("{key}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_keeps_defaults() {
        let config = CliConfig::parse("").expect("parse");
        let options = config
            .generate_options(RetryConfig::default())
            .expect("options");
        assert_eq!(options, GenerateOptions::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = CliConfig::parse(
            r#"
[retry]
max_attempts = 5
base_timeout = "10s"
max_timeout = "2m"
fallback = false

[output]
path = "out/records.jsonl.gz"
buffer_limit = 250

[run]
timeout = "30m"
seed = 7
trim_strings = false
"#,
        )
        .expect("parse");

        let options = config
            .generate_options(RetryConfig::default())
            .expect("options");
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.retry.base_timeout(), Duration::from_secs(10));
        assert_eq!(options.retry.max_timeout(), Duration::from_secs(120));
        assert!(!options.retry.fallback);
        assert_eq!(options.buffer_limit, 250);
        assert_eq!(options.run_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(options.seed, 7);
        assert!(!options.normalization.trim_strings);
        assert!(options.normalization.sort_scalar_lists);
        assert_eq!(config.output.path.as_deref(), Some("out/records.jsonl.gz"));
    }

    #[test]
    fn zero_run_timeout_disables_the_deadline() {
        let config = CliConfig::parse("[run]\ntimeout = \"0\"\n").expect("parse");
        let options = config
            .generate_options(RetryConfig::default())
            .expect("options");
        assert_eq!(options.run_timeout(), None);
    }

    #[test]
    fn file_values_layer_over_the_given_retry_base() {
        let config = CliConfig::parse("[retry]\nmax_attempts = 4\n").expect("parse");
        let base = RetryConfig::default().with_base_timeout(Duration::from_secs(45));
        let retry = config.retry_config(base).expect("retry");
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_durations() {
        assert!(matches!(
            CliConfig::parse("[retry]\nattempts = 3\n"),
            Err(ConfigError::Toml(_))
        ));

        let config = CliConfig::parse("[run]\ntimeout = \"soon\"\n").expect("parse");
        let err = config
            .generate_options(RetryConfig::default())
            .expect_err("bad duration");
        assert!(err.to_string().contains("run.timeout"));
    }
}
