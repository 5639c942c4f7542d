use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use recordsmith_core::Specification;
use recordsmith_generate::{GenerateOptions, GenerationReport};
use serde::Serialize;

use super::{RegistryError, RegistryResult};

/// Specification facts recorded with each run.
#[derive(Debug, Clone, Serialize)]
pub struct SpecSummary {
    pub model: String,
    pub endpoint: String,
    pub domain: String,
    pub count: u64,
    pub batch_size: u32,
    pub temperature: f64,
    pub fields: Vec<String>,
}

impl SpecSummary {
    pub fn from_spec(spec: &Specification) -> Self {
        Self {
            model: spec.model.name.clone(),
            endpoint: spec.model.endpoint.clone(),
            domain: spec.dataset.domain.clone(),
            count: spec.dataset.count,
            batch_size: spec.model.batch_size,
            temperature: spec.model.temperature,
            fields: spec
                .dataset
                .fields
                .iter()
                .map(|field| field.name.clone())
                .collect(),
        }
    }
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub run_dir: PathBuf,
    pub spec_path: PathBuf,
    pub output: String,
    pub options: GenerateOptions,
    pub spec: SpecSummary,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub spec_path: String,
    pub output: String,
    pub options: GenerateOptions,
    pub spec: SpecSummary,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
    pub report_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let report_path = root.join("generation_report.json");

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        spec_path: ctx.spec_path.display().to_string(),
        output: ctx.output.clone(),
        options: ctx.options.clone(),
        spec: ctx.spec.clone(),
        git: collect_git_info(),
    };

    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        config_path,
        logs_path,
        report_path,
    })
}

pub fn write_report(paths: &RunPaths, report: &GenerationReport) -> RegistryResult<()> {
    write_json(&paths.report_path, report)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
