use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use recordsmith_core::Specification;
use recordsmith_generate::{
    GenerateOptions, GenerationPipeline, GenerationReport, OllamaSource, OutputTarget,
    RetryConfig, StreamSink,
};
use recordsmith_spec::{
    ValidationIssue, load_document, parse_duration, validate_spec, validate_spec_semantics,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::CliError;
use crate::config::{CliConfig, run_timeout};
use crate::registry::{
    RunContext, RunPaths, SpecSummary, Verbosity, init_logging, start_run, write_report,
};

const DEFAULT_RUN_DIR: &str = "runs";

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Specification file (YAML, or JSON by extension).
    #[arg(long, short = 's', value_name = "FILE")]
    spec: PathBuf,
    /// Output path; `-` writes to stdout, a `.gz` suffix compresses.
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<String>,
    /// Override the number of records to generate.
    #[arg(long, short = 'n')]
    count: Option<u64>,
    /// Overall run timeout (ex.: 2h, 90m); 0 disables it.
    #[arg(long, value_name = "DURATION")]
    timeout: Option<String>,
    /// Seed for the backend and fallback synthesis.
    #[arg(long)]
    seed: Option<u64>,
    /// Backend attempts per batch before falling back.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Smallest batch size reached by shrinking.
    #[arg(long)]
    min_batch_size: Option<usize>,
    /// Fail instead of synthesizing records when the backend gives up.
    #[arg(long, default_value_t = false)]
    no_fallback: bool,
    /// Print the effective configuration without generating.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Directory holding per-run artifacts.
    #[arg(long, value_name = "DIR")]
    run_dir: Option<PathBuf>,
    /// TOML config file (defaults to ./recordsmith.toml when present).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Effective inputs printed by `--dry-run`.
#[derive(Serialize)]
struct DryRun<'a> {
    spec: &'a Specification,
    options: &'a GenerateOptions,
    output: String,
}

pub async fn run(args: GenerateArgs, verbosity: Verbosity) -> Result<(), CliError> {
    let config = CliConfig::load(args.config.as_deref())?;

    let document = load_document(&args.spec)?;
    let validated = validate_spec(&document).map_err(|report| CliError::InvalidSpec {
        path: args.spec.clone(),
        report,
    })?;
    let mut spec = validated.spec;
    if let Some(count) = args.count {
        spec.dataset.count = count;
        let report = validate_spec_semantics(&spec);
        if !report.is_ok() {
            return Err(CliError::InvalidSpec {
                path: args.spec.clone(),
                report,
            });
        }
    }

    // Precedence: flags, then the config file, then the model timeout of the specification file.
    let mut base = RetryConfig::default();
    if let Some(timeout) = spec.model.timeout.as_deref() {
        let timeout = parse_duration(timeout)?;
        base = base.with_base_timeout(timeout);
        if timeout > base.max_timeout() {
            base = base.with_max_timeout(timeout);
        }
    }
    let mut options = config.generate_options(base)?;
    if let Some(timeout) = args.timeout.as_deref() {
        options = options.with_run_timeout(run_timeout(timeout)?);
    }
    let seed = args.seed.or(config.run.seed);
    if let Some(seed) = seed {
        options = options.with_seed(seed);
    }
    if let Some(attempts) = args.max_retries {
        options.retry = options.retry.with_max_attempts(attempts);
    }
    if let Some(size) = args.min_batch_size {
        options.retry = options.retry.with_min_batch_size(size);
    }
    if args.no_fallback {
        options.retry = options.retry.with_fallback(false);
    }
    options.retry.validate().map_err(CliError::InvalidArgs)?;

    let output = args
        .output
        .or_else(|| config.output.path.clone())
        .unwrap_or_else(|| "-".to_string());
    let target = OutputTarget::parse(&output);

    if args.dry_run {
        init_logging(verbosity, None)?;
        log_warnings(&validated.warnings);
        let plan = DryRun {
            spec: &spec,
            options: &options,
            output: target.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: Utc::now(),
        run_dir: args
            .run_dir
            .or_else(|| config.run.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUN_DIR)),
        spec_path: args.spec.clone(),
        output: target.to_string(),
        options: options.clone(),
        spec: SpecSummary::from_spec(&spec),
    };
    let run_paths = start_run(&run_ctx)?;
    init_logging(verbosity, Some(&run_paths.logs_path))?;
    log_warnings(&validated.warnings);

    info!(
        event = "run_started",
        run_id = %run_id,
        spec = %args.spec.display(),
        output = %target,
        config = %run_paths.config_path.display()
    );

    let sink = StreamSink::open(&target, options.buffer_limit)?;
    let source = OllamaSource::new().with_seed(seed);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let show_progress = verbosity == Verbosity::Normal;
    let mut pipeline = GenerationPipeline::new(source, sink, options).with_run_id(run_id.clone());
    if show_progress {
        pipeline = pipeline.with_progress(|progress| {
            eprint!(
                "\r{}/{} records ({:.1}%), {:.1} rec/s",
                progress.generated,
                progress.target,
                progress.percent(),
                progress.rate
            );
        });
    }

    let outcome = pipeline.run(&spec, cancel).await;
    if show_progress {
        eprintln!();
    }

    match outcome {
        Ok(result) => {
            write_report(&run_paths, &result.report)?;
            info!(
                event = "run_finished",
                status = result.report.status.as_str(),
                generated = result.report.generated,
                duration_ms = result.report.duration_ms
            );
            if verbosity != Verbosity::Quiet {
                print_summary(&result.report, &run_paths);
            }
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                write_report(&run_paths, report)?;
                error!(
                    event = "run_finished",
                    status = report.status.as_str(),
                    generated = report.generated,
                    error = %err
                );
                if verbosity != Verbosity::Quiet {
                    print_summary(report, &run_paths);
                }
            }
            Err(err.into())
        }
    }
}

fn log_warnings(warnings: &[ValidationIssue]) {
    for issue in warnings {
        warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
    }
}

fn print_summary(report: &GenerationReport, paths: &RunPaths) {
    eprintln!(
        "{}: {}/{} records in {:.1}s ({:.1} rec/s), {} duplicates, {} fallback batches",
        report.status.as_str(),
        report.generated,
        report.target,
        report.duration_ms as f64 / 1000.0,
        report.records_per_sec,
        report.duplicates,
        report.fallback_batches,
    );
    eprintln!("report: {}", paths.report_path.display());
}
