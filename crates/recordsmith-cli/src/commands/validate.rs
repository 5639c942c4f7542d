use std::path::{Path, PathBuf};

use clap::Args;
use recordsmith_spec::{ValidationIssue, ValidationReport, load_document, validate_spec};
use serde::Serialize;

use super::print_report;
use crate::CliError;
use crate::registry::{Verbosity, init_logging};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Specification files to check.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Print results as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct FileResult {
    file: String,
    valid: bool,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

pub fn run(args: ValidateArgs, verbosity: Verbosity) -> Result<(), CliError> {
    init_logging(verbosity, None)?;

    let results: Vec<FileResult> = args.files.iter().map(|path| check_file(path)).collect();
    let failed = results.iter().filter(|result| !result.valid).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if verbosity != Verbosity::Quiet {
        for result in &results {
            let status = if result.valid { "valid" } else { "invalid" };
            eprintln!("{}: {status}", result.file);
            print_report(&ValidationReport {
                errors: result.errors.clone(),
                warnings: result.warnings.clone(),
            });
        }
    }

    if failed > 0 {
        return Err(CliError::ValidationFailed {
            failed,
            total: results.len(),
        });
    }
    Ok(())
}

fn check_file(path: &Path) -> FileResult {
    let file = path.display().to_string();
    let outcome = load_document(path)
        .map_err(|err| {
            ValidationReport::from_error(ValidationIssue::error(
                "unreadable_spec",
                "/",
                err.to_string(),
            ))
        })
        .and_then(|document| validate_spec(&document));

    match outcome {
        Ok(validated) => FileResult {
            file,
            valid: true,
            errors: Vec::new(),
            warnings: validated.warnings,
        },
        Err(report) => FileResult {
            file,
            valid: false,
            errors: report.errors,
            warnings: report.warnings,
        },
    }
}
