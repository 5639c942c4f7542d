mod atomic;
mod commands;
mod config;
mod registry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recordsmith_generate::{GenerationError, SinkError};
use recordsmith_spec::{SpecError, ValidationReport};
use thiserror::Error;

use commands::{DoctorArgs, GenerateArgs, InitArgs, ValidateArgs};
use config::ConfigError;
use registry::{RegistryError, Verbosity};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("specification error: {0}")]
    Spec(#[from] SpecError),
    #[error("invalid specification {}", path.display())]
    InvalidSpec {
        path: PathBuf,
        report: ValidationReport,
    },
    #[error("{failed} of {total} specification(s) failed validation")]
    ValidationFailed { failed: usize, total: usize },
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("{} already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),
    #[error("backend at {endpoint} is not usable: {reason}")]
    Unhealthy { endpoint: String, reason: String },
    #[error("output error: {0}")]
    Output(#[from] SinkError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Generation(err) => err.exit_code(),
            CliError::Config(_)
            | CliError::Spec(_)
            | CliError::InvalidSpec { .. }
            | CliError::ValidationFailed { .. }
            | CliError::InvalidArgs(_)
            | CliError::UnknownTemplate(_) => 2,
            CliError::Output(_) => 5,
            CliError::Registry(_)
            | CliError::AlreadyExists(_)
            | CliError::Unhealthy { .. }
            | CliError::Json(_)
            | CliError::Io(_) => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "recordsmith",
    version,
    about = "Generate unique synthetic JSON records with a local LLM"
)]
struct Cli {
    /// Increase console log detail (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate records from a specification.
    Generate(GenerateArgs),
    /// Validate specification files.
    Validate(ValidateArgs),
    /// Write a starter specification from a template.
    Init(InitArgs),
    /// Check that the generation backend is reachable.
    Doctor(DoctorArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Generate(args) => commands::generate::run(args, verbosity).await,
        Command::Validate(args) => commands::validate::run(args, verbosity),
        Command::Init(args) => commands::init::run(args, verbosity),
        Command::Doctor(args) => commands::doctor::run(args, verbosity).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let CliError::InvalidSpec { report, .. } = &err {
                commands::print_report(report);
            }
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
