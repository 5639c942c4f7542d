use std::path::PathBuf;

use clap::Args;
use recordsmith_core::ModelConfig;
use recordsmith_generate::{BackendHealth, check_health};
use recordsmith_spec::{load_spec, parse_duration};

use crate::CliError;
use crate::registry::{Verbosity, init_logging};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Backend base URL; defaults to the specification's endpoint or localhost.
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Model that must be installed.
    #[arg(long)]
    model: Option<String>,
    /// Take endpoint and model from a specification file.
    #[arg(long, value_name = "FILE")]
    spec: Option<PathBuf>,
    /// Probe timeout.
    #[arg(long, default_value = "5s", value_name = "DURATION")]
    timeout: String,
    /// Print the health report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

pub async fn run(args: DoctorArgs, verbosity: Verbosity) -> Result<(), CliError> {
    init_logging(verbosity, None)?;

    let model_config = match args.spec.as_deref() {
        Some(path) => load_spec(path)?.model,
        None => ModelConfig::default(),
    };
    let endpoint = args.endpoint.unwrap_or(model_config.endpoint);
    let model = args.model.unwrap_or(model_config.name);
    let timeout = parse_duration(&args.timeout)?;

    let health = check_health(&endpoint, timeout).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        print_health(&health, &model);
    }

    if !health.running {
        return Err(CliError::Unhealthy {
            endpoint,
            reason: health
                .error
                .unwrap_or_else(|| "backend is not running".to_string()),
        });
    }
    if !health.has_model(&model) {
        return Err(CliError::Unhealthy {
            endpoint,
            reason: format!("model '{model}' is not installed (run `ollama pull {model}`)"),
        });
    }
    Ok(())
}

fn print_health(health: &BackendHealth, model: &str) {
    let status = if health.running { "running" } else { "unreachable" };
    println!("endpoint: {}", health.endpoint);
    println!("status:   {status}");
    if let Some(version) = &health.version {
        println!("version:  {version}");
    }
    if health.running {
        println!("models:   {}", health.models.len());
        for name in &health.models {
            let marker = if name == model { "*" } else { " " };
            println!("  {marker} {name}");
        }
    }
    if let Some(error) = &health.error {
        println!("error:    {error}");
    }
}
