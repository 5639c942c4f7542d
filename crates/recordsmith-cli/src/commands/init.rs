use std::path::PathBuf;

use clap::Args;
use recordsmith_spec::{SpecFormat, template, template_names, to_yaml};
use tracing::info;

use crate::CliError;
use crate::atomic::write_bytes_atomic;
use crate::registry::{Verbosity, init_logging};

const DEFAULT_TEMPLATE: &str = "basic";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the specification (`.json` writes JSON).
    #[arg(default_value = "recordsmith.yaml", value_name = "PATH")]
    path: PathBuf,
    /// Template to start from.
    #[arg(long, short = 't')]
    template: Option<String>,
    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    force: bool,
    /// List available templates and exit.
    #[arg(long, default_value_t = false)]
    list: bool,
}

pub fn run(args: InitArgs, verbosity: Verbosity) -> Result<(), CliError> {
    init_logging(verbosity, None)?;

    if args.list {
        for name in template_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let name = args.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
    let spec = template(name).ok_or_else(|| CliError::UnknownTemplate(name.to_string()))?;

    if args.path.exists() && !args.force {
        return Err(CliError::AlreadyExists(args.path));
    }

    let contents = match SpecFormat::from_path(&args.path) {
        SpecFormat::Json => format!("{}\n", serde_json::to_string_pretty(&spec)?),
        SpecFormat::Yaml => to_yaml(&spec)?,
    };
    write_bytes_atomic(&args.path, contents.as_bytes())?;

    info!(template = name, path = %args.path.display(), "specification written");
    if verbosity != Verbosity::Quiet {
        eprintln!("wrote {name} template to {}", args.path.display());
    }
    Ok(())
}
