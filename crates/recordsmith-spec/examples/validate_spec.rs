use std::env;
use std::path::PathBuf;

use recordsmith_spec::{ValidationReport, load_document, validate_spec};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let spec_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("missing spec path")?;

    let document = load_document(&spec_path)?;
    let validated = match validate_spec(&document) {
        Ok(validated) => validated,
        Err(report) => {
            eprintln!("spec validation failed");
            print_report(&report);
            std::process::exit(1);
        }
    };

    if !validated.warnings.is_empty() {
        eprintln!("spec validated with warnings:");
        print_report(&ValidationReport {
            errors: Vec::new(),
            warnings: validated.warnings,
        });
    } else {
        println!("spec validated successfully");
    }

    Ok(())
}

fn print_report(report: &ValidationReport) {
    for issue in report.errors.iter().chain(&report.warnings) {
        eprintln!("{issue}");
        if let Some(hint) = &issue.hint {
            eprintln!("  hint: {hint}");
        }
    }
}
