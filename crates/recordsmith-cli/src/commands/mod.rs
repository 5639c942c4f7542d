pub mod doctor;
pub mod generate;
pub mod init;
pub mod validate;

pub use doctor::DoctorArgs;
pub use generate::GenerateArgs;
pub use init::InitArgs;
pub use validate::ValidateArgs;

use recordsmith_spec::{ValidationIssue, ValidationReport};

/// Print errors then warnings, one per line, with hints indented below.
pub fn print_report(report: &ValidationReport) {
    for issue in report.errors.iter().chain(&report.warnings) {
        print_issue(issue);
    }
}

pub fn print_issue(issue: &ValidationIssue) {
    eprintln!("  {issue}");
    if let Some(hint) = &issue.hint {
        eprintln!("    hint: {hint}");
    }
}
