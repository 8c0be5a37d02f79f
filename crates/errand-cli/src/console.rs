//! Operator console output.

use colored::Colorize;
use errand_middleware::ReportSink;
use errand_types::Severity;

/// Prints reports to stdout, coloured by severity.  Multi-line reports
/// (flushed update batches) are indented under a header line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn id(&self) -> &str {
        "console"
    }

    fn show_message(&self, text: &str, severity: Severity) {
        println!();
        if text.contains('\n') {
            println!("  {}", "World updates".bold().underline());
        }
        for line in text.lines() {
            println!("  {}", paint(line, severity));
        }
    }
}

fn paint(line: &str, severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Info if line.starts_with("OK ") || line.starts_with("Execution COMPLETE") => {
            line.green()
        }
        Severity::Info => line.normal(),
        Severity::Warning => line.yellow(),
        Severity::Error => line.red().bold(),
    }
}
