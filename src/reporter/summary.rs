//! Console summary printed after publishing.

use crate::config::Mode;
use crate::publisher::PublishSummary;

/// Marker in front of every line the reporter prints.
pub const PREFIX: &str = "[qase]";

/// Prints published vs. attempted counts with colored output.
pub fn print_summary(mode: Mode, summary: &PublishSummary) {
    for line in summary_lines(mode, summary) {
        println!("{}", line);
    }
}

fn summary_lines(mode: Mode, summary: &PublishSummary) -> Vec<String> {
    let prefix = console::style(PREFIX).cyan().bold();

    let target = match mode {
        Mode::TestOps => "TestOps",
        Mode::Report => "the local report",
        Mode::Off => return vec![format!("{} reporting is off, nothing was sent", prefix)],
    };

    let mut lines = vec![format!(
        "{} Published {}/{} results to {}",
        prefix,
        console::style(summary.published).green(),
        summary.attempted,
        target
    )];

    if summary.dropped > 0 {
        lines.push(format!(
            "{}   Dropped: {} ({} failed chunks)",
            prefix,
            console::style(summary.dropped).red(),
            summary.failed_chunks
        ));
    }
    if summary.superseded > 0 {
        lines.push(format!(
            "{}   Retries merged: {}",
            prefix,
            console::style(summary.superseded).yellow()
        ));
    }
    if summary.attempted == 0 {
        lines.push(format!(
            "{} {}",
            prefix,
            console::style("No test cases matched.").yellow()
        ));
    }

    lines
}
