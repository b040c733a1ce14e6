//! Human-readable rendering of plans and run reports.

use std::fmt::Write as _;

use dtrack_reconcile::{Action, EntityKind, OperationStatus, RunReport};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";

/// Whether ANSI colors should be emitted.
pub fn use_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

fn paint(text: &str, color: &str, colored: bool) -> String {
    if colored {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

fn symbol(action: Action) -> &'static str {
    match action {
        Action::Create => "+",
        Action::Update => "~",
        Action::Delete => "-",
    }
}

fn color(action: Action) -> &'static str {
    match action {
        Action::Create => GREEN,
        Action::Update => YELLOW,
        Action::Delete => RED,
    }
}

/// Render a dry-run report.
pub fn format_plan(report: &RunReport, colored: bool) -> String {
    let mut out = String::new();

    if report.operations.is_empty() {
        out.push_str("No changes required. Remote state is up to date.\n");
        return out;
    }

    out.push_str("Dry run - no changes will be made.\n\nWould apply:\n");
    for op in &report.operations {
        let _ = writeln!(
            out,
            "  {} {}",
            paint(symbol(op.action), color(op.action), colored),
            op.description
        );
    }

    let totals = report.totals();
    let _ = writeln!(
        out,
        "\nSummary: {} to create, {} to update, {} to delete, {} unchanged",
        totals.created, totals.updated, totals.deleted, totals.unchanged
    );
    out
}

/// Render the outcome of an apply.
pub fn format_results(report: &RunReport, colored: bool) -> String {
    let mut out = String::new();

    if report.operations.is_empty() && report.errors.is_empty() {
        out.push_str("No changes required. Remote state is up to date.\n");
        return out;
    }

    out.push_str("Applying changes...\n");
    for op in &report.operations {
        let (mark, mark_color, verb) = match op.status {
            OperationStatus::Changed => ("✓", GREEN, "Done"),
            OperationStatus::Unchanged => ("=", DIM, "Already in place"),
            OperationStatus::Failed => ("✗", RED, "Failed"),
            OperationStatus::Skipped => ("○", YELLOW, "Skipped"),
            OperationStatus::Planned => ("?", DIM, "Planned"),
        };
        let _ = write!(
            out,
            "  {} {verb}: {}",
            paint(mark, mark_color, colored),
            op.description
        );
        if let Some(error) = &op.error {
            let _ = write!(out, " - {error}");
        }
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&format_counts(report));

    let totals = report.totals();
    if totals.failed > 0 || totals.skipped > 0 {
        let _ = writeln!(
            out,
            "\nApplied {} change(s) with {} failure(s) and {} skipped.",
            totals.changes(),
            totals.failed,
            totals.skipped
        );
    } else if totals.changes() > 0 {
        let _ = writeln!(out, "\nApplied {} change(s) successfully.", totals.changes());
    }
    out
}

/// Per-kind counters as an aligned table.
pub fn format_counts(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<26} {:>7} {:>7} {:>7} {:>9} {:>6} {:>7}",
        "KIND", "CREATED", "UPDATED", "DELETED", "UNCHANGED", "FAILED", "SKIPPED"
    );
    for kind in EntityKind::ALL {
        let Some(c) = report.counts.get(&kind) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{:<26} {:>7} {:>7} {:>7} {:>9} {:>6} {:>7}",
            kind.to_string(),
            c.created,
            c.updated,
            c.deleted,
            c.unchanged,
            c.failed,
            c.skipped
        );
    }
    out
}
