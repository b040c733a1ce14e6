//! Converge the server to a desired-state file

use std::path::PathBuf;

use clap::Args;
use dtrack_reconcile::{Reconciler, ReconcilerConfig, RunReport};

use super::{load_desired, ConnectionArgs};
use crate::error::{CliError, CliResult};
use crate::output;

/// Apply a desired-state file
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the desired-state file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Preview changes without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum number of API operations in flight
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Execute the apply command
pub async fn execute(args: ApplyArgs) -> CliResult<()> {
    let desired = load_desired(&args.file)?;
    let api = args.connection.connect()?;

    let reconciler = Reconciler::new(
        api,
        ReconcilerConfig {
            concurrency: args.concurrency.max(1),
            dry_run: args.dry_run,
        },
    );
    let report = reconciler.run(&desired).await?;

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else if report.dry_run {
        print!("{}", output::format_plan(&report, output::use_color()));
    } else {
        print!("{}", output::format_results(&report, output::use_color()));
    }

    check(&report)
}

/// Turn a finished report into the command's result.
pub fn check(report: &RunReport) -> CliResult<()> {
    if report.is_success() {
        return Ok(());
    }
    let totals = report.totals();
    let (kind, message) = report
        .first_error()
        .map(|e| (e.kind.to_string(), e.message.clone()))
        .unwrap_or_else(|| ("Skipped".to_string(), "operations were skipped".to_string()));
    Err(CliError::Apply {
        failed: totals.failed,
        skipped: totals.skipped,
        kind,
        message,
    })
}
