//! Show the changes an apply would make

use std::path::PathBuf;

use clap::Args;
use dtrack_reconcile::{Reconciler, ReconcilerConfig};

use super::{load_desired, ConnectionArgs};
use crate::error::CliResult;
use crate::output;

/// Compute and print the plan without changing anything
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the desired-state file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Output the plan as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Execute the plan command
pub async fn execute(args: PlanArgs) -> CliResult<()> {
    let desired = load_desired(&args.file)?;
    let api = args.connection.connect()?;

    let report = Reconciler::new(
        api,
        ReconcilerConfig {
            dry_run: true,
            ..ReconcilerConfig::default()
        },
    )
    .run(&desired)
    .await?;

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print!("{}", output::format_plan(&report, output::use_color()));
    }

    Ok(())
}
