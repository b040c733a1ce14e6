//! Offline validation of a desired-state file

use std::path::PathBuf;

use clap::Args;

use super::load_desired;
use crate::error::CliResult;

/// Parse and validate a desired-state file without contacting the server
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the desired-state file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}

/// Execute the validate command
pub fn execute(args: ValidateArgs) -> CliResult<()> {
    let desired = load_desired(&args.file)?;
    desired.validate()?;

    println!(
        "{} is valid: {} oidc group(s), {} team(s), {} project(s).",
        args.file.display(),
        desired.oidc_groups.len(),
        desired.teams.len(),
        desired.projects.len()
    );
    Ok(())
}
