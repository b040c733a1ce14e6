//! dtrack - declarative access management for Dependency-Track
//!
//! Reads a desired-state file describing OIDC groups, teams, projects and
//! portfolio access, and converges a Dependency-Track server to it.

use clap::{Parser, Subcommand};

use dtrack_cli::commands;
use dtrack_cli::error::CliResult;
use dtrack_cli::logging;

/// Declarative Dependency-Track access management
#[derive(Parser)]
#[command(name = "dtrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the server to a desired-state file
    Apply(commands::apply::ApplyArgs),

    /// Show what apply would change
    Plan(commands::plan::PlanArgs),

    /// Check a desired-state file without contacting the server
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Apply(args) => commands::apply::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
