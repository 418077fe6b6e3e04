// crates/mcpgate-server/src/main.rs
// ============================================================================
// Module: Entry Point
// Description: CLI dispatcher for the `mcpgate-server` binary.
// Purpose: Parse arguments, initialize logging, and dispatch to the `serve`
//          or `policy` command implementations.
// Dependencies: clap, tokio
// ============================================================================

// ============================================================================
// SECTION: Modules
// ============================================================================

mod cli;
mod commands;
mod error;
mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::PolicyCommand;
use crate::error::ServerError;

/// CLI entry point returning a process exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    // A global subscriber may already be installed under a test harness;
    // proceed without logging rather than failing startup in that case.
    let _ = logging::init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "mcpgate-server exiting with an error");
            err.exit_code()
        }
    }
}

/// Parses arguments and dispatches to the selected subcommand.
async fn run() -> Result<ExitCode, ServerError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(_) => commands::serve::run().await,
        Commands::Policy { command } => match command {
            PolicyCommand::Validate(args) => commands::policy::validate(&args),
            PolicyCommand::Evaluate(args) => commands::policy::evaluate(&args),
        },
    }
}
