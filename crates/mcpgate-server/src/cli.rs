// crates/mcpgate-server/src/cli.rs
// ============================================================================
// Module: CLI Definition
// Description: `clap`-derived argument types for the `mcpgate-server` binary.
// Purpose: Give the gateway both a `serve` entry point and offline policy
//          authoring workflows that need no running server.
// Dependencies: clap
// ============================================================================

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "mcpgate-server",
    disable_help_subcommand = true,
    disable_version_flag = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Starts the HTTP gateway, serving until a shutdown signal is received.
    Serve(ServeArgs),
    /// Offline policy authoring utilities; no server required.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {}

/// Offline policy authoring subcommands.
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Validates a policy document without publishing it anywhere.
    Validate(PolicyValidateArgs),
    /// Evaluates a hand-built request context against a set of policy
    /// documents, with no server or store involved.
    Evaluate(PolicyEvaluateArgs),
}

/// Arguments for `policy validate`.
#[derive(Args, Debug)]
pub struct PolicyValidateArgs {
    /// Path to a JSON file containing a single `Policy` document.
    pub policy: PathBuf,
}

/// Arguments for `policy evaluate`.
#[derive(Args, Debug)]
pub struct PolicyEvaluateArgs {
    /// Path to a JSON file containing an array of `Policy` documents.
    pub policies: PathBuf,
    /// Path to a JSON file containing a `RequestContext`.
    pub context: PathBuf,
}
