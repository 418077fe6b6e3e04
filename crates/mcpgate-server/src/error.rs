// crates/mcpgate-server/src/error.rs
// ============================================================================
// Module: Server Errors
// Description: Top-level error taxonomy for the `mcpgate-server` binary.
// Purpose: Give every command a single error type that maps cleanly to an
//          exit code, instead of stringly-typed failure.
// Dependencies: mcpgate-config, mcpgate-policy, mcpgate-policy-store, thiserror
// ============================================================================

use std::process::ExitCode;

use mcpgate_config::ConfigError;
use mcpgate_core::interfaces::PolicyRepoError;
use mcpgate_policy::PolicyCompileError;
use mcpgate_policy_store::SqliteStoreError;
use thiserror::Error;

/// Errors surfaced by any `mcpgate-server` command.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The durable policy store could not be opened at startup.
    #[error("policy store unavailable: {0}")]
    Store(#[from] SqliteStoreError),
    /// A policy document failed compilation.
    #[error("policy compile error: {0}")]
    PolicyCompile(#[from] PolicyCompileError),
    /// A policy repository operation failed.
    #[error("policy repository error: {0}")]
    PolicyRepo(#[from] PolicyRepoError),
    /// A command's input file could not be read or parsed.
    #[error("failed to read {path}: {source}")]
    Input {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A command's JSON input failed to parse.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path whose contents failed to parse.
        path: String,
        /// Underlying parse failure.
        source: serde_json::Error,
    },
    /// Binding the HTTP listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: std::net::SocketAddr,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

impl ServerError {
    /// Maps this error to the process exit code documented for `mcpgate-server`:
    /// `1` for configuration errors, `2` for a store unreachable at startup,
    /// and `1` for every other command-time failure.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::FAILURE,
            // Both variants are only ever raised from the startup readiness
            // check in `commands::serve::run`; once serving begins, store
            // failures are handled per-request by the HTTP surface instead.
            Self::Store(_) | Self::PolicyRepo(_) => exit_code_store_unreachable(),
            Self::PolicyCompile(_) | Self::Input { .. } | Self::Json { .. } | Self::Bind { .. } => ExitCode::FAILURE,
        }
    }
}

/// The documented exit code for a store unreachable at startup.
const fn exit_code_store_unreachable() -> ExitCode {
    ExitCode::from(2)
}

/// Result alias for `mcpgate-server` commands.
pub type ServerResult<T> = Result<T, ServerError>;
