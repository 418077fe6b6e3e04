// crates/mcpgate-credentials/src/lib.rs
// ============================================================================
// Module: MCP Gate Credentials
// Description: Outbound credential resolution and display masking.
// Purpose: Turn an `AuthConfig` reference into an injectable secret without
//          ever surfacing the raw value outside this crate's callers.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`env::EnvCredentialResolver`] is the only `CredentialResolver`
//! implementation today; it resolves `env://VAR` references and inline
//! credentials. [`format::format_credential`] applies the outbound
//! injection format, and [`format::mask`] is the single place a secret is
//! turned into something safe to log or return over the API.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod env;
pub mod format;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use env::EnvCredentialResolver;
pub use env::EnvCredentialResolverConfig;
pub use format::format_credential;
pub use format::mask;
pub use mcpgate_core::interfaces::CredentialError;
pub use mcpgate_core::interfaces::CredentialResolver;
pub use mcpgate_core::interfaces::ResolvedCredential;
