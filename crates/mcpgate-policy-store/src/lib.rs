// crates/mcpgate-policy-store/src/lib.rs
// ============================================================================
// Module: MCP Gate Policy Store
// Description: Durable PolicyRepo implementations.
// Purpose: Give deployments a restart-safe PolicyRepo alongside the
//          always-available in-memory one.
// Dependencies: mcpgate-core, mcpgate-policy, rusqlite
// ============================================================================

//! ## Overview
//! Gated behind the `sqlite` feature (on by default), [`store::SqlitePolicyStore`]
//! persists policies as canonical JSON documents in a single `SQLite` table
//! and republishes the full set to an `ArcSwapEvaluator` after every mutation.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqlitePolicyStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteStoreError;
