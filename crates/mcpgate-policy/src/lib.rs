// crates/mcpgate-policy/src/lib.rs
// ============================================================================
// Module: MCP Gate Policy
// Description: Policy compilation and evaluation: `CompiledTables`, the
//              `ArcSwapEvaluator`, and the default in-memory `PolicyRepo`.
// Purpose: Turn declarative `Policy` documents into O(relevant-policies)
//          decisions without blocking concurrent readers on a writer.
// Dependencies: mcpgate-core, mcpgate-condition, arc-swap, regex, ipnet
// ============================================================================

//! ## Overview
//! This crate has two halves:
//! - [`compiled`]: pure, allocation-free-on-read data (`CompiledTables`,
//!   `PolicyRef`, `PrincipalMatcher`) and the `compile` function that builds
//!   them from a `Vec<Policy>`.
//! - [`evaluator`] and [`memory_repo`]: the runtime pieces — the
//!   `ArcSwapEvaluator` that implements `mcpgate_core::interfaces::PolicyEvaluator`,
//!   and `InMemoryPolicyRepo`, the default `PolicyRepo`.
//!
//! Security posture: condition values are policy-author-controlled, not
//! end-user-controlled, but evaluation still treats resolver failures as
//! non-matches rather than propagating them, per the fail-closed contract.

pub mod compiled;
pub mod evaluator;
pub mod memory_repo;

pub use compiled::CompiledTables;
pub use compiled::PolicyCompileError;
pub use evaluator::ArcSwapEvaluator;
pub use memory_repo::InMemoryPolicyRepo;
