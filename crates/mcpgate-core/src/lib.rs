// crates/mcpgate-core/src/lib.rs
// ============================================================================
// Module: MCP Gate Core
// Description: Declarative domain model and backend-agnostic trait contracts
//              shared by every other crate in the workspace.
// Purpose: Give the gateway one canonical, serializable vocabulary so the
//          wire format and the in-process types never diverge, and define
//          the seams concrete backends (policy store, transport,
//          credentials, audit) are wired in against.
// Dependencies: mcpgate-condition, serde, serde_json, time
// ============================================================================

//! ## Overview
//! This crate holds no I/O. It defines:
//! - [`core`]: `Principal`, `ServerDescriptor`, `ServerGroup`, `Policy`,
//!   `Rule`, `Action`, `Decision`, and the identifier/timestamp newtypes.
//! - [`interfaces`]: `PolicyRepo`, `PolicyEvaluator`, `CredentialResolver`,
//!   `McpTransport`, `StdioAdapterSupervisor`, `ServerRegistry`, `AuditSink`.
//!
//! Invariants:
//! - Evaluation is fail-closed: the absence of a matching policy, or any
//!   rule-level evaluation error, yields [`core::model::Decision::fail_closed_deny`].
//!
//! Security posture: this crate sits at the trust boundary between
//! untrusted request payloads and policy evaluation; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::identifiers::GroupId;
pub use core::identifiers::PolicyId;
pub use core::identifiers::RuleId;
pub use core::identifiers::ServerName;
pub use core::identifiers::TraceId;
pub use core::model::Action;
pub use core::model::ActionType;
pub use core::model::Decision;
pub use core::model::Effect;
pub use core::model::Policy;
pub use core::model::PolicyStatus;
pub use core::model::Principal;
pub use core::model::RequestContext;
pub use core::model::ResourceBinding;
pub use core::model::Rule;
pub use core::model::ServerDescriptor;
pub use core::model::ServerGroup;
pub use core::time::Timestamp;
pub use interfaces::AuditSink;
pub use interfaces::CredentialResolver;
pub use interfaces::McpTransport;
pub use interfaces::PolicyEvaluator;
pub use interfaces::PolicyRepo;
pub use interfaces::ServerRegistry;
pub use interfaces::StdioAdapterSupervisor;
