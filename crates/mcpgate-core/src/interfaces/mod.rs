// crates/mcpgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Interfaces
// Description: Backend-agnostic trait contracts implemented by the other
//              workspace crates: the policy repository, the policy
//              evaluator, credential resolution, the MCP transport, the
//              stdio adapter supervisor, the server/group registry, and the
//              audit sink.
// Purpose: Define the contract surfaces so the request pipeline can be
//          written once, against traits, and wired to concrete
//          implementations at the binary's composition root.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the gateway integrates with external systems (the
//! durable policy store, backend MCP servers, the stdio adapter pool, the
//! audit log) without embedding backend-specific details in the request
//! pipeline. Implementations must be deterministic and fail closed on
//! missing or invalid data.
//!
//! Security posture: interface implementations sit at trust boundaries and
//! must fail closed; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::GroupId;
use crate::core::identifiers::PolicyId;
use crate::core::identifiers::ServerName;
use crate::core::model::AuthConfig;
use crate::core::model::Decision;
use crate::core::model::Policy;
use crate::core::model::PolicyStatus;
use crate::core::model::RequestContext;
use crate::core::model::ResourceBinding;
use crate::core::model::ServerDescriptor;
use crate::core::model::ServerGroup;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Policy Repo
// ============================================================================

/// Query filter accepted by [`PolicyRepo::list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyFilter {
    /// Restrict to a single lifecycle status.
    pub status: Option<PolicyStatus>,
    /// Restrict to policies bound to this resource.
    pub resource: Option<ResourceBinding>,
    /// Free-text match over `name` / `description` / `policy_code`.
    pub query: Option<String>,
}

/// Policy repository errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PolicyRepoError {
    /// No policy exists with the given identifier.
    #[error("policy {0} not found")]
    NotFound(PolicyId),
    /// A `policy_code` collided with an existing policy.
    #[error("policy_code '{0}' already in use")]
    DuplicateCode(String),
    /// The policy failed `Policy::validate` or condition-tree compilation.
    #[error("policy invalid: {0}")]
    Invalid(String),
    /// The underlying store failed to read or write.
    #[error("policy store error: {0}")]
    Store(String),
}

/// CRUD and query contract over policies and their resource bindings.
///
/// # Invariants
/// - Every mutating operation is atomic at the level of a single policy and
///   its bindings, increments `version`, and updates `updated_at`.
/// - A successful mutation is immediately visible to the next `list`/`get`
///   call against the same repository instance.
#[async_trait]
pub trait PolicyRepo: Send + Sync {
    /// Lists policies matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::Store`] on a read failure.
    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, PolicyRepoError>;

    /// Fetches a single policy by id.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Store`].
    async fn get(&self, id: &PolicyId) -> Result<Policy, PolicyRepoError>;

    /// Creates a policy, assigning `version = 1` and both timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::Invalid`] or [`PolicyRepoError::DuplicateCode`].
    async fn create(&self, policy: Policy) -> Result<Policy, PolicyRepoError>;

    /// Replaces a policy's mutable fields, incrementing `version`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Invalid`].
    async fn update(&self, policy: Policy) -> Result<Policy, PolicyRepoError>;

    /// Deletes a policy and all of its resource bindings.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Store`].
    async fn delete(&self, id: &PolicyId) -> Result<(), PolicyRepoError>;

    /// Transitions a policy's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Store`].
    async fn set_status(
        &self,
        id: &PolicyId,
        status: PolicyStatus,
    ) -> Result<Policy, PolicyRepoError>;

    /// Adds a resource binding to a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Store`].
    async fn bind_resource(
        &self,
        id: &PolicyId,
        binding: ResourceBinding,
    ) -> Result<Policy, PolicyRepoError>;

    /// Removes a resource binding from a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::NotFound`] or [`PolicyRepoError::Store`].
    async fn unbind_resource(
        &self,
        id: &PolicyId,
        binding: &ResourceBinding,
    ) -> Result<Policy, PolicyRepoError>;

    /// Lists policies bound to `resource`, optionally including policies
    /// with no resource bindings (global policies).
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::Store`] on a read failure.
    async fn policies_for_resource(
        &self,
        resource: &ResourceBinding,
        include_global: bool,
    ) -> Result<Vec<Policy>, PolicyRepoError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyRepoError::Store`] when the store is unavailable.
    async fn readiness(&self) -> Result<(), PolicyRepoError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy Evaluator
// ============================================================================

/// Policy evaluator errors.
///
/// # Invariants
/// - A per-rule evaluation failure never reaches this type; it is folded
///   into the returned [`Decision`] as an `evaluator_error` obligation, per
///   the fail-closed-per-rule requirement. This type covers evaluator-wide
///   failure only.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// The evaluator has not yet compiled any policy table.
    #[error("policy tables not yet compiled")]
    NotReady,
}

/// Compiles policies into decision tables and evaluates request contexts.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates `context` against the currently compiled policy tables.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::NotReady`] before the first compilation
    /// completes. Never returns an error for a policy- or rule-level
    /// failure; those are folded into the returned [`Decision`].
    fn evaluate(&self, context: &RequestContext) -> Result<Decision, EvaluatorError>;
}

// ============================================================================
// SECTION: Credential Resolver
// ============================================================================

/// A credential resolved for outbound injection.
///
/// # Invariants
/// - `value` is never included in `Debug` output; only `masked` is.
#[derive(Clone)]
pub struct ResolvedCredential {
    /// The raw secret value. Never logged.
    pub value: String,
    /// The masked echo safe for display (`first4••••••••last4`).
    pub masked: String,
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("value", &"<redacted>")
            .field("masked", &self.masked)
            .finish()
    }
}

/// Credential resolution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Neither `credential_ref` nor `credential` is set on the auth config.
    #[error("no credential configured")]
    NotConfigured,
    /// `credential_ref` did not use a recognized scheme.
    #[error("unsupported credential reference scheme: {0}")]
    UnsupportedScheme(String),
    /// The referenced environment variable is not allowed by configuration.
    #[error("environment variable '{0}' is not allowed")]
    Denied(String),
    /// The referenced environment variable is not set.
    #[error("environment variable '{0}' is not set")]
    Missing(String),
    /// The resolved value exceeds the configured size limit.
    #[error("credential value exceeds {limit} bytes")]
    TooLarge {
        /// The configured limit that was exceeded.
        limit: usize,
    },
}

/// Resolves outbound credentials and masks them for display.
pub trait CredentialResolver: Send + Sync {
    /// Resolves the credential referenced or inlined by `auth`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if no credential is configured, the
    /// reference scheme is unsupported, or (for `env://` references) the
    /// variable is denied, missing, or exceeds the configured size limit.
    fn resolve(&self, auth: &AuthConfig) -> Result<ResolvedCredential, CredentialError>;
}

// ============================================================================
// SECTION: MCP Transport
// ============================================================================

/// A tool definition as returned by [`McpTransport::list_tools`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within its server.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
    /// Source server name, set by `GroupGateway` when aggregating.
    #[serde(rename = "_source_server", skip_serializing_if = "Option::is_none")]
    pub source_server: Option<String>,
}

/// A single streamed event forwarded from an SSE backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// The raw event payload bytes.
    pub data: Vec<u8>,
}

/// Receives streamed events from an in-flight tool invocation.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Forwards one event to the caller, in order.
    async fn send(&self, event: StreamEvent);
}

/// Transport errors for MCP backend communication.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend could not be reached.
    #[error("backend {server} unreachable: {detail}")]
    Unreachable {
        /// The backend server name.
        server: String,
        /// Underlying error detail.
        detail: String,
    },
    /// The backend did not respond within its deadline.
    #[error("backend {server} timed out")]
    Timeout {
        /// The backend server name.
        server: String,
    },
    /// The backend's response exceeded the configured size limit.
    #[error("backend {server} response exceeded {limit} bytes")]
    ResponseTooLarge {
        /// The backend server name.
        server: String,
        /// The configured limit that was exceeded.
        limit: usize,
    },
    /// The backend's response was not valid JSON-RPC.
    #[error("backend {server} returned a malformed response: {detail}")]
    Protocol {
        /// The backend server name.
        server: String,
        /// Underlying error detail.
        detail: String,
    },
    /// The backend returned a JSON-RPC error object.
    #[error("backend {server} returned an error: {message}")]
    Remote {
        /// The backend server name.
        server: String,
        /// The error message from the JSON-RPC error object.
        message: String,
    },
}

/// Abstracts HTTP/SSE (and, after adapter conversion, stdio) MCP dialects.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Lists the tools exposed by `server`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on any transport-level failure.
    async fn list_tools(&self, server: &ServerDescriptor) -> Result<Vec<ToolDefinition>, TransportError>;

    /// Invokes `tool` on `server` with `params`, streaming any intermediate
    /// events to `sink` and returning the final JSON-RPC result.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on any transport-level failure. This
    /// method never retries; retry policy belongs to the caller.
    async fn invoke_tool(
        &self,
        server: &ServerDescriptor,
        tool: &str,
        params: serde_json::Value,
        sink: &(dyn StreamSink + Sync),
    ) -> Result<serde_json::Value, TransportError>;
}

// ============================================================================
// SECTION: Stdio Adapter Supervisor
// ============================================================================

/// One running stdio→HTTP adapter's tracked state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStatus {
    /// The server name the adapter wraps.
    pub server_name: ServerName,
    /// The child process id.
    pub child_pid: u32,
    /// The loopback port the adapter listens on.
    pub port: u16,
    /// The command used to spawn the child.
    pub command: String,
    /// Arguments passed to the child.
    pub args: Vec<String>,
}

/// Stdio adapter supervisor errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No free port was available in the configured range.
    #[error("no free adapter port available")]
    PortsExhausted,
    /// An adapter is already running for this server.
    #[error("adapter for '{0}' is already running")]
    AlreadyRunning(ServerName),
    /// No adapter is tracked for this server.
    #[error("no adapter running for '{0}'")]
    NotRunning(ServerName),
    /// The child process failed to start.
    #[error("failed to spawn adapter for '{server}': {detail}")]
    SpawnFailed {
        /// The server name being converted.
        server: ServerName,
        /// Underlying error detail.
        detail: String,
    },
    /// The child's health probe never succeeded before the deadline.
    #[error("adapter for '{0}' did not become healthy in time")]
    StartTimeout(ServerName),
    /// The child process exited unexpectedly.
    #[error("adapter for '{0}' crashed")]
    Crashed(ServerName),
}

/// Spawns, tracks, probes, and reverse-proxies stdio→HTTP adapter processes.
#[async_trait]
pub trait StdioAdapterSupervisor: Send + Sync {
    /// Converts a stdio server to HTTP by spawning and health-probing an adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::AlreadyRunning`], [`AdapterError::PortsExhausted`],
    /// [`AdapterError::SpawnFailed`], or [`AdapterError::StartTimeout`].
    async fn convert(
        &self,
        server_name: &ServerName,
        command: &str,
        args: &[String],
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<AdapterStatus, AdapterError>;

    /// Stops the adapter for `server_name`, releasing its port.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotRunning`] if no adapter is tracked.
    async fn stop(&self, server_name: &ServerName) -> Result<(), AdapterError>;

    /// Returns the status of a single tracked adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotRunning`] if no adapter is tracked.
    async fn status(&self, server_name: &ServerName) -> Result<AdapterStatus, AdapterError>;

    /// Lists every tracked adapter.
    async fn list(&self) -> Vec<AdapterStatus>;
}

// ============================================================================
// SECTION: Server Registry
// ============================================================================

/// Server/group registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No server exists with the given name.
    #[error("server '{0}' not found")]
    ServerNotFound(ServerName),
    /// No group exists with the given id.
    #[error("group '{0}' not found")]
    GroupNotFound(GroupId),
    /// A stdio server was proposed for group membership before conversion.
    #[error("server '{0}' must be converted to http before joining a group")]
    RequiresConversion(ServerName),
    /// The mutation violated a registry invariant.
    #[error("registry invariant violated: {0}")]
    Invalid(String),
}

/// In-memory view of configured MCP servers and their group memberships.
pub trait ServerRegistry: Send + Sync {
    /// Looks up a server by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ServerNotFound`].
    fn get_server(&self, name: &ServerName) -> Result<ServerDescriptor, RegistryError>;

    /// Looks up a group by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`].
    fn get_group(&self, id: &GroupId) -> Result<ServerGroup, RegistryError>;

    /// Lists every registered server.
    fn list_servers(&self) -> Vec<ServerDescriptor>;

    /// Lists every registered group.
    fn list_groups(&self) -> Vec<ServerGroup>;

    /// Registers or replaces a server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Invalid`] if the descriptor fails validation.
    fn put_server(&self, server: ServerDescriptor) -> Result<(), RegistryError>;

    /// Removes a server, transactionally removing it from every group.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ServerNotFound`].
    fn remove_server(&self, name: &ServerName) -> Result<(), RegistryError>;

    /// Registers or replaces a group.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RequiresConversion`] if any member is stdio,
    /// or [`RegistryError::ServerNotFound`] if any member is unregistered.
    fn put_group(&self, group: ServerGroup) -> Result<(), RegistryError>;

    /// Removes a group.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`].
    fn remove_group(&self, id: &GroupId) -> Result<(), RegistryError>;
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// The kind of event an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Authentication failed.
    AuthRejected,
    /// A complete MCP tool invocation.
    McpRequest,
    /// A policy evaluation denied a request.
    PolicyViolation,
    /// A stdio adapter lifecycle event.
    AdapterEvent,
}

/// One structured, append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record timestamp.
    pub timestamp: Timestamp,
    /// Request-scoped trace id.
    pub trace_id: String,
    /// Kind of event.
    pub event_type: AuditEventType,
    /// Authenticated caller's subject id, if known.
    pub principal_subject: Option<String>,
    /// Authenticated caller's email, if known.
    pub principal_email: Option<String>,
    /// Target server name, if resolved.
    pub server: Option<String>,
    /// Target tool name, if resolved.
    pub tool: Option<String>,
    /// Opaque hash of the input payload, or the raw payload if opted in.
    pub parameters_hash: String,
    /// Allow/deny, if a decision was reached.
    pub decision: Option<String>,
    /// The policy that matched, if any.
    pub policy_id: Option<String>,
    /// The rule that matched, if any.
    pub rule_id: Option<String>,
    /// Non-effect actions accumulated from the decision.
    pub obligations: Vec<String>,
    /// HTTP response status sent to the caller.
    pub response_status: u16,
    /// Request duration in milliseconds.
    pub duration_ms: u64,
    /// Error detail, if the request failed.
    pub error: Option<String>,
}

/// Audit sink errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink failed to persist the record.
    #[error("audit sink write failed: {0}")]
    WriteFailed(String),
}

/// Structured, append-only emission of decision/invocation records.
///
/// # Invariants
/// - A sink failure must never fail the request it describes; callers log
///   the error and continue.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Emits one audit record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WriteFailed`] if the record could not be persisted.
    async fn emit(&self, record: AuditRecord) -> Result<(), AuditError>;
}
