// crates/mcpgate-gateway/src/pipeline.rs
// ============================================================================
// Module: Request Pipeline
// Description: The per-request state machine: authenticate, resolve,
//              authorize, proxy, audit.
// Purpose: Give `HttpSurface` one call per MCP operation that already
//          enforces every trust boundary.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`RequestPipeline`] walks every tool invocation through the same six
//! stages regardless of entry point (direct server or group): authenticate
//! the bearer token, resolve the target through
//! [`mcpgate_core::interfaces::ServerRegistry`] (or
//! [`crate::group::DefaultGroupGateway`] for a group), evaluate policy,
//! proxy through [`mcpgate_core::interfaces::McpTransport`], and emit exactly
//! one [`AuditRecord`] regardless of outcome. `trace_id` is attached by the
//! HTTP layer's request-id middleware before the pipeline ever sees the
//! request; the pipeline only threads it through.

use std::sync::Arc;
use std::time::Instant;

use mcpgate_core::core::identifiers::GroupId;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::model::Action;
use mcpgate_core::core::model::ActionType;
use mcpgate_core::core::model::Decision;
use mcpgate_core::core::model::Principal;
use mcpgate_core::core::model::RequestContext;
use mcpgate_core::core::model::RequestMeta;
use mcpgate_core::core::time::Timestamp;
use mcpgate_core::interfaces::AuditEventType;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;
use mcpgate_core::interfaces::McpTransport;
use mcpgate_core::interfaces::PolicyEvaluator;
use mcpgate_core::interfaces::ServerRegistry;
use mcpgate_core::interfaces::StreamSink;
use mcpgate_core::interfaces::ToolDefinition;
use mcpgate_core::interfaces::TransportError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::group::DefaultGroupGateway;
use crate::group::GroupGatewayError;

/// The target of an MCP operation: a single server or a virtual group.
#[derive(Debug, Clone)]
pub enum PipelineTarget {
    /// A directly addressed backend server.
    Server(ServerName),
    /// A virtual group endpoint.
    Group(GroupId),
}

/// Errors a caller-facing handler must turn into an HTTP response.
///
/// # Invariants
/// - Every variant corresponds to one reject branch of the pipeline state
///   machine; an [`AuditRecord`] has already been emitted when this is
///   returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Stage 2 failed: the bearer token did not verify.
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),
    /// Stage 3 failed: the target server/group/tool is unknown or disabled.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    /// Stage 4 failed: policy denied the request.
    #[error("denied: {reason}")]
    Denied {
        /// Human-readable reason from the matched (or absent) rule.
        reason: String,
        /// The policy whose rule matched, if any.
        policy_id: Option<String>,
    },
    /// Stage 4 succeeded but attached an obligation this deployment cannot
    /// honor (`rate_limit`/`require_approval` with no enforcement backend).
    #[error("unmet obligation: {0}")]
    ObligationUnsupported(String),
    /// Stage 5 failed: the backend transport call failed.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Stage 5 failed: the backend did not respond within its deadline.
    #[error("upstream timeout: {0}")]
    Timeout(String),
}

/// Per-request orchestration: authenticate, resolve, authorize, proxy, audit.
pub struct RequestPipeline {
    /// Verifies bearer tokens into principals.
    authenticator: Arc<dyn Authenticator>,
    /// Server/group registry.
    registry: Arc<dyn ServerRegistry>,
    /// Virtual group aggregation.
    group_gateway: Arc<DefaultGroupGateway>,
    /// Compiled-policy evaluator.
    evaluator: Arc<dyn PolicyEvaluator>,
    /// Backend transport.
    transport: Arc<dyn McpTransport>,
    /// Structured audit emission.
    audit: Arc<dyn AuditSink>,
}

/// Everything the audit stage needs, threaded through by value so every
/// return path (success or any reject) can build the same record.
struct AuditDraft<'a> {
    request_meta: &'a RequestMeta,
    principal: Option<&'a Principal>,
    server: Option<String>,
    tool: Option<&'a str>,
    decision: Option<&'static str>,
    policy_id: Option<String>,
    payload_hash: Option<String>,
    start: Instant,
}

/// Hashes a payload for the audit record's `parameters_hash` field. Never
/// the raw payload: a digest so an auditor can correlate records without
/// the pipeline logging request bodies by default.
fn hash_payload(payload: &serde_json::Value) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RequestPipeline {
    /// Builds a pipeline wiring every collaborator.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        registry: Arc<dyn ServerRegistry>,
        group_gateway: Arc<DefaultGroupGateway>,
        evaluator: Arc<dyn PolicyEvaluator>,
        transport: Arc<dyn McpTransport>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            authenticator,
            registry,
            group_gateway,
            evaluator,
            transport,
            audit,
        }
    }

    /// Evaluates `context` against the compiled policy set with no side
    /// effects: no audit record, no backend call. Used by the dry-run
    /// evaluation endpoint to let an operator test a policy change.
    ///
    /// # Errors
    ///
    /// Returns the evaluator's error if the compiled table is not ready.
    pub fn evaluate_only(
        &self,
        context: &RequestContext,
    ) -> Result<Decision, mcpgate_core::interfaces::EvaluatorError> {
        self.evaluator.evaluate(context)
    }

    /// Lists tools available at `target` for the caller identified by
    /// `bearer_token`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Unauthenticated`] or
    /// [`PipelineError::ResourceNotFound`]. An [`AuditRecord`] is emitted in
    /// either case.
    pub async fn list_tools(
        &self,
        bearer_token: &str,
        target: &PipelineTarget,
        request_meta: RequestMeta,
    ) -> Result<Vec<ToolDefinition>, PipelineError> {
        let start = Instant::now();
        let principal = match self.authenticator.authenticate(bearer_token).await {
            Ok(p) => p,
            Err(e) => {
                self.emit(
                    AuditEventType::AuthRejected,
                    AuditDraft {
                        request_meta: &request_meta,
                        principal: None,
                        server: Some(target_label(target)),
                        tool: None,
                        decision: None,
                        policy_id: None,
                        payload_hash: None,
                        start,
                    },
                    Some(e.to_string()),
                )
                .await;
                return Err(PipelineError::Unauthenticated(e));
            }
        };

        let result = match target {
            PipelineTarget::Server(name) => match self.registry.get_server(name) {
                Ok(descriptor) if descriptor.enabled => self
                    .transport
                    .list_tools(&descriptor)
                    .await
                    .map_err(map_transport_error),
                Ok(_) => Err(PipelineError::ResourceNotFound(format!("server '{name}' is disabled"))),
                Err(e) => Err(PipelineError::ResourceNotFound(e.to_string())),
            },
            PipelineTarget::Group(id) => self
                .group_gateway
                .list_tools(id, &principal, &request_meta, self.audit.as_ref())
                .await
                .map_err(map_group_error),
        };

        self.emit(
            AuditEventType::McpRequest,
            AuditDraft {
                request_meta: &request_meta,
                principal: Some(&principal),
                server: Some(target_label(target)),
                tool: None,
                decision: result.as_ref().ok().map(|_| "allow"),
                policy_id: None,
                payload_hash: None,
                start,
            },
            result.as_ref().err().map(ToString::to_string),
        )
        .await;
        result
    }

    /// Invokes `tool_name` at `target` with `params`, streaming intermediate
    /// events to `sink`. Returns the (possibly redacted) result alongside the
    /// [`Decision`] that authorized it, so a caller can surface both in one
    /// response envelope.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Unauthenticated`], [`PipelineError::ResourceNotFound`],
    /// [`PipelineError::Denied`], [`PipelineError::ObligationUnsupported`], or
    /// [`PipelineError::Upstream`]. An [`AuditRecord`] is emitted in every case.
    #[allow(clippy::too_many_arguments, reason = "every pipeline stage needs its own input; bundling into a struct would not reduce call-site complexity")]
    pub async fn invoke_tool(
        &self,
        bearer_token: &str,
        target: &PipelineTarget,
        tool_name: &str,
        params: serde_json::Value,
        sink: &(dyn StreamSink + Sync),
        request_meta: RequestMeta,
    ) -> Result<(serde_json::Value, Decision), PipelineError> {
        let start = Instant::now();
        let params_hash = hash_payload(&params);

        let principal = match self.authenticator.authenticate(bearer_token).await {
            Ok(p) => p,
            Err(e) => {
                self.emit(
                    AuditEventType::AuthRejected,
                    AuditDraft {
                        request_meta: &request_meta,
                        principal: None,
                        server: Some(target_label(target)),
                        tool: Some(tool_name),
                        decision: None,
                        policy_id: None,
                        payload_hash: Some(params_hash.clone()),
                        start,
                    },
                    Some(e.to_string()),
                )
                .await;
                return Err(PipelineError::Unauthenticated(e));
            }
        };

        let server_name = match self.resolve_server_name(target, &principal, tool_name, &request_meta).await {
            Ok(name) => name,
            Err(e) => {
                self.emit(
                    AuditEventType::McpRequest,
                    AuditDraft {
                        request_meta: &request_meta,
                        principal: Some(&principal),
                        server: Some(target_label(target)),
                        tool: Some(tool_name),
                        decision: None,
                        policy_id: None,
                        payload_hash: Some(params_hash.clone()),
                        start,
                    },
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        let context = RequestContext {
            principal: principal.clone(),
            server: server_name.as_str().to_string(),
            tool: tool_name.to_string(),
            payload: params.clone(),
            request_meta: request_meta.clone(),
        };
        let decision = self
            .evaluator
            .evaluate(&context)
            .unwrap_or_else(|_| Decision::fail_closed_deny());
        let policy_id = decision.matched_policy_id.as_ref().map(ToString::to_string);

        if !decision.is_allow() {
            self.emit(
                AuditEventType::PolicyViolation,
                AuditDraft {
                    request_meta: &request_meta,
                    principal: Some(&principal),
                    server: Some(server_name.as_str().to_string()),
                    tool: Some(tool_name),
                    decision: Some("deny"),
                    policy_id: policy_id.clone(),
                    payload_hash: Some(params_hash.clone()),
                    start,
                },
                Some(decision.reason.clone()),
            )
            .await;
            return Err(PipelineError::Denied {
                reason: decision.reason,
                policy_id,
            });
        }

        if let Some(unmet) = unsupported_obligation(&decision.obligations) {
            let reason = format!("obligation '{unmet}' is not enforceable in this deployment");
            self.emit(
                AuditEventType::PolicyViolation,
                AuditDraft {
                    request_meta: &request_meta,
                    principal: Some(&principal),
                    server: Some(server_name.as_str().to_string()),
                    tool: Some(tool_name),
                    decision: Some("deny"),
                    policy_id: policy_id.clone(),
                    payload_hash: Some(params_hash.clone()),
                    start,
                },
                Some(reason.clone()),
            )
            .await;
            return Err(PipelineError::ObligationUnsupported(reason));
        }

        let proxied = match target {
            PipelineTarget::Server(_) => match self.registry.get_server(&server_name) {
                Ok(descriptor) => self
                    .transport
                    .invoke_tool(&descriptor, tool_name, params, sink)
                    .await
                    .map_err(map_transport_error),
                Err(e) => Err(PipelineError::ResourceNotFound(e.to_string())),
            },
            PipelineTarget::Group(id) => self
                .group_gateway
                .invoke_tool(id, tool_name, params, &principal, &request_meta, sink, self.audit.as_ref())
                .await
                .map_err(map_group_error),
        };

        let redacted = proxied.map(|value| apply_redactions(value, &decision.obligations));

        self.emit(
            AuditEventType::McpRequest,
            AuditDraft {
                request_meta: &request_meta,
                principal: Some(&principal),
                server: Some(server_name.as_str().to_string()),
                tool: Some(tool_name),
                decision: Some("allow"),
                policy_id,
                payload_hash: Some(params_hash),
                start,
            },
            redacted.as_ref().err().map(ToString::to_string),
        )
        .await;
        redacted.map(|value| (value, decision))
    }

    /// Resolves stage 3 (Resolved): looks up the target server, or for a
    /// group, the member that owns `tool_name`.
    async fn resolve_server_name(
        &self,
        target: &PipelineTarget,
        principal: &Principal,
        tool_name: &str,
        request_meta: &RequestMeta,
    ) -> Result<ServerName, PipelineError> {
        match target {
            PipelineTarget::Server(name) => {
                let descriptor = self
                    .registry
                    .get_server(name)
                    .map_err(|e| PipelineError::ResourceNotFound(e.to_string()))?;
                if !descriptor.enabled {
                    return Err(PipelineError::ResourceNotFound(format!("server '{name}' is disabled")));
                }
                Ok(name.clone())
            }
            PipelineTarget::Group(id) => {
                let group = self
                    .registry
                    .get_group(id)
                    .map_err(|e| PipelineError::ResourceNotFound(e.to_string()))?;
                if !group.enabled {
                    return Err(PipelineError::ResourceNotFound(format!("group '{id}' is disabled")));
                }
                let tools = self
                    .group_gateway
                    .list_tools(id, principal, request_meta, self.audit.as_ref())
                    .await
                    .map_err(map_group_error)?;
                let source = tools
                    .iter()
                    .find(|t| t.name == tool_name)
                    .and_then(|t| t.source_server.clone())
                    .ok_or_else(|| PipelineError::ResourceNotFound(format!("tool '{tool_name}' not found in group '{id}'")))?;
                ServerName::new(source).map_err(PipelineError::ResourceNotFound)
            }
        }
    }

    /// Builds and emits one audit record. Failures to write are logged and
    /// never propagated; a broken audit sink must not fail the request.
    async fn emit(&self, event_type: AuditEventType, draft: AuditDraft<'_>, error: Option<String>) {
        let record = AuditRecord {
            timestamp: Timestamp::now(),
            trace_id: draft.request_meta.trace_id.clone(),
            event_type,
            principal_subject: draft.principal.map(|p| p.subject_id.clone()),
            principal_email: draft.principal.and_then(|p| p.email.clone()),
            server: draft.server,
            tool: draft.tool.map(ToString::to_string),
            parameters_hash: draft.payload_hash.unwrap_or_default(),
            decision: draft.decision.map(ToString::to_string),
            policy_id: draft.policy_id,
            rule_id: None,
            obligations: Vec::new(),
            response_status: if error.is_some() { 0 } else { 200 },
            duration_ms: u64::try_from(draft.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            error,
        };
        if let Err(e) = self.audit.emit(record).await {
            tracing::warn!(error = %e, "audit sink write failed");
        }
    }
}

/// Renders a target for display in audit records and logs.
fn target_label(target: &PipelineTarget) -> String {
    match target {
        PipelineTarget::Server(name) => name.as_str().to_string(),
        PipelineTarget::Group(id) => format!("group:{id}"),
    }
}

/// Maps a group-gateway failure onto the pipeline's reject taxonomy.
fn map_group_error(e: GroupGatewayError) -> PipelineError {
    match e {
        GroupGatewayError::Registry(re) => PipelineError::ResourceNotFound(re.to_string()),
        GroupGatewayError::ToolNotFound(name) => PipelineError::ResourceNotFound(name),
        GroupGatewayError::Transport(te) => map_transport_error(te),
    }
}

/// Maps a transport failure onto the pipeline's reject taxonomy,
/// distinguishing a downstream timeout from every other upstream failure so
/// callers can surface a `504` instead of a blanket `502`.
fn map_transport_error(e: TransportError) -> PipelineError {
    match e {
        TransportError::Timeout { .. } => PipelineError::Timeout(e.to_string()),
        other => PipelineError::Upstream(other.to_string()),
    }
}

/// Returns the name of the first unsupported obligation type, if any.
fn unsupported_obligation(obligations: &[Action]) -> Option<&'static str> {
    obligations.iter().find_map(|action| match action.action_type {
        ActionType::RateLimit => Some("rate_limit"),
        ActionType::RequireApproval => Some("require_approval"),
        _ => None,
    })
}

/// Applies every `redact` obligation's field paths to `value`, replacing
/// the value at each dotted path with `null`.
fn apply_redactions(mut value: serde_json::Value, obligations: &[Action]) -> serde_json::Value {
    for action in obligations {
        if action.action_type != ActionType::Redact {
            continue;
        }
        if let Some(paths) = action.params.get("fields").and_then(serde_json::Value::as_array) {
            for path in paths.iter().filter_map(serde_json::Value::as_str) {
                redact_path(&mut value, path);
            }
        }
    }
    value
}

/// Sets the value at a dotted field path to `null`, if it exists.
fn redact_path(value: &mut serde_json::Value, path: &str) {
    let mut cursor = value;
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, head)) = segments.split_last() else {
        return;
    };
    for segment in head {
        match cursor.get_mut(*segment) {
            Some(next) => cursor = next,
            None => return,
        }
    }
    if let Some(target) = cursor.get_mut(*last) {
        *target = serde_json::Value::Null;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_path_nulls_out_nested_field() {
        let mut value = serde_json::json!({ "user": { "ssn": "123-45-6789", "name": "Ada" } });
        redact_path(&mut value, "user.ssn");
        assert_eq!(value["user"]["ssn"], serde_json::Value::Null);
        assert_eq!(value["user"]["name"], "Ada");
    }

    #[test]
    fn redact_path_ignores_missing_field() {
        let mut value = serde_json::json!({ "user": { "name": "Ada" } });
        redact_path(&mut value, "user.missing.deeper");
        assert_eq!(value["user"]["name"], "Ada");
    }

    #[test]
    fn unsupported_obligation_flags_rate_limit() {
        let obligations = vec![Action::simple(ActionType::RateLimit)];
        assert_eq!(unsupported_obligation(&obligations), Some("rate_limit"));
    }

    #[test]
    fn unsupported_obligation_ignores_redact_and_audit() {
        let obligations = vec![Action::simple(ActionType::Redact), Action::simple(ActionType::Audit)];
        assert_eq!(unsupported_obligation(&obligations), None);
    }

    #[test]
    fn apply_redactions_nulls_listed_fields() {
        let mut action = Action::simple(ActionType::Redact);
        action.params.insert(
            "fields".to_string(),
            serde_json::json!(["user.ssn"]),
        );
        let value = serde_json::json!({ "user": { "ssn": "123-45-6789" } });
        let redacted = apply_redactions(value, &[action]);
        assert_eq!(redacted["user"]["ssn"], serde_json::Value::Null);
    }

    #[test]
    fn hash_payload_is_deterministic_and_content_sensitive() {
        let a = serde_json::json!({ "to": "alice@corp.example" });
        let b = serde_json::json!({ "to": "alice@corp.example" });
        let c = serde_json::json!({ "to": "bob@corp.example" });
        assert_eq!(hash_payload(&a), hash_payload(&b));
        assert_ne!(hash_payload(&a), hash_payload(&c));
    }

    #[test]
    fn map_transport_error_distinguishes_timeout_from_unreachable() {
        let timeout = map_transport_error(TransportError::Timeout {
            server: "gmail".to_string(),
        });
        assert!(matches!(timeout, PipelineError::Timeout(_)));

        let unreachable = map_transport_error(TransportError::Unreachable {
            server: "gmail".to_string(),
            detail: "connection refused".to_string(),
        });
        assert!(matches!(unreachable, PipelineError::Upstream(_)));
    }
}
