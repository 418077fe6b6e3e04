// crates/mcpgate-gateway/src/group.rs
// ============================================================================
// Module: Group Gateway
// Description: Aggregates N backend servers behind one virtual MCP endpoint.
// Purpose: Give a caller a single `list_tools`/`invoke_tool` surface over a
//          `ServerGroup`, policy-filtered and deduplicated.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`DefaultGroupGateway`] fans `list_tools` out to every group member with
//! bounded concurrency, filters each member's tools by the group's
//! `tool_config` and then by a hypothetical policy evaluation (would
//! `invoke_tool` be denied for this principal?), and deduplicates by tool
//! name first-wins in member order. `invoke_tool` resolves the owning
//! member either from an explicit `_source_server` hint or by repeating the
//! same filtered-list resolution, then forwards through `McpTransport`
//! without retrying against other members.

use std::collections::BTreeSet;
use std::sync::Arc;

use mcpgate_core::core::identifiers::GroupId;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::model::Principal;
use mcpgate_core::core::model::RequestContext;
use mcpgate_core::core::model::RequestMeta;
use mcpgate_core::core::model::ServerGroup;
use mcpgate_core::interfaces::AuditEventType;
use mcpgate_core::interfaces::AuditRecord;
use mcpgate_core::interfaces::AuditSink;
use mcpgate_core::interfaces::McpTransport;
use mcpgate_core::interfaces::PolicyEvaluator;
use mcpgate_core::interfaces::RegistryError;
use mcpgate_core::interfaces::ServerRegistry;
use mcpgate_core::interfaces::StreamSink;
use mcpgate_core::interfaces::ToolDefinition;
use mcpgate_core::interfaces::TransportError;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Default bound on concurrent member fan-out for `list_tools`.
const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Errors surfaced by [`DefaultGroupGateway`].
#[derive(Debug, Error)]
pub enum GroupGatewayError {
    /// The group or a member server does not exist.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// No member exposes the requested tool.
    #[error("tool '{0}' not found in any group member")]
    ToolNotFound(String),
    /// The resolved member's transport call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Aggregates a [`ServerGroup`]'s members behind one virtual endpoint.
pub struct DefaultGroupGateway {
    /// Server/group registry.
    registry: Arc<dyn ServerRegistry>,
    /// Transport used to reach every member (all members are HTTP by the
    /// time they can join a group).
    transport: Arc<dyn McpTransport>,
    /// Evaluator used for the hypothetical per-tool policy check.
    evaluator: Arc<dyn PolicyEvaluator>,
    /// Bound on concurrent member fan-out.
    fanout_concurrency: usize,
}

impl DefaultGroupGateway {
    /// Builds a gateway over `registry`/`transport`/`evaluator` with the
    /// default fan-out concurrency.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        transport: Arc<dyn McpTransport>,
        evaluator: Arc<dyn PolicyEvaluator>,
    ) -> Self {
        Self {
            registry,
            transport,
            evaluator,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }

    /// Lists the group's tools, filtered by membership config and policy.
    ///
    /// # Errors
    ///
    /// Returns [`GroupGatewayError::Registry`] if `group_id` does not exist.
    pub async fn list_tools(
        &self,
        group_id: &GroupId,
        principal: &Principal,
        request_meta: &RequestMeta,
        audit: &(dyn AuditSink),
    ) -> Result<Vec<ToolDefinition>, GroupGatewayError> {
        let group = self.registry.get_group(group_id)?;
        let per_member = self.fetch_member_tools(&group, principal, request_meta, audit).await;

        let mut seen = BTreeSet::new();
        let mut merged = Vec::new();
        for (_, tools) in per_member {
            for tool in tools {
                if seen.insert(tool.name.clone()) {
                    merged.push(tool);
                }
            }
        }
        Ok(merged)
    }

    /// Invokes `tool_name` on the group, resolving the owning member.
    ///
    /// # Errors
    ///
    /// Returns [`GroupGatewayError::Registry`], [`GroupGatewayError::ToolNotFound`],
    /// or [`GroupGatewayError::Transport`].
    pub async fn invoke_tool(
        &self,
        group_id: &GroupId,
        tool_name: &str,
        params: serde_json::Value,
        principal: &Principal,
        request_meta: &RequestMeta,
        sink: &(dyn StreamSink + Sync),
        audit: &(dyn AuditSink),
    ) -> Result<serde_json::Value, GroupGatewayError> {
        let group = self.registry.get_group(group_id)?;
        let member = self.resolve_member(&group, tool_name, &params, principal, request_meta, audit).await?;
        let descriptor = self.registry.get_server(&member)?;
        let result = self
            .transport
            .invoke_tool(&descriptor, tool_name, params, sink)
            .await?;
        Ok(result)
    }

    /// Resolves which member owns `tool_name`: an explicit `_source_server`
    /// hint first, else the first member (in order) whose filtered tool
    /// list contains it.
    async fn resolve_member(
        &self,
        group: &ServerGroup,
        tool_name: &str,
        params: &serde_json::Value,
        principal: &Principal,
        request_meta: &RequestMeta,
        audit: &(dyn AuditSink),
    ) -> Result<ServerName, GroupGatewayError> {
        if let Some(hint) = params.get("_source_server").and_then(serde_json::Value::as_str) {
            if let Ok(name) = ServerName::new(hint) {
                if group.member_names.contains(&name) {
                    return Ok(name);
                }
            }
        }
        let per_member = self.fetch_member_tools(group, principal, request_meta, audit).await;
        for (member, tools) in per_member {
            if tools.iter().any(|t| t.name == tool_name) {
                return Ok(member);
            }
        }
        Err(GroupGatewayError::ToolNotFound(tool_name.to_string()))
    }

    /// Fetches and policy-filters each member's tool list, bounded by
    /// `fanout_concurrency`. A member whose fetch fails contributes no
    /// tools; the failure is audited, not propagated.
    async fn fetch_member_tools(
        &self,
        group: &ServerGroup,
        principal: &Principal,
        request_meta: &RequestMeta,
        audit: &(dyn AuditSink),
    ) -> Vec<(ServerName, Vec<ToolDefinition>)> {
        let semaphore = Arc::new(Semaphore::new(self.fanout_concurrency.max(1)));
        let mut tasks = tokio::task::JoinSet::new();
        for member in &group.member_names {
            let member = member.clone();
            let selector = group.selector_for(&member);
            let registry = Arc::clone(&self.registry);
            let transport = Arc::clone(&self.transport);
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(&semaphore);
            let principal = principal.clone();
            let request_meta = request_meta.clone();
            tasks.spawn(async move {
                #[allow(clippy::unwrap_used, reason = "semaphore is never closed while tasks are outstanding")]
                let _permit = semaphore.acquire().await.unwrap();
                let descriptor = match registry.get_server(&member) {
                    Ok(d) => d,
                    Err(_) => return (member, Vec::new()),
                };
                let tools = match transport.list_tools(&descriptor).await {
                    Ok(tools) => tools,
                    Err(_) => return (member, Vec::new()),
                };
                let filtered = tools
                    .into_iter()
                    .filter(|tool| selector.selects(&tool.name))
                    .filter(|tool| {
                        hypothetical_allow(&evaluator, &principal, member.as_str(), &tool.name, &request_meta)
                    })
                    .map(|mut tool| {
                        tool.source_server = Some(member.as_str().to_string());
                        tool
                    })
                    .collect();
                (member, filtered)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            } else {
                audit_fanout_failure(audit).await;
            }
        }
        results.sort_by(|a, b| {
            let pos = |name: &ServerName| group.member_names.iter().position(|m| m == name).unwrap_or(usize::MAX);
            pos(&a.0).cmp(&pos(&b.0))
        });
        results
    }
}

/// Evaluates whether `tool` on `server` would be allowed for `principal`,
/// without actually invoking it.
fn hypothetical_allow(
    evaluator: &Arc<dyn PolicyEvaluator>,
    principal: &Principal,
    server: &str,
    tool: &str,
    request_meta: &RequestMeta,
) -> bool {
    let context = RequestContext {
        principal: principal.clone(),
        server: server.to_string(),
        tool: tool.to_string(),
        payload: serde_json::Value::Null,
        request_meta: request_meta.clone(),
    };
    evaluator
        .evaluate(&context)
        .map(|decision| decision.is_allow())
        .unwrap_or(false)
}

/// Best-effort audit emission for a member whose fan-out task panicked.
async fn audit_fanout_failure(audit: &(dyn AuditSink)) {
    let record = AuditRecord {
        timestamp: mcpgate_core::core::time::Timestamp::now(),
        trace_id: String::new(),
        event_type: AuditEventType::McpRequest,
        principal_subject: None,
        principal_email: None,
        server: None,
        tool: None,
        parameters_hash: String::new(),
        decision: None,
        policy_id: None,
        rule_id: None,
        obligations: Vec::new(),
        response_status: 0,
        duration_ms: 0,
        error: Some("group member fan-out task failed".to_string()),
    };
    let _ = audit.emit(record).await;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use mcpgate_core::core::model::Action;
    use mcpgate_core::core::model::ActionType;
    use mcpgate_core::core::model::Decision;
    use mcpgate_core::core::model::Effect;
    use mcpgate_core::core::model::ServerDescriptor;
    use mcpgate_core::core::model::Transport;
    use mcpgate_core::interfaces::AuditError;
    use mcpgate_core::interfaces::EvaluatorError;
    use mcpgate_core::interfaces::StreamEvent;

    use super::*;

    struct AllowAllEvaluator;
    impl PolicyEvaluator for AllowAllEvaluator {
        fn evaluate(&self, _context: &RequestContext) -> Result<Decision, EvaluatorError> {
            Ok(Decision {
                effect: Effect::Allow,
                matched_policy_id: None,
                matched_rule_id: None,
                reason: "test".to_string(),
                obligations: vec![Action::simple(ActionType::Allow)],
            })
        }
    }

    struct StubTransport {
        tools_by_server: BTreeMap<String, Vec<ToolDefinition>>,
    }

    #[async_trait]
    impl McpTransport for StubTransport {
        async fn list_tools(&self, server: &ServerDescriptor) -> Result<Vec<ToolDefinition>, TransportError> {
            Ok(self
                .tools_by_server
                .get(server.name.as_str())
                .cloned()
                .unwrap_or_default())
        }

        async fn invoke_tool(
            &self,
            server: &ServerDescriptor,
            tool: &str,
            _params: serde_json::Value,
            _sink: &(dyn StreamSink + Sync),
        ) -> Result<serde_json::Value, TransportError> {
            Ok(serde_json::json!({ "server": server.name.as_str(), "tool": tool }))
        }
    }

    struct NoopAuditSink;
    #[async_trait]
    impl AuditSink for NoopAuditSink {
        async fn emit(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Ok(())
        }
    }

    struct NoopStreamSink;
    #[async_trait]
    impl StreamSink for NoopStreamSink {
        async fn send(&self, _event: StreamEvent) {}
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({}),
            source_server: None,
        }
    }

    fn server(name: &str) -> ServerDescriptor {
        ServerDescriptor {
            name: ServerName::new(name).unwrap(),
            url: format!("https://{name}.example.com"),
            transport: Transport::Http,
            enabled: true,
            description: None,
            tags: BTreeSet::new(),
            timeout: None,
            auth: None,
            metadata: BTreeMap::new(),
        }
    }

    fn principal() -> Principal {
        Principal {
            subject_id: "u-1".to_string(),
            email: None,
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            claims: BTreeMap::new(),
        }
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            ip: None,
            trace_id: "trace-1".to_string(),
        }
    }

    fn build(tools_by_server: BTreeMap<String, Vec<ToolDefinition>>) -> (DefaultGroupGateway, GroupId) {
        let registry = crate::registry::InMemoryServerRegistry::new();
        registry.put_server(server("a")).unwrap();
        registry.put_server(server("b")).unwrap();
        let group = ServerGroup {
            id: GroupId::new("g1"),
            name: "g1".to_string(),
            member_names: vec![ServerName::new("a").unwrap(), ServerName::new("b").unwrap()],
            tool_config: BTreeMap::new(),
            gateway_path: "/groups/g1".to_string(),
            enabled: true,
        };
        registry.put_group(group).unwrap();
        let gateway = DefaultGroupGateway::new(
            Arc::new(registry),
            Arc::new(StubTransport { tools_by_server }),
            Arc::new(AllowAllEvaluator),
        );
        (gateway, GroupId::new("g1"))
    }

    #[tokio::test]
    async fn list_tools_dedupes_first_wins_in_member_order() {
        let mut tools = BTreeMap::new();
        tools.insert("a".to_string(), vec![tool("search")]);
        tools.insert("b".to_string(), vec![tool("search"), tool("delete")]);
        let (gateway, group_id) = build(tools);
        let listed = gateway
            .list_tools(&group_id, &principal(), &meta(), &NoopAuditSink)
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["search".to_string(), "delete".to_string()]);
        assert_eq!(listed[0].source_server.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn invoke_tool_resolves_owning_member() {
        let mut tools = BTreeMap::new();
        tools.insert("a".to_string(), vec![tool("search")]);
        tools.insert("b".to_string(), vec![tool("delete")]);
        let (gateway, group_id) = build(tools);
        let result = gateway
            .invoke_tool(
                &group_id,
                "delete",
                serde_json::json!({}),
                &principal(),
                &meta(),
                &NoopStreamSink,
                &NoopAuditSink,
            )
            .await
            .unwrap();
        assert_eq!(result["server"], "b");
    }

    #[tokio::test]
    async fn invoke_tool_honors_explicit_source_server_hint() {
        let mut tools = BTreeMap::new();
        tools.insert("a".to_string(), vec![tool("search")]);
        tools.insert("b".to_string(), vec![tool("search")]);
        let (gateway, group_id) = build(tools);
        let result = gateway
            .invoke_tool(
                &group_id,
                "search",
                serde_json::json!({ "_source_server": "b" }),
                &principal(),
                &meta(),
                &NoopStreamSink,
                &NoopAuditSink,
            )
            .await
            .unwrap();
        assert_eq!(result["server"], "b");
    }

    #[tokio::test]
    async fn invoke_tool_not_found_anywhere_errors() {
        let (gateway, group_id) = build(BTreeMap::new());
        let err = gateway
            .invoke_tool(
                &group_id,
                "missing",
                serde_json::json!({}),
                &principal(),
                &meta(),
                &NoopStreamSink,
                &NoopAuditSink,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GroupGatewayError::ToolNotFound(_)));
    }
}
