// crates/mcpgate-http/src/routes/mcp.rs
// ============================================================================
// Module: MCP Protocol Routes
// Description: The client-facing surface a proxied MCP client actually
//              talks to: list-tools and invoke, for a server or a group.
// Purpose: Compose `RequestPipeline` into the response envelope callers see.
// Dependencies: axum, mcpgate-core, mcpgate-gateway
// ============================================================================

//! ## Overview
//! Every handler here extracts the caller's bearer token directly from the
//! `Authorization` header rather than relying on [`crate::auth::require_auth`]:
//! [`mcpgate_gateway::RequestPipeline`] re-authenticates internally so it can
//! emit exactly one audit record per call regardless of which stage rejects
//! the request. The middleware layer still runs first and supplies a
//! `Principal` extension for routes that need one outside the pipeline
//! (none in this module), but the pipeline's own authentication is what
//! actually gates these endpoints.

use std::time::Instant;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use async_trait::async_trait;
use mcpgate_core::core::identifiers::GroupId;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::model::Decision;
use mcpgate_core::core::model::RequestMeta;
use mcpgate_core::interfaces::StreamEvent;
use mcpgate_core::interfaces::StreamSink;
use mcpgate_core::interfaces::ToolDefinition;
use mcpgate_gateway::Authenticator;
use mcpgate_gateway::PipelineTarget;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::id::generate;
use crate::state::AppState;

/// Discards every streamed event; this surface returns one JSON response
/// per call rather than streaming intermediate results to the client.
struct NoopStreamSink;

#[async_trait]
impl StreamSink for NoopStreamSink {
    async fn send(&self, _event: StreamEvent) {}
}

/// Extracts the bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::AuthInvalid)
}

/// Builds per-request metadata from the caller's `X-Forwarded-For` header
/// and a freshly generated trace id.
fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    RequestMeta {
        ip,
        trace_id: generate("trc"),
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerQuery {
    /// Target server name.
    mcp_server: String,
}

/// `GET /mcp/list-tools?mcp_server=<name>`
pub async fn list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ServerQuery>,
) -> Result<Json<Vec<ToolDefinition>>, ApiError> {
    let token = bearer_token(&headers)?;
    let name = ServerName::new(query.mcp_server).map_err(ApiError::BadRequest)?;
    let tools = state
        .pipeline
        .list_tools(token, &PipelineTarget::Server(name), request_meta(&headers))
        .await?;
    Ok(Json(tools))
}

/// `GET /mcp/group/:id/list-tools`
pub async fn group_list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<ToolDefinition>>, ApiError> {
    let token = bearer_token(&headers)?;
    let tools = state
        .pipeline
        .list_tools(token, &PipelineTarget::Group(GroupId::new(id)), request_meta(&headers))
        .await?;
    Ok(Json(tools))
}

#[derive(Debug, Deserialize)]
pub struct InvokeBody {
    /// The tool to invoke.
    tool_name: String,
    /// Tool invocation parameters.
    #[serde(default)]
    params: serde_json::Value,
}

/// The response envelope every invocation, successful or not, is wrapped in.
#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    /// Whether the invocation reached the backend and returned a result.
    success: bool,
    /// The tool that was invoked.
    tool_name: String,
    /// The server or group the call was addressed to.
    mcp_server: String,
    /// Present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    /// Present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Wall-clock time spent in the pipeline, in milliseconds.
    execution_time_ms: u64,
    /// The policy decision that authorized (or rejected) the call.
    decision: DecisionView,
}

/// The `decision` field of [`InvokeResponse`].
#[derive(Debug, Serialize)]
struct DecisionView {
    /// `"allow"` or `"deny"`.
    effect: &'static str,
    /// The policy whose rule matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_id: Option<String>,
    /// The rule within that policy that matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
    /// Non-effect actions attached to the decision (e.g. `redact`).
    obligations: Vec<String>,
}

impl From<&Decision> for DecisionView {
    fn from(decision: &Decision) -> Self {
        Self {
            effect: if decision.is_allow() { "allow" } else { "deny" },
            policy_id: decision.matched_policy_id.as_ref().map(ToString::to_string),
            rule_id: decision.matched_rule_id.as_ref().map(ToString::to_string),
            obligations: decision.obligations.iter().map(|a| format!("{:?}", a.action_type)).collect(),
        }
    }
}

/// Shared body for `invoke` and `group_invoke`: runs the pipeline and wraps
/// the outcome, success or failure, in one [`InvokeResponse`].
async fn run_invoke(
    state: &AppState,
    token: &str,
    target: &PipelineTarget,
    server_label: String,
    tool_name: String,
    params: serde_json::Value,
    meta: RequestMeta,
) -> Json<InvokeResponse> {
    let start = Instant::now();
    let outcome = state
        .pipeline
        .invoke_tool(token, target, &tool_name, params, &NoopStreamSink, meta)
        .await;
    let execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let response = match outcome {
        Ok((value, decision)) => InvokeResponse {
            success: true,
            tool_name,
            mcp_server: server_label,
            result: Some(value),
            error: None,
            execution_time_ms,
            decision: DecisionView::from(&decision),
        },
        Err(err) => {
            let (policy_id, effect) = match &err {
                mcpgate_gateway::PipelineError::Denied { policy_id, .. } => (policy_id.clone(), "deny"),
                _ => (None, "deny"),
            };
            InvokeResponse {
                success: false,
                tool_name,
                mcp_server: server_label,
                result: None,
                error: Some(err.to_string()),
                execution_time_ms,
                decision: DecisionView {
                    effect,
                    policy_id,
                    rule_id: None,
                    obligations: Vec::new(),
                },
            }
        }
    };
    Json(response)
}

/// `POST /mcp/invoke?mcp_server=<name>`
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ServerQuery>,
    Json(body): Json<InvokeBody>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let token = bearer_token(&headers)?.to_string();
    let meta = request_meta(&headers);
    let server = query.mcp_server.clone();
    let target = PipelineTarget::Server(ServerName::new(query.mcp_server).map_err(ApiError::BadRequest)?);
    Ok(run_invoke(&state, &token, &target, server, body.tool_name, body.params, meta).await)
}

/// `POST /mcp/group/:id/invoke`
pub async fn group_invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<InvokeBody>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let token = bearer_token(&headers)?.to_string();
    let meta = request_meta(&headers);
    let target = PipelineTarget::Group(GroupId::new(id.clone()));
    Ok(run_invoke(&state, &token, &target, id, body.tool_name, body.params, meta).await)
}

/// `GET /mcp/servers/:name/policy-allowed-tools`
///
/// Lists the tools a server exposes, filtered to those an `allow`-effect
/// policy currently permits for the caller, by evaluating each one against
/// the compiled policy set with no backend call.
pub async fn policy_allowed_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let token = bearer_token(&headers)?;
    let server_name = ServerName::new(name.clone()).map_err(ApiError::BadRequest)?;
    let tools = state
        .pipeline
        .list_tools(token, &PipelineTarget::Server(server_name), request_meta(&headers))
        .await?;

    let principal = state
        .authenticator
        .authenticate(token)
        .await
        .map_err(|_| ApiError::AuthInvalid)?;

    let allowed = tools
        .into_iter()
        .filter(|tool| {
            let context = mcpgate_core::core::model::RequestContext {
                principal: principal.clone(),
                server: name.clone(),
                tool: tool.name.clone(),
                payload: serde_json::Value::Null,
                request_meta: RequestMeta { ip: None, trace_id: generate("trc") },
            };
            state.pipeline.evaluate_only(&context).map(|d| d.is_allow()).unwrap_or(false)
        })
        .map(|tool| tool.name)
        .collect();
    Ok(Json(allowed))
}
