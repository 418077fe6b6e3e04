// crates/mcpgate-transport/src/http.rs
// ============================================================================
// Module: HTTP/SSE MCP Transport
// Description: `McpTransport` implementation for backends speaking plain
//              HTTP JSON-RPC or HTTP with an SSE response.
// Purpose: Proxy `tools/list`/`tools/call` to a backend, injecting
//          credentials and streaming SSE events to the caller in order.
// Dependencies: mcpgate-core, mcpgate-credentials, reqwest, serde_json
// ============================================================================

//! ## Overview
//! One [`HttpMcpTransport`] serves every HTTP and SSE backend; the dialect
//! is selected per call from [`ServerDescriptor::transport`]. Credentials
//! are resolved fresh on every call — this transport caches nothing
//! secret-shaped across requests.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use mcpgate_core::core::model::CredentialLocation;
use mcpgate_core::core::model::ServerDescriptor;
use mcpgate_core::core::model::Transport;
use mcpgate_core::interfaces::CredentialResolver;
use mcpgate_core::interfaces::McpTransport;
use mcpgate_core::interfaces::StreamEvent;
use mcpgate_core::interfaces::StreamSink;
use mcpgate_core::interfaces::ToolDefinition;
use mcpgate_core::interfaces::TransportError;
use mcpgate_credentials::format_credential;
use reqwest::Client;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;

use crate::jsonrpc::JsonRpcRequest;
use crate::jsonrpc::JsonRpcResponse;
use crate::jsonrpc::ToolCallResult;
use crate::jsonrpc::ToolContent;
use crate::jsonrpc::ToolListResult;

/// Default cap on a backend response body, before any per-server override.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// `McpTransport` for backends reachable over HTTP or HTTP+SSE.
pub struct HttpMcpTransport {
    /// Shared reqwest client.
    client: Client,
    /// Resolves `auth` references to injectable credentials.
    credentials: Arc<dyn CredentialResolver>,
    /// Hard cap on a backend response body.
    max_response_bytes: usize,
    /// Monotonically increasing JSON-RPC request id, shared across backends.
    next_id: AtomicU64,
}

impl HttpMcpTransport {
    /// Builds a transport using `credentials` to resolve outbound auth.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            client: Client::new(),
            credentials,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            next_id: AtomicU64::new(1),
        }
    }

    /// Overrides the default response size cap.
    #[must_use]
    pub const fn with_max_response_bytes(mut self, max_response_bytes: usize) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    /// Sends one JSON-RPC request to `server` and returns the parsed
    /// envelope, applying credential injection and the SSE dialect if
    /// configured.
    async fn send(
        &self,
        server: &ServerDescriptor,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_vec(&request).map_err(|e| TransportError::Protocol {
            server: server.name.as_str().to_string(),
            detail: e.to_string(),
        })?;

        let sse = matches!(server.transport, Transport::Sse);
        let mut req = self.client.post(&server.url).body(payload);
        req = req.headers(self.headers(server, sse)?);
        if let Some(timeout) = server.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await.map_err(|e| map_reqwest_error(&e, server))?;
        let status = response.status();
        let body = read_body_with_limit(response, self.max_response_bytes, server).await?;
        if !status.is_success() {
            return Err(TransportError::Protocol {
                server: server.name.as_str().to_string(),
                detail: format!("http status {}", status.as_u16()),
            });
        }

        let json_bytes = if sse { parse_sse_body(&body, server)? } else { body };
        let parsed: JsonRpcResponse =
            serde_json::from_slice(&json_bytes).map_err(|e| TransportError::Protocol {
                server: server.name.as_str().to_string(),
                detail: e.to_string(),
            })?;
        if let Some(error) = &parsed.error {
            return Err(TransportError::Remote {
                server: server.name.as_str().to_string(),
                message: error.message.clone(),
            });
        }
        Ok(parsed)
    }

    /// Builds outbound headers, injecting the resolved credential if
    /// `server.auth` is configured and `location = header`.
    fn headers(&self, server: &ServerDescriptor, sse: bool) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if sse {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        if let Some(auth) = &server.auth {
            if matches!(auth.location, CredentialLocation::Header) {
                let resolved =
                    self.credentials.resolve(auth).map_err(|e| TransportError::Unreachable {
                        server: server.name.as_str().to_string(),
                        detail: e.to_string(),
                    })?;
                let value = format_credential(auth, &resolved.value).map_err(|e| {
                    TransportError::Unreachable {
                        server: server.name.as_str().to_string(),
                        detail: e,
                    }
                })?;
                let header = HeaderValue::from_str(&value).map_err(|_| TransportError::Unreachable {
                    server: server.name.as_str().to_string(),
                    detail: "invalid credential header value".to_string(),
                })?;
                headers.insert(
                    reqwest::header::HeaderName::from_bytes(auth.name.as_bytes()).map_err(|_| {
                        TransportError::Unreachable {
                            server: server.name.as_str().to_string(),
                            detail: "invalid credential header name".to_string(),
                        }
                    })?,
                    header,
                );
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl McpTransport for HttpMcpTransport {
    async fn list_tools(&self, server: &ServerDescriptor) -> Result<Vec<ToolDefinition>, TransportError> {
        let response = self.send(server, "tools/list", None).await?;
        let result = response.result.ok_or_else(|| TransportError::Protocol {
            server: server.name.as_str().to_string(),
            detail: "missing result in tools/list response".to_string(),
        })?;
        let parsed: ToolListResult =
            serde_json::from_value(result).map_err(|e| TransportError::Protocol {
                server: server.name.as_str().to_string(),
                detail: e.to_string(),
            })?;
        Ok(parsed.tools)
    }

    async fn invoke_tool(
        &self,
        server: &ServerDescriptor,
        tool: &str,
        params: serde_json::Value,
        sink: &(dyn StreamSink + Sync),
    ) -> Result<serde_json::Value, TransportError> {
        let rpc_params = serde_json::json!({ "name": tool, "arguments": params });
        let response = self.send(server, "tools/call", Some(rpc_params)).await?;
        let result = response.result.ok_or_else(|| TransportError::Protocol {
            server: server.name.as_str().to_string(),
            detail: format!("missing result for tool {tool}"),
        })?;
        let parsed: ToolCallResult =
            serde_json::from_value(result.clone()).map_err(|e| TransportError::Protocol {
                server: server.name.as_str().to_string(),
                detail: e.to_string(),
            })?;
        sink.send(StreamEvent {
            data: result.to_string().into_bytes(),
        })
        .await;
        let json = parsed
            .content
            .into_iter()
            .map(|item| match item {
                ToolContent::Json { json } => json,
            })
            .next()
            .ok_or_else(|| TransportError::Protocol {
                server: server.name.as_str().to_string(),
                detail: format!("tool {tool} returned no json content"),
            })?;
        Ok(json)
    }
}

/// Maps a `reqwest` send/read failure to the transport error taxonomy,
/// distinguishing an elapsed deadline from any other connection failure.
fn map_reqwest_error(error: &reqwest::Error, server: &ServerDescriptor) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            server: server.name.as_str().to_string(),
        }
    } else {
        TransportError::Unreachable {
            server: server.name.as_str().to_string(),
            detail: error.to_string(),
        }
    }
}

/// Reads a response body while enforcing `limit` bytes.
async fn read_body_with_limit(
    mut response: reqwest::Response,
    limit: usize,
    server: &ServerDescriptor,
) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    let mut total = 0_usize;
    while let Some(chunk) = response.chunk().await.map_err(|e| map_reqwest_error(&e, server))? {
        total = total.saturating_add(chunk.len());
        if total > limit {
            return Err(TransportError::ResponseTooLarge {
                server: server.name.as_str().to_string(),
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Extracts the first `data:` payload from an SSE response body.
fn parse_sse_body(body: &[u8], server: &ServerDescriptor) -> Result<Vec<u8>, TransportError> {
    let text = std::str::from_utf8(body).map_err(|_| TransportError::Protocol {
        server: server.name.as_str().to_string(),
        detail: "sse response was not valid utf-8".to_string(),
    })?;
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            if !data_lines.is_empty() {
                break;
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start());
        }
    }
    if data_lines.is_empty() {
        return Err(TransportError::Protocol {
            server: server.name.as_str().to_string(),
            detail: "sse response missing data".to_string(),
        });
    }
    Ok(data_lines.join("\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_body_extracts_first_data_block() {
        let server = sample_server();
        let body = b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        let parsed = parse_sse_body(body, &server).unwrap();
        assert_eq!(parsed, br#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }

    #[test]
    fn sse_body_without_data_is_an_error() {
        let server = sample_server();
        let err = parse_sse_body(b"event: ping\n\n", &server).unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }

    fn sample_server() -> ServerDescriptor {
        ServerDescriptor {
            name: mcpgate_core::core::identifiers::ServerName::new("github").unwrap(),
            url: "https://example.invalid/mcp".to_string(),
            transport: Transport::Sse,
            enabled: true,
            description: None,
            tags: std::collections::BTreeSet::new(),
            timeout: None,
            auth: None,
            metadata: std::collections::BTreeMap::new(),
        }
    }
}
