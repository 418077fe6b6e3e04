// crates/mcpgate-transport/src/jsonrpc.rs
// ============================================================================
// Module: JSON-RPC Envelope
// Description: The request/response/error shapes shared by every transport.
// Purpose: One serde definition of the wire protocol, reused by HTTP, SSE,
//          and stdio.
// Dependencies: serde, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    /// Protocol version tag, always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request identifier.
    pub id: u64,
    /// Method name to invoke.
    pub method: &'a str,
    /// Optional parameters payload.
    pub params: Option<serde_json::Value>,
}

impl<'a> JsonRpcRequest<'a> {
    /// Builds a request with the standard `"2.0"` version tag.
    #[must_use]
    pub const fn new(id: u64, method: &'a str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    /// Result payload, present on success.
    pub result: Option<serde_json::Value>,
    /// Error payload, present on failure.
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error payload.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    /// Server-provided, untrusted error message.
    pub message: String,
}

/// `tools/list` result payload.
#[derive(Debug, Deserialize)]
pub struct ToolListResult {
    /// Tool definitions returned by the server.
    pub tools: Vec<mcpgate_core::interfaces::ToolDefinition>,
}

/// `tools/call` result payload.
#[derive(Debug, Deserialize)]
pub struct ToolCallResult {
    /// Tool response content entries; the gateway forwards the first JSON
    /// entry as the call's result.
    pub content: Vec<ToolContent>,
}

/// Tool response content variants.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// A JSON payload.
    Json {
        /// The JSON value.
        json: serde_json::Value,
    },
}
