// crates/mcpgate-transport/src/lib.rs
// ============================================================================
// Module: MCP Gate Transport
// Description: `McpTransport` implementations and the stdio wire framing
//              they (and the adapter supervisor) share.
// Purpose: Speak every MCP dialect (http, sse, and — once adapted — stdio
//          reverse-proxied as http) behind one trait.
// Dependencies: mcpgate-core, mcpgate-credentials, reqwest
// ============================================================================

//! ## Overview
//! [`http::HttpMcpTransport`] is the only [`mcpgate_core::interfaces::McpTransport`]
//! implementation; it handles both the `http` and `sse` dialects, selected
//! per call from `ServerDescriptor::transport`. A stdio-declared server is
//! never passed to this transport directly — `mcpgate-adapter` converts it
//! to a loopback `http` endpoint first. [`framing`] is the shared
//! `Content-Length` wire format both that adapter and any future native
//! stdio client would use.

pub mod error;
pub mod framing;
pub mod http;
pub mod jsonrpc;

pub use error::FramingError;
pub use http::HttpMcpTransport;
