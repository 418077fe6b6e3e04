// crates/mcpgate-adapter/src/lib.rs
// ============================================================================
// Module: MCP Gate Adapter
// Description: Converts stdio MCP servers into loopback HTTP servers so the
//              rest of the gateway only ever speaks HTTP.
// Purpose: Give `ServerRegistry`/`GroupGateway` a single transport story.
// Dependencies: mcpgate-core, axum, tokio
// ============================================================================

//! ## Overview
//! [`DefaultStdioAdapterSupervisor`] is the only
//! [`mcpgate_core::interfaces::StdioAdapterSupervisor`] implementation. It
//! owns a [`PortAllocator`] for the loopback range, spawns one child process
//! per converted server, and exposes that child over a tiny axum server
//! speaking plain HTTP on one side and `Content-Length`-framed stdio on the
//! other.

pub mod port;
pub mod supervisor;

pub use port::PortAllocator;
pub use supervisor::DefaultStdioAdapterSupervisor;
