// crates/mcpgate-http/src/lib.rs
// ============================================================================
// Module: HTTP Surface
// Description: The axum `Router` exposing policy CRUD, server/group CRUD,
//              and the MCP protocol surface over HTTP.
// Purpose: Compose `mcpgate-gateway` and `mcpgate-policy` into the one
//          process entry point `mcpgate-server` binds and serves.
// Dependencies: axum, tower-http, mcpgate-gateway, mcpgate-core
// ============================================================================

//! ## Overview
//! This crate owns no policy or routing logic of its own; it is the
//! boundary that turns HTTP requests into calls against
//! [`mcpgate_gateway::RequestPipeline`], [`mcpgate_core::interfaces::PolicyRepo`],
//! and [`mcpgate_core::interfaces::ServerRegistry`], and turns their results
//! back into the JSON shapes callers expect. See [`routes`] for the route
//! tree and [`error::ApiError`] for the shared error-to-status mapping.

pub mod auth;
pub mod error;
pub mod id;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
