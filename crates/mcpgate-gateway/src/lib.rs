// crates/mcpgate-gateway/src/lib.rs
// ============================================================================
// Module: Gateway
// Description: The request pipeline and its collaborators: authentication,
//              the server/group registry, and virtual group aggregation.
// Purpose: Compose `mcpgate-core`'s trait contracts into the concrete
//          request-handling surface `mcpgate-http` and `mcpgate-server` wire
//          up at their composition root.
// Dependencies: mcpgate-core
// ============================================================================

//! Per-request orchestration for the gateway: bearer authentication
//! ([`auth`]), the in-memory server/group registry ([`registry`]), virtual
//! group aggregation ([`group`]), and the six-stage request pipeline that
//! ties them together ([`pipeline`]).

pub mod auth;
pub mod group;
pub mod pipeline;
pub mod registry;

pub use auth::AuthError;
pub use auth::Authenticator;
pub use auth::JwksAuthenticator;
pub use auth::JwksAuthenticatorConfig;
pub use auth::StaticAuthenticator;
pub use group::DefaultGroupGateway;
pub use group::GroupGatewayError;
pub use pipeline::PipelineError;
pub use pipeline::PipelineTarget;
pub use pipeline::RequestPipeline;
pub use registry::InMemoryServerRegistry;
