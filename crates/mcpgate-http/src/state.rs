// crates/mcpgate-http/src/state.rs
// ============================================================================
// Module: Application State
// Description: The shared, `Clone`-cheap handle every handler closes over.
// Purpose: Give axum's `State` extractor one struct wiring every
//          collaborator the surface needs.
// Dependencies: mcpgate-core, mcpgate-gateway, mcpgate-adapter
// ============================================================================

use std::sync::Arc;

use mcpgate_core::interfaces::PolicyRepo;
use mcpgate_core::interfaces::ServerRegistry;
use mcpgate_core::interfaces::StdioAdapterSupervisor;
use mcpgate_gateway::Authenticator;
use mcpgate_gateway::RequestPipeline;

/// Everything a handler needs, cheaply `Clone`-able via `Arc` fields.
#[derive(Clone)]
pub struct AppState {
    /// Per-request orchestration for the MCP protocol surface.
    pub pipeline: Arc<RequestPipeline>,
    /// CRUD backing for the policy API.
    pub policy_repo: Arc<dyn PolicyRepo>,
    /// Server/group registry backing the server/group API.
    pub registry: Arc<dyn ServerRegistry>,
    /// Stdio adapter supervisor backing `/mcp/servers/:name/convert`.
    pub adapters: Arc<dyn StdioAdapterSupervisor>,
    /// Verifies bearer tokens for every non-health route.
    pub authenticator: Arc<dyn Authenticator>,
    /// Accepted `X-API-Key` value for admin routes, if configured.
    pub admin_api_key: Option<String>,
}
