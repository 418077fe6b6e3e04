// crates/mcpgate-http/src/routes/mod.rs
// ============================================================================
// Module: Routes
// Description: Assembles every route family into one `Router` and layers on
//              tracing, CORS, and authentication.
// Purpose: The single entry point `mcpgate-server` calls to get a bindable
//          `Router` for `axum_server::bind`.
// Dependencies: axum, tower-http
// ============================================================================

pub mod health;
pub mod mcp;
pub mod policies;
pub mod servers;

use axum::Router;
use axum::middleware;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

/// Builds the full HTTP surface: unauthenticated health routes, and every
/// policy/server/group/MCP route behind [`require_auth`].
#[must_use]
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let policy_routes = Router::new()
        .route("/policies", get(policies::list).post(policies::create))
        .route("/policies/evaluate", post(policies::evaluate))
        .route(
            "/policies/{id}",
            get(policies::get).put(policies::update).delete(policies::delete),
        )
        .route("/policies/{id}/activate", post(policies::activate))
        .route("/policies/{id}/suspend", post(policies::suspend))
        .route("/policies/{id}/retire", post(policies::retire))
        .route("/policies/{id}/resources", post(policies::bind_resource))
        .route(
            "/policies/{id}/resources/{resource_type}/{resource_id}",
            delete(policies::unbind_resource),
        );

    let server_routes = Router::new()
        .route("/mcp/servers", get(servers::list).post(servers::create))
        .route(
            "/mcp/servers/{name}",
            get(servers::get).put(servers::update).delete(servers::delete),
        )
        .route("/mcp/servers/{name}/info", get(servers::info))
        .route("/mcp/servers/{name}/convert", post(servers::convert))
        .route("/mcp/groups", get(servers::list_groups).post(servers::create_group))
        .route(
            "/mcp/groups/{id}",
            get(servers::get_group).put(servers::update_group).delete(servers::delete_group),
        )
        .route("/mcp/groups/{id}/servers", post(servers::add_member))
        .route("/mcp/groups/{id}/servers/{name}", delete(servers::remove_member))
        .route("/mcp/groups/{id}/servers/{name}/tools", post(servers::set_member_tools));

    let mcp_routes = Router::new()
        .route("/mcp/list-tools", get(mcp::list_tools))
        .route("/mcp/invoke", post(mcp::invoke))
        .route("/mcp/group/{id}/list-tools", get(mcp::group_list_tools))
        .route("/mcp/group/{id}/invoke", post(mcp::group_invoke))
        .route("/mcp/servers/{name}/policy-allowed-tools", get(mcp::policy_allowed_tools));

    let authenticated = Router::new()
        .nest("/api/v1", policy_routes)
        .merge(server_routes)
        .merge(mcp_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let health_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz));

    Router::new()
        .merge(health_routes)
        .merge(authenticated)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
