// crates/mcpgate-http/src/routes/servers.rs
// ============================================================================
// Module: Server & Group Routes
// Description: CRUD over registered backend servers and virtual groups, plus
//              stdio→HTTP conversion.
// Purpose: Back the `/mcp/servers` and `/mcp/groups` families (§6).
// Dependencies: axum, mcpgate-core
// ============================================================================

//! ## Overview
//! [`ServerRegistry`](mcpgate_core::interfaces::ServerRegistry) mutations are
//! synchronous, so these handlers do no `.await`ing except
//! [`convert`], which spawns a child process through
//! [`StdioAdapterSupervisor`](mcpgate_core::interfaces::StdioAdapterSupervisor).
//! [`ServerView`] is what every response actually serializes: a
//! [`ServerDescriptor`] with its inline credential, if any, masked by
//! [`mcpgate_credentials::mask`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use mcpgate_core::core::identifiers::GroupId;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::model::AuthConfig;
use mcpgate_core::core::model::ServerDescriptor;
use mcpgate_core::core::model::ServerGroup;
use mcpgate_core::core::model::ToolSelector;
use mcpgate_core::core::model::Transport;
use mcpgate_credentials::mask;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::id;
use crate::state::AppState;

/// Validates a path segment as a [`ServerName`], mapping failure to a 400.
fn parse_server_name(raw: String) -> Result<ServerName, ApiError> {
    ServerName::new(raw).map_err(ApiError::BadRequest)
}

/// A [`ServerDescriptor`] with any inline credential masked before it leaves
/// the process; never serializes a raw `credential` value.
#[derive(Debug, Serialize)]
pub struct ServerView {
    /// The underlying descriptor, flattened into the response body.
    #[serde(flatten)]
    descriptor: ServerDescriptor,
}

/// Masks `descriptor`'s inline credential, if any, before exposing it.
fn to_view(mut descriptor: ServerDescriptor) -> ServerView {
    if let Some(auth) = descriptor.auth.as_mut() {
        if let Some(credential) = auth.credential.as_mut() {
            *credential = mask(credential);
        }
    }
    ServerView { descriptor }
}

/// `GET /mcp/servers`
pub async fn list(State(state): State<AppState>) -> Json<Vec<ServerView>> {
    Json(state.registry.list_servers().into_iter().map(to_view).collect())
}

/// `GET /mcp/servers/:name`
pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<ServerView>, ApiError> {
    let name = parse_server_name(name)?;
    let descriptor = state.registry.get_server(&name)?;
    Ok(Json(to_view(descriptor)))
}

/// `GET /mcp/servers/:name/info` — alias of `get`, present for parity with
/// the convert/invoke endpoints that are also scoped under `:name`.
pub async fn info(state: State<AppState>, path: Path<String>) -> Result<Json<ServerView>, ApiError> {
    get(state, path).await
}

/// Body accepted by `POST /mcp/servers` and `PUT /mcp/servers/:name`.
#[derive(Debug, Deserialize)]
pub struct ServerBody {
    /// Server name; validated against `[a-z0-9][a-z0-9-]*` on save.
    name: String,
    /// Transport endpoint.
    url: String,
    /// Transport dialect.
    transport: Transport,
    /// Whether the server participates in routing; defaults to `true`.
    #[serde(default = "default_enabled")]
    enabled: bool,
    /// Free-form description.
    description: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    tags: BTreeSet<String>,
    /// Per-server timeout override, in seconds.
    timeout_secs: Option<u64>,
    /// Outbound authentication configuration.
    auth: Option<AuthConfig>,
    /// Free-form metadata.
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Default `enabled` value for a newly created server or group.
const fn default_enabled() -> bool {
    true
}

/// Validates and converts a wire [`ServerBody`] into a [`ServerDescriptor`].
fn to_descriptor(body: ServerBody) -> Result<ServerDescriptor, ApiError> {
    let name = parse_server_name(body.name)?;
    let descriptor = ServerDescriptor {
        name,
        url: body.url,
        transport: body.transport,
        enabled: body.enabled,
        description: body.description,
        tags: body.tags,
        timeout: body.timeout_secs.map(std::time::Duration::from_secs),
        auth: body.auth,
        metadata: body.metadata,
    };
    descriptor.validate().map_err(ApiError::BadRequest)?;
    Ok(descriptor)
}

/// `POST /mcp/servers`
pub async fn create(State(state): State<AppState>, Json(body): Json<ServerBody>) -> Result<Json<ServerView>, ApiError> {
    let descriptor = to_descriptor(body)?;
    state.registry.put_server(descriptor.clone())?;
    Ok(Json(to_view(descriptor)))
}

/// `PUT /mcp/servers/:name`
pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut body): Json<ServerBody>,
) -> Result<Json<ServerView>, ApiError> {
    body.name = name;
    let descriptor = to_descriptor(body)?;
    state.registry.put_server(descriptor.clone())?;
    Ok(Json(to_view(descriptor)))
}

/// `DELETE /mcp/servers/:name`
pub async fn delete(State(state): State<AppState>, Path(name): Path<String>) -> Result<(), ApiError> {
    let name = parse_server_name(name)?;
    state.registry.remove_server(&name)?;
    Ok(())
}

/// `POST /mcp/servers/:name/convert` — body: `{command, args, env}`.
#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    /// Command used to spawn the stdio child process.
    command: String,
    /// Arguments passed to the child.
    #[serde(default)]
    args: Vec<String>,
    /// Environment variables passed to the child.
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// `POST /mcp/servers/:name/convert`
pub async fn convert(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ConvertBody>,
) -> Result<Json<mcpgate_core::interfaces::AdapterStatus>, ApiError> {
    let name = parse_server_name(name)?;
    let status = state.adapters.convert(&name, &body.command, &body.args, &body.env).await?;
    Ok(Json(status))
}

/// `GET /mcp/groups`
pub async fn list_groups(State(state): State<AppState>) -> Json<Vec<ServerGroup>> {
    Json(state.registry.list_groups())
}

/// `GET /mcp/groups/:id`
pub async fn get_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ServerGroup>, ApiError> {
    let group = state.registry.get_group(&GroupId::new(id))?;
    Ok(Json(group))
}

/// Body accepted by `POST /mcp/groups`: a group without a server-assigned id.
#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    /// Display name.
    name: String,
    /// Initial member server names.
    #[serde(default)]
    member_names: Vec<String>,
    /// Virtual MCP mount point this group is exposed under.
    gateway_path: String,
    /// Whether the group participates in routing; defaults to `true`.
    #[serde(default = "default_enabled")]
    enabled: bool,
}

/// `POST /mcp/groups`
pub async fn create_group(State(state): State<AppState>, Json(body): Json<CreateGroupBody>) -> Result<Json<ServerGroup>, ApiError> {
    let member_names = body
        .member_names
        .into_iter()
        .map(parse_server_name)
        .collect::<Result<Vec<_>, _>>()?;
    let group = ServerGroup {
        id: GroupId::new(id::generate("grp")),
        name: body.name,
        member_names,
        tool_config: BTreeMap::new(),
        gateway_path: body.gateway_path,
        enabled: body.enabled,
    };
    state.registry.put_group(group.clone())?;
    Ok(Json(group))
}

/// `PUT /mcp/groups/:id`
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut group): Json<ServerGroup>,
) -> Result<Json<ServerGroup>, ApiError> {
    group.id = GroupId::new(id);
    state.registry.put_group(group.clone())?;
    Ok(Json(group))
}

/// `DELETE /mcp/groups/:id`
pub async fn delete_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ApiError> {
    state.registry.remove_group(&GroupId::new(id))?;
    Ok(())
}

/// `POST /mcp/groups/:id/servers` — body: `{server_name}`
#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
    /// The server to add to the group.
    server_name: String,
}

/// `POST /mcp/groups/:id/servers`
pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddMemberBody>,
) -> Result<Json<ServerGroup>, ApiError> {
    let group_id = GroupId::new(id);
    let mut group = state.registry.get_group(&group_id)?;
    let member = parse_server_name(body.server_name)?;
    if !group.member_names.contains(&member) {
        group.member_names.push(member);
    }
    state.registry.put_group(group.clone())?;
    Ok(Json(group))
}

/// `DELETE /mcp/groups/:id/servers/:name`
pub async fn remove_member(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<ServerGroup>, ApiError> {
    let group_id = GroupId::new(id);
    let member = parse_server_name(name)?;
    let mut group = state.registry.get_group(&group_id)?;
    group.member_names.retain(|m| m != &member);
    group.tool_config.remove(&member);
    state.registry.put_group(group.clone())?;
    Ok(Json(group))
}

/// `POST /mcp/groups/:id/servers/:name/tools` — body: a [`ToolSelector`],
/// either `["read_file", "write_file"]` or `["*"]` for every tool.
pub async fn set_member_tools(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(selector): Json<ToolSelector>,
) -> Result<Json<ServerGroup>, ApiError> {
    let group_id = GroupId::new(id);
    let member = parse_server_name(name)?;
    let mut group = state.registry.get_group(&group_id)?;
    if !group.member_names.contains(&member) {
        return Err(ApiError::BadRequest(format!("'{member}' is not a member of this group")));
    }
    group.tool_config.insert(member, selector);
    state.registry.put_group(group.clone())?;
    Ok(Json(group))
}
