// crates/mcpgate-http/src/routes/policies.rs
// ============================================================================
// Module: Policy Routes
// Description: CRUD and lifecycle transitions over policies, plus the
//              side-effect-free `/policies/evaluate` endpoint.
// Purpose: Back the `/api/v1/policies` family of `PolicyRepo` (§6).
// Dependencies: axum, mcpgate-core
// ============================================================================

//! ## Overview
//! Every handler here is a thin translation from wire shape to
//! [`mcpgate_core::interfaces::PolicyRepo`] call: identifiers are minted at
//! the boundary ([`crate::id::generate`]), validation runs before any
//! repository write, and the repository's own errors map to HTTP statuses
//! through [`ApiError`]'s `From` impls.

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use mcpgate_core::core::identifiers::PolicyId;
use mcpgate_core::core::model::Decision;
use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::PolicyStatus;
use mcpgate_core::core::model::RequestContext;
use mcpgate_core::core::model::ResourceBinding;
use mcpgate_core::core::model::ResourceType;
use mcpgate_core::core::time::Timestamp;
use mcpgate_core::interfaces::PolicyFilter;
use serde::Deserialize;

use crate::error::ApiError;
use crate::id;
use crate::state::AppState;

/// Query parameters accepted by `GET /policies`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restricts to policies in this lifecycle state.
    status: Option<PolicyStatus>,
    /// Paired with `resource_id` to restrict to policies bound to one resource.
    resource_type: Option<ResourceType>,
    /// Paired with `resource_type`; see [`ListQuery::resource_type`].
    resource_id: Option<String>,
    /// Free-text search over name/description.
    q: Option<String>,
}

/// Converts wire query parameters into a repository-level filter.
fn to_filter(query: ListQuery) -> PolicyFilter {
    let resource = match (query.resource_type, query.resource_id) {
        (Some(resource_type), Some(resource_id)) => Some(ResourceBinding { resource_type, resource_id }),
        _ => None,
    };
    PolicyFilter {
        status: query.status,
        resource,
        query: query.q,
    }
}

/// `GET /policies[?status=&resource_type=&resource_id=&q=]`
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Vec<Policy>>, ApiError> {
    let policies = state.policy_repo.list(&to_filter(query)).await?;
    Ok(Json(policies))
}

/// `GET /policies/:id`
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Policy>, ApiError> {
    let policy = state.policy_repo.get(&PolicyId::new(id)).await?;
    Ok(Json(policy))
}

/// Body accepted by `POST /policies`: a full policy minus the
/// server-assigned identifier and timestamps.
#[derive(Debug, Deserialize)]
pub struct CreatePolicyBody {
    /// Caller-chosen human-readable code, distinct from the server-assigned id.
    policy_code: Option<String>,
    /// Display name.
    name: String,
    /// Free-form description.
    description: Option<String>,
    /// Initial lifecycle state; defaults to [`PolicyStatus::Draft`].
    #[serde(default = "default_status")]
    status: PolicyStatus,
    /// Tie-breaker among policies that both match; higher wins.
    #[serde(default)]
    priority: i64,
    /// The condition/action rules this policy evaluates.
    #[serde(default)]
    rules: Vec<mcpgate_core::core::model::Rule>,
    /// Callers this policy applies to.
    #[serde(default)]
    scopes: std::collections::BTreeSet<mcpgate_core::core::model::PrincipalScope>,
    /// Resources this policy applies to; empty means global.
    #[serde(default)]
    resources: std::collections::BTreeSet<ResourceBinding>,
}

/// Default lifecycle state for a newly created policy.
const fn default_status() -> PolicyStatus {
    PolicyStatus::Draft
}

/// `POST /policies`
pub async fn create(State(state): State<AppState>, Json(body): Json<CreatePolicyBody>) -> Result<Json<Policy>, ApiError> {
    let now = Timestamp::now();
    let policy = Policy {
        policy_id: PolicyId::new(id::generate("pol")),
        policy_code: body.policy_code,
        name: body.name,
        description: body.description,
        status: body.status,
        priority: body.priority,
        version: 1,
        created_at: now,
        updated_at: now,
        rules: body.rules,
        scopes: body.scopes,
        resources: body.resources,
    };
    policy.validate().map_err(ApiError::PolicyInvalid)?;
    let created = state.policy_repo.create(policy).await?;
    Ok(Json(created))
}

/// `PUT /policies/:id`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<Policy>,
) -> Result<Json<Policy>, ApiError> {
    body.policy_id = PolicyId::new(id);
    body.validate().map_err(ApiError::PolicyInvalid)?;
    let updated = state.policy_repo.update(body).await?;
    Ok(Json(updated))
}

/// `DELETE /policies/:id`
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ApiError> {
    state.policy_repo.delete(&PolicyId::new(id)).await?;
    Ok(())
}

/// Shared body for the three lifecycle-transition endpoints below.
async fn transition(state: &AppState, id: String, status: PolicyStatus) -> Result<Json<Policy>, ApiError> {
    let updated = state.policy_repo.set_status(&PolicyId::new(id), status).await?;
    Ok(Json(updated))
}

/// `POST /policies/:id/activate`
pub async fn activate(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Policy>, ApiError> {
    transition(&state, id, PolicyStatus::Active).await
}

/// `POST /policies/:id/suspend`
pub async fn suspend(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Policy>, ApiError> {
    transition(&state, id, PolicyStatus::Suspended).await
}

/// `POST /policies/:id/retire`
pub async fn retire(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Policy>, ApiError> {
    transition(&state, id, PolicyStatus::Retired).await
}

/// `POST /policies/:id/resources` — body: `{resource_type, resource_id}`
pub async fn bind_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(binding): Json<ResourceBinding>,
) -> Result<Json<Policy>, ApiError> {
    let updated = state.policy_repo.bind_resource(&PolicyId::new(id), binding).await?;
    Ok(Json(updated))
}

/// `DELETE /policies/:id/resources/:resource_type/:resource_id`
pub async fn unbind_resource(
    State(state): State<AppState>,
    Path((id, resource_type, resource_id)): Path<(String, ResourceType, String)>,
) -> Result<Json<Policy>, ApiError> {
    let binding = ResourceBinding { resource_type, resource_id };
    let updated = state.policy_repo.unbind_resource(&PolicyId::new(id), &binding).await?;
    Ok(Json(updated))
}

/// `POST /policies/evaluate` — evaluates a full `RequestContext` with no
/// side effects and returns the resulting `Decision`.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(context): Json<RequestContext>,
) -> Result<Json<Decision>, ApiError> {
    let decision = state
        .pipeline
        .evaluate_only(&context)
        .map_err(|e| ApiError::StoreError(e.to_string()))?;
    Ok(Json(decision))
}
