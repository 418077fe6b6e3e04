// crates/mcpgate-http/src/error.rs
// ============================================================================
// Module: API Error
// Description: Maps the internal error taxonomy to HTTP responses.
// Purpose: Give every handler one error type with one `IntoResponse` impl,
//          rather than ad hoc status codes scattered through the surface.
// Dependencies: axum, mcpgate-core, mcpgate-gateway, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ApiError`] is the single error type every handler returns. Each variant
//! corresponds to one row of the internal error taxonomy; `IntoResponse`
//! renders it as `{error, detail, policy_id?}` with the status code that
//! taxonomy specifies. Messages are deliberately generic for auth failures
//! so a caller cannot distinguish "wrong signature" from "unknown key".

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use mcpgate_core::interfaces::AdapterError;
use mcpgate_core::interfaces::PolicyRepoError;
use mcpgate_core::interfaces::RegistryError;
use mcpgate_gateway::PipelineError;
use serde::Serialize;
use thiserror::Error;

/// The externally visible error taxonomy for this surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token missing, malformed, expired, or wrong audience/issuer.
    #[error("authentication failed")]
    AuthInvalid,
    /// Unknown or disabled server/group/tool/policy.
    #[error("{0}")]
    ResourceNotFound(String),
    /// The evaluator returned `deny`.
    #[error("{reason}")]
    PolicyDenied {
        /// Reason attached to the decision.
        reason: String,
        /// The policy whose rule matched, if any.
        policy_id: Option<String>,
    },
    /// A policy failed compile-time validation on create/update.
    #[error("{0}")]
    PolicyInvalid(String),
    /// Transport error talking to a member server.
    #[error("{0}")]
    BackendUnreachable(String),
    /// The backend did not respond within its deadline.
    #[error("{0}")]
    BackendTimeout(String),
    /// An obligation this deployment cannot honor was attached.
    #[error("{0}")]
    ObligationUnmet(String),
    /// The policy repository failed to read or write.
    #[error("{0}")]
    StoreError(String),
    /// A malformed request body or query string.
    #[error("{0}")]
    BadRequest(String),
}

/// The JSON body every error response carries.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable machine-readable error kind, e.g. `"policy_denied"`.
    error: &'static str,
    /// Human-readable detail.
    detail: String,
    /// The policy whose rule matched, present only for `policy_denied`.
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail, policy_id) = match self {
            Self::AuthInvalid => (StatusCode::UNAUTHORIZED, "auth_invalid", "authentication failed".to_string(), None),
            Self::ResourceNotFound(detail) => (StatusCode::NOT_FOUND, "resource_not_found", detail, None),
            Self::PolicyDenied { reason, policy_id } => (StatusCode::FORBIDDEN, "policy_denied", reason, policy_id),
            Self::PolicyInvalid(detail) => (StatusCode::BAD_REQUEST, "policy_invalid", detail, None),
            Self::BackendUnreachable(detail) => (StatusCode::BAD_GATEWAY, "backend_unreachable", detail, None),
            Self::BackendTimeout(detail) => (StatusCode::GATEWAY_TIMEOUT, "backend_timeout", detail, None),
            Self::ObligationUnmet(detail) => (StatusCode::SERVICE_UNAVAILABLE, "obligation_unmet", detail, None),
            Self::StoreError(detail) => (StatusCode::SERVICE_UNAVAILABLE, "store_error", detail, None),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, "bad_request", detail, None),
        };
        (status, Json(ErrorBody { error: kind, detail, policy_id })).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Unauthenticated(_) => Self::AuthInvalid,
            PipelineError::ResourceNotFound(detail) => Self::ResourceNotFound(detail),
            PipelineError::Denied { reason, policy_id } => Self::PolicyDenied { reason, policy_id },
            PipelineError::ObligationUnsupported(detail) => Self::ObligationUnmet(detail),
            PipelineError::Upstream(detail) => Self::BackendUnreachable(detail),
            PipelineError::Timeout(detail) => Self::BackendTimeout(detail),
        }
    }
}

impl From<PolicyRepoError> for ApiError {
    fn from(err: PolicyRepoError) -> Self {
        match err {
            PolicyRepoError::NotFound(id) => Self::ResourceNotFound(format!("policy {id} not found")),
            PolicyRepoError::DuplicateCode(code) => Self::PolicyInvalid(format!("policy_code '{code}' already in use")),
            PolicyRepoError::Invalid(detail) => Self::PolicyInvalid(detail),
            PolicyRepoError::Store(detail) => Self::StoreError(detail),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ServerNotFound(name) => Self::ResourceNotFound(format!("server '{name}' not found")),
            RegistryError::GroupNotFound(id) => Self::ResourceNotFound(format!("group '{id}' not found")),
            RegistryError::RequiresConversion(name) => {
                Self::BadRequest(format!("server '{name}' requires conversion to http before joining a group"))
            }
            RegistryError::Invalid(detail) => Self::BadRequest(detail),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NotRunning(name) => Self::ResourceNotFound(format!("no adapter running for '{name}'")),
            other => Self::BackendUnreachable(other.to_string()),
        }
    }
}
