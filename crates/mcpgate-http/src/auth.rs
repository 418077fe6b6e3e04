// crates/mcpgate-http/src/auth.rs
// ============================================================================
// Module: Auth Middleware
// Description: Verifies every non-health request before it reaches a handler.
// Purpose: Centralize stage 2 ("Authenticated") of the request pipeline for
//          routes the pipeline itself does not cover (policy/server CRUD).
// Dependencies: axum, mcpgate-gateway
// ============================================================================

//! ## Overview
//! [`require_auth`] accepts either a verified `Authorization: Bearer <jwt>`
//! or, when the deployment configures one, a matching `X-API-Key`. A
//! successful bearer check inserts the extracted
//! [`mcpgate_core::core::model::Principal`] as a request extension for
//! handlers that want it; a successful API-key check does not, since an
//! `X-API-Key` caller has no principal, only admin trust. Failure is always
//! an opaque 401, per the fail-closed posture the rest of this codebase
//! takes with authentication detail.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the admin API key, when one is configured.
const API_KEY_HEADER: &str = "x-api-key";

/// Axum middleware enforcing bearer or API-key authentication.
///
/// # Errors
///
/// Returns [`ApiError::AuthInvalid`] if neither credential verifies.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(key) = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        if state.admin_api_key.as_deref() == Some(key) {
            return Ok(next.run(request).await);
        }
    }

    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::AuthInvalid)?;

    let principal = state
        .authenticator
        .authenticate(bearer)
        .await
        .map_err(|_| ApiError::AuthInvalid)?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
