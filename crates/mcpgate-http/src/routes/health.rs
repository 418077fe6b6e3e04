// crates/mcpgate-http/src/routes/health.rs
// ============================================================================
// Module: Health Routes
// Description: Unauthenticated liveness/readiness endpoints.
// Purpose: Let an orchestrator probe the process without a credential.
// Dependencies: axum, mcpgate-core
// ============================================================================

//! ## Overview
//! No authentication, no policy lookup: an orchestrator hitting these two
//! routes should get an answer even if the authenticator or policy store is
//! degraded, which is why [`readyz`] checks the policy store directly rather
//! than going through the pipeline.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::state::AppState;

/// Body returned by `GET /healthz`.
#[derive(Debug, Serialize)]
struct HealthBody {
    /// Always `"ok"`.
    status: &'static str,
}

/// Body returned by `GET /readyz`.
#[derive(Debug, Serialize)]
struct ReadyBody {
    /// Whether the policy store answered its readiness check.
    ready: bool,
    /// Present only when `ready` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// `GET /healthz`. Always succeeds once the process is serving requests.
pub async fn healthz() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// `GET /readyz`. Reports `ready=false` if the policy repository is
/// unreachable.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    match state.policy_repo.readiness().await {
        Ok(()) => (StatusCode::OK, Json(ReadyBody { ready: true, reason: None })),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                ready: false,
                reason: Some("policy store unreachable"),
            }),
        ),
    }
}
