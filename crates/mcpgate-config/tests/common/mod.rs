//! Shared fixtures for mcpgate-config integration tests.
// crates/mcpgate-config/tests/common/mod.rs

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use mcpgate_config::GatewayConfig;
use url::Url;

/// Serializes access to `std::env` across tests in this binary: environment
/// variables are process-global, and `GatewayConfig::from_env` reads them.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// A config with every required field filled in and no CORS or admin key.
#[must_use]
pub fn sample() -> GatewayConfig {
    GatewayConfig {
        policy_store_dsn: "postgres://localhost/mcpgate".to_string(),
        jwks_url: Url::parse("https://idp.example.com/.well-known/jwks.json").expect("fixture url"),
        oidc_realm: "mcpgate".to_string(),
        oidc_audience: "mcpgate-api".to_string(),
        oidc_issuer: "https://idp.example.com/realms/mcpgate".to_string(),
        bind_addr: SocketAddr::from_str("0.0.0.0:8080").expect("fixture addr"),
        external_host: "gateway.example.com".to_string(),
        adapter_base_port: 9000,
        default_backend_timeout: Duration::from_secs(30),
        cors_origins: Vec::new(),
        fail_closed_override: true,
        audit_sink_path: "/var/log/mcpgate/audit.jsonl".to_string(),
        admin_api_key: None,
    }
}

/// The full set of `MCPGATE_*` variables `sample()` corresponds to, for
/// tests that exercise [`GatewayConfig::from_env`] directly.
pub const REQUIRED_VARS: &[(&str, &str)] = &[
    ("MCPGATE_POLICY_STORE_DSN", "postgres://localhost/mcpgate"),
    ("MCPGATE_JWKS_URL", "https://idp.example.com/.well-known/jwks.json"),
    ("MCPGATE_OIDC_REALM", "mcpgate"),
    ("MCPGATE_OIDC_AUDIENCE", "mcpgate-api"),
    ("MCPGATE_OIDC_ISSUER", "https://idp.example.com/realms/mcpgate"),
    ("MCPGATE_EXTERNAL_HOST", "gateway.example.com"),
    ("MCPGATE_AUDIT_SINK_PATH", "/var/log/mcpgate/audit.jsonl"),
];

/// All `MCPGATE_*` variables this crate reads, required or not; used to
/// scrub the environment between tests.
pub const ALL_VARS: &[&str] = &[
    "MCPGATE_POLICY_STORE_DSN",
    "MCPGATE_JWKS_URL",
    "MCPGATE_OIDC_REALM",
    "MCPGATE_OIDC_AUDIENCE",
    "MCPGATE_OIDC_ISSUER",
    "MCPGATE_BIND_ADDR",
    "MCPGATE_EXTERNAL_HOST",
    "MCPGATE_ADAPTER_BASE_PORT",
    "MCPGATE_BACKEND_TIMEOUT_SECS",
    "MCPGATE_CORS_ORIGINS",
    "MCPGATE_FAIL_CLOSED",
    "MCPGATE_AUDIT_SINK_PATH",
    "MCPGATE_ADMIN_API_KEY",
];

/// Clears every variable this crate reads.
#[allow(unsafe_code, reason = "std::env::remove_var is unsafe in this edition; callers hold ENV_LOCK")]
pub fn clear_env() {
    for name in ALL_VARS {
        // SAFETY: serialized by `ENV_LOCK`; no other thread in this test
        // binary touches these variables without holding the same lock.
        unsafe {
            std::env::remove_var(name);
        }
    }
}

/// Sets every required variable to the value [`sample`] would produce.
#[allow(unsafe_code, reason = "std::env::set_var is unsafe in this edition; callers hold ENV_LOCK")]
pub fn set_required_env() {
    for (name, value) in REQUIRED_VARS {
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe {
            std::env::set_var(name, value);
        }
    }
}

/// Sets a single variable; callers must hold [`ENV_LOCK`].
#[allow(unsafe_code, reason = "std::env::set_var is unsafe in this edition; callers hold ENV_LOCK")]
pub fn set_var(name: &str, value: &str) {
    // SAFETY: serialized by `ENV_LOCK`.
    unsafe {
        std::env::set_var(name, value);
    }
}
