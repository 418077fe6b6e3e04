//! Boundary validation tests for mcpgate-config.
// crates/mcpgate-config/tests/boundary_validation.rs
// =============================================================================
// Module: Boundary Validation Tests
// Description: Length and range limits on GatewayConfig fields.
// Purpose: Ensure oversized or out-of-range values are rejected fail-closed.
// =============================================================================

use std::time::Duration;

use mcpgate_config::ConfigError;

mod common;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn rejects_empty_policy_store_dsn() -> TestResult {
    let mut config = common::sample();
    config.policy_store_dsn = String::new();
    assert_invalid(config.validate(), "policy_store_dsn")
}

#[test]
fn rejects_oversized_policy_store_dsn() -> TestResult {
    let mut config = common::sample();
    config.policy_store_dsn = "a".repeat(2049);
    assert_invalid(config.validate(), "exceeds max length")
}

#[test]
fn rejects_empty_oidc_realm() -> TestResult {
    let mut config = common::sample();
    config.oidc_realm = "   ".to_string();
    assert_invalid(config.validate(), "oidc_realm")
}

#[test]
fn rejects_oversized_oidc_audience() -> TestResult {
    let mut config = common::sample();
    config.oidc_audience = "a".repeat(513);
    assert_invalid(config.validate(), "oidc_audience")
}

#[test]
fn rejects_empty_oidc_issuer() -> TestResult {
    let mut config = common::sample();
    config.oidc_issuer = String::new();
    assert_invalid(config.validate(), "oidc_issuer")
}

#[test]
fn rejects_empty_audit_sink_path() -> TestResult {
    let mut config = common::sample();
    config.audit_sink_path = String::new();
    assert_invalid(config.validate(), "audit_sink_path")
}

#[test]
fn accepts_audit_sink_path_at_max_length() -> TestResult {
    let mut config = common::sample();
    config.audit_sink_path = "/".to_string() + &"a".repeat(2046);
    config.validate().map_err(|e| e.to_string())
}

#[test]
fn rejects_audit_sink_path_over_max_length() -> TestResult {
    let mut config = common::sample();
    config.audit_sink_path = "/".to_string() + &"a".repeat(2048);
    assert_invalid(config.validate(), "audit_sink_path")
}

#[test]
fn accepts_backend_timeout_at_minimum() -> TestResult {
    let mut config = common::sample();
    config.default_backend_timeout = Duration::from_secs(1);
    config.validate().map_err(|e| e.to_string())
}

#[test]
fn accepts_backend_timeout_at_maximum() -> TestResult {
    let mut config = common::sample();
    config.default_backend_timeout = Duration::from_secs(300);
    config.validate().map_err(|e| e.to_string())
}

#[test]
fn rejects_backend_timeout_of_zero() -> TestResult {
    let mut config = common::sample();
    config.default_backend_timeout = Duration::from_secs(0);
    assert_invalid(config.validate(), "default_backend_timeout")
}

#[test]
fn rejects_backend_timeout_over_maximum() -> TestResult {
    let mut config = common::sample();
    config.default_backend_timeout = Duration::from_secs(301);
    assert_invalid(config.validate(), "default_backend_timeout")
}

#[test]
fn accepts_adapter_base_port_leaving_exact_room() -> TestResult {
    let mut config = common::sample();
    config.adapter_base_port = u16::MAX - 1000;
    config.validate().map_err(|e| e.to_string())
}

#[test]
fn rejects_adapter_base_port_too_close_to_max() -> TestResult {
    let mut config = common::sample();
    config.adapter_base_port = u16::MAX - 10;
    assert_invalid(config.validate(), "adapter_base_port")
}

#[test]
fn rejects_cors_origins_at_limit_plus_one() -> TestResult {
    let mut config = common::sample();
    config.cors_origins = (0 .. 65).map(|i| format!("https://{i}.example.com")).collect();
    assert_invalid(config.validate(), "too many cors origins")
}

#[test]
fn accepts_cors_origins_at_limit() -> TestResult {
    let mut config = common::sample();
    config.cors_origins = (0 .. 64).map(|i| format!("https://{i}.example.com")).collect();
    config.validate().map_err(|e| e.to_string())
}
