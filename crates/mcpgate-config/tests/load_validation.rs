//! Config load validation tests for mcpgate-config.
// crates/mcpgate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate `GatewayConfig::from_env`'s environment handling.
// Purpose: Ensure a missing or malformed deployment fails closed at startup.
// =============================================================================

use mcpgate_config::ConfigError;

mod common;

type TestResult = Result<(), String>;

fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_succeeds_with_every_required_variable_set() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    mcpgate_config::GatewayConfig::from_env().map_err(|e| e.to_string())?;
    Ok(())
}

#[test]
fn load_rejects_missing_policy_store_dsn() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_POLICY_STORE_DSN", "");
    assert_invalid(mcpgate_config::GatewayConfig::from_env(), "MCPGATE_POLICY_STORE_DSN")?;
    Ok(())
}

#[test]
fn load_rejects_missing_jwks_url() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_JWKS_URL", "");
    assert_invalid(mcpgate_config::GatewayConfig::from_env(), "MCPGATE_JWKS_URL")?;
    Ok(())
}

#[test]
fn load_rejects_malformed_jwks_url() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_JWKS_URL", "not a url");
    assert_invalid(mcpgate_config::GatewayConfig::from_env(), "MCPGATE_JWKS_URL")?;
    Ok(())
}

#[test]
fn load_rejects_malformed_bind_addr() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_BIND_ADDR", "not-an-address");
    assert_invalid(mcpgate_config::GatewayConfig::from_env(), "MCPGATE_BIND_ADDR")?;
    Ok(())
}

#[test]
fn load_applies_bind_addr_default_when_unset() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    let config = mcpgate_config::GatewayConfig::from_env().map_err(|e| e.to_string())?;
    if config.bind_addr.port() != 8080 {
        return Err(format!("expected default port 8080, got {}", config.bind_addr.port()));
    }
    Ok(())
}

#[test]
fn load_parses_cors_origins_csv() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_CORS_ORIGINS", "https://a.example.com, https://b.example.com");
    let config = mcpgate_config::GatewayConfig::from_env().map_err(|e| e.to_string())?;
    if config.cors_origins != vec!["https://a.example.com", "https://b.example.com"] {
        return Err(format!("unexpected cors_origins: {:?}", config.cors_origins));
    }
    Ok(())
}

#[test]
fn load_rejects_non_boolean_fail_closed_override() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_FAIL_CLOSED", "maybe");
    assert_invalid(mcpgate_config::GatewayConfig::from_env(), "MCPGATE_FAIL_CLOSED")?;
    Ok(())
}

#[test]
fn load_defaults_fail_closed_override_to_true() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    let config = mcpgate_config::GatewayConfig::from_env().map_err(|e| e.to_string())?;
    if !config.fail_closed_override {
        return Err("expected fail_closed_override to default to true".to_string());
    }
    Ok(())
}

#[test]
fn load_ignores_empty_admin_api_key() -> TestResult {
    let _guard = common::ENV_LOCK.lock().map_err(|e| e.to_string())?;
    common::clear_env();
    common::set_required_env();
    common::set_var("MCPGATE_ADMIN_API_KEY", "");
    let config = mcpgate_config::GatewayConfig::from_env().map_err(|e| e.to_string())?;
    if config.admin_api_key.is_some() {
        return Err("expected no admin_api_key for an empty value".to_string());
    }
    Ok(())
}
