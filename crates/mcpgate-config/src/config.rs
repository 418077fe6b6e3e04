// crates/mcpgate-config/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Environment-variable loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from environment variables, never from a file:
//! a deployment sets `MCPGATE_*` variables and the process reads them once
//! at startup via [`GatewayConfig::from_env`]. Missing required values and
//! values that fail validation are both [`ConfigError`], so a bad
//! deployment never starts half-configured.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Maximum length accepted for a free-form string field (DSN, audit path).
const MAX_STRING_LENGTH: usize = 2048;
/// Maximum length accepted for an OIDC realm/audience/issuer/host value.
const MAX_IDENTIFIER_LENGTH: usize = 512;
/// Maximum number of entries in `MCPGATE_CORS_ORIGINS`.
const MAX_CORS_ORIGINS: usize = 64;
/// Minimum accepted backend timeout, in seconds.
const MIN_BACKEND_TIMEOUT_SECS: u64 = 1;
/// Maximum accepted backend timeout, in seconds.
const MAX_BACKEND_TIMEOUT_SECS: u64 = 300;
/// Minimum accepted admin API key length.
const MIN_ADMIN_KEY_LENGTH: usize = 16;
/// Maximum accepted admin API key length.
const MAX_ADMIN_KEY_LENGTH: usize = 256;
/// Number of loopback ports reserved above `adapter_base_port`.
const ADAPTER_PORT_RANGE: u16 = 1000;

/// Default bind address when `MCPGATE_BIND_ADDR` is unset.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Default adapter base port when `MCPGATE_ADAPTER_BASE_PORT` is unset.
const DEFAULT_ADAPTER_BASE_PORT: u16 = 9000;
/// Default backend timeout, in seconds, when unset.
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// The environment-sourced configuration every gateway deployment loads
/// once at startup.
///
/// # Invariants
/// - Every field has passed [`GatewayConfig::validate`]; a value returned
///   by [`GatewayConfig::from_env`] is always valid.
/// - `fail_closed_override` defaults to `true`: an evaluator error or a
///   store outage denies rather than allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Connection string for the authoritative policy store.
    pub policy_store_dsn: String,
    /// JWKS endpoint used to verify bearer token signatures.
    pub jwks_url: Url,
    /// Expected OIDC realm.
    pub oidc_realm: String,
    /// Expected token audience.
    pub oidc_audience: String,
    /// Expected token issuer.
    pub oidc_issuer: String,
    /// Address the HTTP surface binds to.
    pub bind_addr: SocketAddr,
    /// Hostname this gateway is externally reachable at, used to build
    /// adapter callback URLs.
    pub external_host: String,
    /// First port in the range reserved for stdio adapter loopback servers.
    pub adapter_base_port: u16,
    /// Timeout applied to a backend call when the server has none of its own.
    pub default_backend_timeout: Duration,
    /// Origins allowed by the CORS layer; `["*"]` allows any origin.
    pub cors_origins: Vec<String>,
    /// Whether an evaluator or store error denies rather than allows.
    pub fail_closed_override: bool,
    /// Filesystem path the audit sink appends JSON lines to.
    pub audit_sink_path: String,
    /// Accepted value for the `X-API-Key` admin header, if configured.
    pub admin_api_key: Option<String>,
}

impl GatewayConfig {
    /// Loads configuration from `MCPGATE_*` environment variables and
    /// validates it before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if a required variable is unset, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            policy_store_dsn: required("MCPGATE_POLICY_STORE_DSN")?,
            jwks_url: parse_required("MCPGATE_JWKS_URL", |raw| {
                Url::parse(raw).map_err(|err| format!("not a valid url: {err}"))
            })?,
            oidc_realm: required("MCPGATE_OIDC_REALM")?,
            oidc_audience: required("MCPGATE_OIDC_AUDIENCE")?,
            oidc_issuer: required("MCPGATE_OIDC_ISSUER")?,
            bind_addr: optional("MCPGATE_BIND_ADDR", DEFAULT_BIND_ADDR, |raw| {
                SocketAddr::from_str(raw).map_err(|err| format!("not a valid socket address: {err}"))
            })?,
            external_host: required("MCPGATE_EXTERNAL_HOST")?,
            adapter_base_port: optional("MCPGATE_ADAPTER_BASE_PORT", &DEFAULT_ADAPTER_BASE_PORT.to_string(), |raw| {
                raw.parse::<u16>().map_err(|err| format!("not a valid port: {err}"))
            })?,
            default_backend_timeout: Duration::from_secs(optional(
                "MCPGATE_BACKEND_TIMEOUT_SECS",
                &DEFAULT_BACKEND_TIMEOUT_SECS.to_string(),
                |raw| raw.parse::<u64>().map_err(|err| format!("not a valid timeout: {err}")),
            )?),
            cors_origins: env::var("MCPGATE_CORS_ORIGINS")
                .ok()
                .map(|raw| split_csv(&raw))
                .unwrap_or_default(),
            fail_closed_override: optional("MCPGATE_FAIL_CLOSED", "true", |raw| {
                raw.parse::<bool>().map_err(|err| format!("not a valid boolean: {err}"))
            })?,
            audit_sink_path: required("MCPGATE_AUDIT_SINK_PATH")?,
            admin_api_key: env::var("MCPGATE_ADMIN_API_KEY").ok().filter(|v| !v.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any field violates a length,
    /// range, or format constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bounded("policy_store_dsn", &self.policy_store_dsn, MAX_STRING_LENGTH)?;
        validate_bounded("oidc_realm", &self.oidc_realm, MAX_IDENTIFIER_LENGTH)?;
        validate_bounded("oidc_audience", &self.oidc_audience, MAX_IDENTIFIER_LENGTH)?;
        validate_bounded("oidc_issuer", &self.oidc_issuer, MAX_IDENTIFIER_LENGTH)?;
        validate_bounded("external_host", &self.external_host, MAX_IDENTIFIER_LENGTH)?;
        if self.external_host.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid("external_host must not contain whitespace".to_string()));
        }
        validate_bounded("audit_sink_path", &self.audit_sink_path, MAX_STRING_LENGTH)?;

        if self.jwks_url.scheme() != "https" && self.jwks_url.scheme() != "http" {
            return Err(ConfigError::Invalid("jwks_url must use http or https".to_string()));
        }
        if self.jwks_url.host().is_none() {
            return Err(ConfigError::Invalid("jwks_url must have a host".to_string()));
        }

        if self.adapter_base_port == 0 {
            return Err(ConfigError::Invalid("adapter_base_port must be non-zero".to_string()));
        }
        if self.adapter_base_port.checked_add(ADAPTER_PORT_RANGE).is_none() {
            return Err(ConfigError::Invalid("adapter_base_port leaves no room for the adapter port range".to_string()));
        }

        let timeout_secs = self.default_backend_timeout.as_secs();
        if !(MIN_BACKEND_TIMEOUT_SECS ..= MAX_BACKEND_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "default_backend_timeout must be between {MIN_BACKEND_TIMEOUT_SECS} and {MAX_BACKEND_TIMEOUT_SECS} seconds"
            )));
        }

        if self.cors_origins.len() > MAX_CORS_ORIGINS {
            return Err(ConfigError::Invalid("too many cors origins".to_string()));
        }
        for origin in &self.cors_origins {
            validate_cors_origin(origin)?;
        }

        if let Some(key) = &self.admin_api_key {
            if key.len() < MIN_ADMIN_KEY_LENGTH {
                return Err(ConfigError::Invalid(format!("admin_api_key must be at least {MIN_ADMIN_KEY_LENGTH} characters")));
            }
            if key.len() > MAX_ADMIN_KEY_LENGTH {
                return Err(ConfigError::Invalid(format!("admin_api_key must be at most {MAX_ADMIN_KEY_LENGTH} characters")));
            }
            if key.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid("admin_api_key must not contain whitespace".to_string()));
            }
        }

        Ok(())
    }
}

/// Splits a comma-separated environment value into trimmed, non-empty parts.
fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ToString::to_string).collect()
}

/// Validates one CORS origin entry: either the literal `"*"` or a URL with
/// no path, query, or fragment.
fn validate_cors_origin(origin: &str) -> Result<(), ConfigError> {
    if origin == "*" {
        return Ok(());
    }
    let url = Url::parse(origin).map_err(|err| ConfigError::Invalid(format!("invalid cors origin '{origin}': {err}")))?;
    if url.host().is_none() {
        return Err(ConfigError::Invalid(format!("cors origin '{origin}' must include a host")));
    }
    Ok(())
}

/// Validates that `value` is non-empty, trimmed, and within `max_len`.
fn validate_bounded(field: &str, value: &str, max_len: usize) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > max_len {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length of {max_len}")));
    }
    Ok(())
}

/// Reads a required environment variable, rejecting an empty value.
fn required(name: &str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name.to_string()));
    }
    Ok(value)
}

/// Reads a required environment variable and parses it with `parse`.
fn parse_required<T>(name: &str, parse: impl FnOnce(&str) -> Result<T, String>) -> Result<T, ConfigError> {
    let raw = required(name)?;
    parse(&raw).map_err(|err| ConfigError::Invalid(format!("{name}: {err}")))
}

/// Reads an optional environment variable, parsing it with `parse` if
/// present and falling back to `default` otherwise.
fn optional<T>(name: &str, default: &str, parse: impl FnOnce(&str) -> Result<T, String>) -> Result<T, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse(&raw).map_err(|err| ConfigError::Invalid(format!("{name}: {err}")))
}

/// Errors produced while loading or validating a [`GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    Missing(String),
    /// A value was present but failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A config with every required field filled in and no CORS or admin key.
    fn sample() -> GatewayConfig {
        GatewayConfig {
            policy_store_dsn: "postgres://localhost/mcpgate".to_string(),
            jwks_url: Url::parse("https://idp.example.com/.well-known/jwks.json").expect("fixture url"),
            oidc_realm: "mcpgate".to_string(),
            oidc_audience: "mcpgate-api".to_string(),
            oidc_issuer: "https://idp.example.com/realms/mcpgate".to_string(),
            bind_addr: SocketAddr::from_str(DEFAULT_BIND_ADDR).expect("fixture addr"),
            external_host: "gateway.example.com".to_string(),
            adapter_base_port: DEFAULT_ADAPTER_BASE_PORT,
            default_backend_timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            cors_origins: Vec::new(),
            fail_closed_override: true,
            audit_sink_path: "/var/log/mcpgate/audit.jsonl".to_string(),
            admin_api_key: None,
        }
    }

    #[test]
    fn sample_config_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_empty_external_host() {
        let mut config = sample();
        config.external_host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_whitespace_in_external_host() {
        let mut config = sample();
        config.external_host = "gateway example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_jwks_scheme() {
        let mut config = sample();
        config.jwks_url = Url::parse("ftp://idp.example.com/jwks.json").expect("fixture url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_adapter_base_port_zero() {
        let mut config = sample();
        config.adapter_base_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_adapter_base_port_without_room_for_range() {
        let mut config = sample();
        config.adapter_base_port = u16::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_backend_timeout_below_minimum() {
        let mut config = sample();
        config.default_backend_timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_backend_timeout_above_maximum() {
        let mut config = sample();
        config.default_backend_timeout = Duration::from_secs(MAX_BACKEND_TIMEOUT_SECS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_wildcard_cors_origin() {
        let mut config = sample();
        config.cors_origins = vec!["*".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn accepts_concrete_cors_origin() {
        let mut config = sample();
        config.cors_origins = vec!["https://editor.example.com".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_cors_origin() {
        let mut config = sample();
        config.cors_origins = vec!["not a url".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_many_cors_origins() {
        let mut config = sample();
        config.cors_origins = (0 .. MAX_CORS_ORIGINS + 1).map(|i| format!("https://{i}.example.com")).collect();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_admin_key_too_short() {
        let mut config = sample();
        config.admin_api_key = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_admin_key_with_whitespace() {
        let mut config = sample();
        config.admin_api_key = Some("a".repeat(MIN_ADMIN_KEY_LENGTH - 1) + " x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_admin_key_within_bounds() {
        let mut config = sample();
        config.admin_api_key = Some("a".repeat(MIN_ADMIN_KEY_LENGTH));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn split_csv_trims_and_drops_empty_entries() {
        assert_eq!(split_csv(" a, b ,,c"), vec!["a", "b", "c"]);
    }
}
