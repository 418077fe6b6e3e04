// crates/mcpgate-credentials/src/env.rs
// ============================================================================
// Module: Environment Credential Resolver
// Description: Resolves `env://VAR` and inline credential references for
//              outbound server authentication.
// Purpose: Give every deployment a working CredentialResolver with no
//          external dependency, fail-closed against misconfigured lookups.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`EnvCredentialResolver`] is the default [`CredentialResolver`]. It
//! supports exactly one reference scheme, `env://`, and enforces an optional
//! allowlist/denylist of variable names plus hard key/value size limits, the
//! same policy shape as the donor's environment evidence reader. A denied or
//! oversized lookup is a typed error, never a silently empty credential.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use mcpgate_core::core::model::AuthConfig;
use mcpgate_core::interfaces::CredentialError;
use mcpgate_core::interfaces::CredentialResolver;
use mcpgate_core::interfaces::ResolvedCredential;

use crate::format::mask;

/// The `env://` reference scheme prefix.
const ENV_SCHEME: &str = "env://";

/// Policy governing which environment variables [`EnvCredentialResolver`]
/// is willing to read.
///
/// # Invariants
/// - `denylist` overrides `allowlist` when both name the same key.
/// - `max_value_bytes` and `max_key_bytes` are enforced as hard upper bounds.
/// - `overrides`, when present, take precedence over real environment reads,
///   for deterministic tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCredentialResolverConfig {
    /// Optional allowlist of environment variable names. `None` allows any
    /// name not on `denylist`.
    pub allowlist: Option<BTreeSet<String>>,
    /// Explicit denylist of environment variable names.
    pub denylist: BTreeSet<String>,
    /// Maximum bytes allowed for a resolved credential value.
    pub max_value_bytes: usize,
    /// Maximum bytes allowed for a variable name.
    pub max_key_bytes: usize,
    /// Deterministic overrides, used in place of `std::env::var`.
    pub overrides: Option<BTreeMap<String, String>>,
}

impl Default for EnvCredentialResolverConfig {
    fn default() -> Self {
        Self {
            allowlist: None,
            denylist: BTreeSet::new(),
            max_value_bytes: 64 * 1024,
            max_key_bytes: 255,
            overrides: None,
        }
    }
}

/// The default [`CredentialResolver`]: inline credentials pass through
/// verbatim, `env://VAR` references are read from the process environment
/// (or `config.overrides`, for tests) under allowlist/denylist/size policy.
pub struct EnvCredentialResolver {
    /// Lookup policy.
    config: EnvCredentialResolverConfig,
}

impl EnvCredentialResolver {
    /// Builds a resolver with the given policy.
    #[must_use]
    pub const fn new(config: EnvCredentialResolverConfig) -> Self {
        Self { config }
    }

    /// Reads the variable named `key` from `overrides` if configured, else
    /// from the process environment.
    fn read_var(&self, key: &str) -> Option<String> {
        if let Some(overrides) = &self.config.overrides {
            return overrides.get(key).cloned();
        }
        std::env::var(key).ok()
    }

    /// Checks `key` against the allowlist/denylist policy.
    fn is_key_allowed(&self, key: &str) -> bool {
        if self.config.denylist.contains(key) {
            return false;
        }
        match &self.config.allowlist {
            Some(allowlist) => allowlist.contains(key),
            None => true,
        }
    }

    /// Resolves an `env://VAR` reference.
    fn resolve_env_ref(&self, key: &str) -> Result<String, CredentialError> {
        if key.len() > self.config.max_key_bytes || !self.is_key_allowed(key) {
            return Err(CredentialError::Denied(key.to_string()));
        }
        let value = self
            .read_var(key)
            .ok_or_else(|| CredentialError::Missing(key.to_string()))?;
        if value.len() > self.config.max_value_bytes {
            return Err(CredentialError::TooLarge {
                limit: self.config.max_value_bytes,
            });
        }
        Ok(value)
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, auth: &AuthConfig) -> Result<ResolvedCredential, CredentialError> {
        let value = if let Some(inline) = &auth.credential {
            inline.clone()
        } else if let Some(reference) = &auth.credential_ref {
            if let Some(key) = reference.strip_prefix(ENV_SCHEME) {
                self.resolve_env_ref(key)?
            } else {
                let scheme = reference.split("://").next().unwrap_or(reference);
                return Err(CredentialError::UnsupportedScheme(scheme.to_string()));
            }
        } else {
            return Err(CredentialError::NotConfigured);
        };
        let masked = mask(&value);
        Ok(ResolvedCredential { value, masked })
    }
}

#[cfg(test)]
mod tests {
    use mcpgate_core::core::model::AuthMethod;
    use mcpgate_core::core::model::CredentialFormat;
    use mcpgate_core::core::model::CredentialLocation;

    use super::*;

    fn auth_with(credential_ref: Option<&str>, credential: Option<&str>) -> AuthConfig {
        AuthConfig {
            method: AuthMethod::Bearer,
            location: CredentialLocation::Header,
            name: "Authorization".to_string(),
            format: CredentialFormat::Raw,
            prefix: None,
            template: None,
            credential_ref: credential_ref.map(str::to_string),
            credential: credential.map(str::to_string),
        }
    }

    #[test]
    fn inline_credential_passes_through() {
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig::default());
        let resolved = resolver.resolve(&auth_with(None, Some("s3cr3t-value"))).unwrap();
        assert_eq!(resolved.value, "s3cr3t-value");
    }

    #[test]
    fn env_override_resolves_allowed_key() {
        let mut overrides = BTreeMap::new();
        overrides.insert("GITHUB_TOKEN".to_string(), "ghp_abcdefghijkl".to_string());
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig {
            overrides: Some(overrides),
            ..EnvCredentialResolverConfig::default()
        });
        let resolved = resolver
            .resolve(&auth_with(Some("env://GITHUB_TOKEN"), None))
            .unwrap();
        assert_eq!(resolved.value, "ghp_abcdefghijkl");
        assert!(resolved.masked.contains('\u{2022}'));
    }

    #[test]
    fn denylisted_key_is_denied() {
        let mut overrides = BTreeMap::new();
        overrides.insert("SECRET".to_string(), "x".to_string());
        let mut denylist = BTreeSet::new();
        denylist.insert("SECRET".to_string());
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig {
            overrides: Some(overrides),
            denylist,
            ..EnvCredentialResolverConfig::default()
        });
        let err = resolver.resolve(&auth_with(Some("env://SECRET"), None)).unwrap_err();
        assert!(matches!(err, CredentialError::Denied(_)));
    }

    #[test]
    fn allowlist_excludes_unlisted_keys() {
        let mut overrides = BTreeMap::new();
        overrides.insert("OTHER".to_string(), "x".to_string());
        let mut allowlist = BTreeSet::new();
        allowlist.insert("GITHUB_TOKEN".to_string());
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig {
            overrides: Some(overrides),
            allowlist: Some(allowlist),
            ..EnvCredentialResolverConfig::default()
        });
        let err = resolver.resolve(&auth_with(Some("env://OTHER"), None)).unwrap_err();
        assert!(matches!(err, CredentialError::Denied(_)));
    }

    #[test]
    fn missing_key_is_reported() {
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig {
            overrides: Some(BTreeMap::new()),
            ..EnvCredentialResolverConfig::default()
        });
        let err = resolver
            .resolve(&auth_with(Some("env://DOES_NOT_EXIST"), None))
            .unwrap_err();
        assert!(matches!(err, CredentialError::Missing(_)));
    }

    #[test]
    fn oversized_value_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert("BIG".to_string(), "x".repeat(32));
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig {
            overrides: Some(overrides),
            max_value_bytes: 8,
            ..EnvCredentialResolverConfig::default()
        });
        let err = resolver.resolve(&auth_with(Some("env://BIG"), None)).unwrap_err();
        assert!(matches!(err, CredentialError::TooLarge { limit: 8 }));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig::default());
        let err = resolver
            .resolve(&auth_with(Some("vault://secret/github"), None))
            .unwrap_err();
        assert!(matches!(err, CredentialError::UnsupportedScheme(scheme) if scheme == "vault"));
    }

    #[test]
    fn no_reference_or_inline_is_not_configured() {
        let resolver = EnvCredentialResolver::new(EnvCredentialResolverConfig::default());
        let err = resolver.resolve(&auth_with(None, None)).unwrap_err();
        assert!(matches!(err, CredentialError::NotConfigured));
    }
}
