// crates/mcpgate-gateway/src/auth.rs
// ============================================================================
// Module: JWKS Bearer Authenticator
// Description: Verifies an inbound bearer token against a cached JWKS and
//              extracts a `Principal` from its claims.
// Purpose: Back stage 2 ("Authenticated") of the request pipeline.
// Dependencies: mcpgate-core, jsonwebtoken, reqwest, tokio
// ============================================================================

//! ## Overview
//! [`JwksAuthenticator`] caches the authorization server's key set with a
//! configurable TTL, refreshing it on a cache miss or an unknown `kid`
//! (handling key rotation without a restart). Verification checks signature,
//! expiry, audience, and issuer before any claim is trusted.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::jwk::JwkSet;
use mcpgate_core::core::model::Principal;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default JWKS cache lifetime.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Bearer authentication failures. Every variant maps to an opaque 401 at
/// the HTTP boundary; detail is for the audit log only.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer ...` header was present.
    #[error("missing bearer token")]
    MissingToken,
    /// The token is not well-formed JWT.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// No key in the JWKS matches the token's `kid`.
    #[error("unknown signing key")]
    UnknownKey,
    /// Signature, expiry, audience, or issuer verification failed.
    #[error("token verification failed: {0}")]
    Invalid(String),
    /// The JWKS endpoint could not be fetched.
    #[error("jwks endpoint unavailable: {0}")]
    JwksUnavailable(String),
}

/// Static configuration for a [`JwksAuthenticator`].
#[derive(Debug, Clone)]
pub struct JwksAuthenticatorConfig {
    /// JWKS endpoint URL.
    pub jwks_uri: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// Expected `iss` claim.
    pub issuer: String,
    /// How long a fetched key set is trusted before refetching.
    pub cache_ttl: Duration,
}

impl JwksAuthenticatorConfig {
    /// Builds a config with the default cache TTL.
    #[must_use]
    pub fn new(jwks_uri: impl Into<String>, audience: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            audience: audience.into(),
            issuer: issuer.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// A cached key set and when it was fetched.
struct CachedJwks {
    /// The fetched key set.
    keys: JwkSet,
    /// When it was fetched.
    fetched_at: Instant,
}

/// Verifies bearer tokens against a TTL-cached JWKS.
pub struct JwksAuthenticator {
    /// Static configuration.
    config: JwksAuthenticatorConfig,
    /// HTTP client used to fetch the key set.
    http: reqwest::Client,
    /// Cached key set, refreshed on expiry or an unknown `kid`.
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksAuthenticator {
    /// Builds an authenticator for `config`.
    #[must_use]
    pub fn new(config: JwksAuthenticatorConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Verifies `bearer_token` and returns the extracted [`Principal`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any verification failure; callers must
    /// respond with an opaque 401 regardless of the specific variant.
    pub async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthError> {
        let header = jsonwebtoken::decode_header(bearer_token)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let kid = header.kid.ok_or_else(|| AuthError::Malformed("token has no kid".to_string()))?;

        let mut jwks = self.cached_or_fetch().await?;
        let mut jwk = jwks.find(&kid).cloned();
        if jwk.is_none() {
            jwks = self.fetch_and_cache().await?;
            jwk = jwks.find(&kid).cloned();
        }
        let jwk = jwk.ok_or(AuthError::UnknownKey)?;

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::Invalid(e.to_string()))?;
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);

        let data = jsonwebtoken::decode::<serde_json::Value>(bearer_token, &decoding_key, &validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?;
        claims_to_principal(&data.claims).map_err(AuthError::Invalid)
    }

    /// Returns the cached key set if still within TTL, else fetches fresh.
    async fn cached_or_fetch(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Fetches the key set and replaces the cache.
    async fn fetch_and_cache(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .http
            .get(&self.config.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::JwksUnavailable(format!(
                "jwks endpoint returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        let keys: JwkSet =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

/// Authenticates bearer tokens, abstracted so the pipeline is testable
/// without a real JWKS endpoint.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Verifies `bearer_token` and returns the extracted principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any verification failure.
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthError>;
}

#[async_trait::async_trait]
impl Authenticator for JwksAuthenticator {
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthError> {
        Self::authenticate(self, bearer_token).await
    }
}

/// A static-token authenticator for tests and offline deployments: maps one
/// fixed bearer value to a fixed principal.
pub struct StaticAuthenticator {
    /// The expected bearer token.
    token: String,
    /// The principal returned when it matches.
    principal: Principal,
}

impl StaticAuthenticator {
    /// Builds an authenticator that accepts only `token`.
    #[must_use]
    pub fn new(token: impl Into<String>, principal: Principal) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }

    /// Wraps this authenticator in an `Arc<dyn Authenticator>`.
    #[must_use]
    pub fn shared(self) -> Arc<dyn Authenticator> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthError> {
        if bearer_token == self.token {
            Ok(self.principal.clone())
        } else {
            Err(AuthError::Invalid("token does not match".to_string()))
        }
    }
}

/// Extracts a [`Principal`] from decoded JWT claims.
fn claims_to_principal(claims: &serde_json::Value) -> Result<Principal, String> {
    let object = claims.as_object().ok_or("claims are not a JSON object")?;
    let subject_id = object
        .get("sub")
        .and_then(serde_json::Value::as_str)
        .ok_or("claims are missing sub")?
        .to_string();
    let email = object
        .get("email")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let roles = string_set(object.get("roles"));
    let groups = string_set(object.get("groups"));
    let known = ["sub", "email", "roles", "groups", "exp", "iat", "nbf", "aud", "iss"];
    let extra = object
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Principal {
        subject_id,
        email,
        roles,
        groups,
        claims: extra,
    })
}

/// Reads a JSON array of strings into a `BTreeSet`, defaulting to empty.
fn string_set(value: Option<&serde_json::Value>) -> std::collections::BTreeSet<String> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use super::*;

    fn principal(subject: &str) -> Principal {
        Principal {
            subject_id: subject.to_string(),
            email: None,
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            claims: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn static_authenticator_accepts_matching_token() {
        let auth = StaticAuthenticator::new("secret-token", principal("alice"));
        let result = auth.authenticate("secret-token").await.unwrap();
        assert_eq!(result.subject_id, "alice");
    }

    #[tokio::test]
    async fn static_authenticator_rejects_mismatched_token() {
        let auth = StaticAuthenticator::new("secret-token", principal("alice"));
        let err = auth.authenticate("wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[test]
    fn claims_to_principal_extracts_roles_and_extra_claims() {
        let claims = serde_json::json!({
            "sub": "u-1",
            "email": "u1@example.com",
            "roles": ["admin", "reader"],
            "team": "platform",
        });
        let principal = claims_to_principal(&claims).unwrap();
        assert_eq!(principal.subject_id, "u-1");
        assert_eq!(principal.email.as_deref(), Some("u1@example.com"));
        assert!(principal.roles.contains("admin"));
        assert_eq!(
            principal.claims.get("team").and_then(serde_json::Value::as_str),
            Some("platform")
        );
    }

    #[test]
    fn claims_to_principal_requires_sub() {
        let claims = serde_json::json!({ "email": "u1@example.com" });
        assert!(claims_to_principal(&claims).is_err());
    }
}
