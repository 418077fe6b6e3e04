// crates/mcpgate-credentials/src/format.rs
// ============================================================================
// Module: Credential Masking and Injection Formatting
// Description: Turns a resolved secret into a display-safe mask and into the
//              verbatim/prefixed/templated string attached to an outbound
//              request.
// Purpose: Keep secret-shaped logic in one place, reused by every transport.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! Two pure functions: [`mask`] never returns enough of the secret to
//! reconstruct it, and [`format_credential`] applies a [`CredentialFormat`]
//! without ever logging the intermediate value.

use mcpgate_core::core::model::AuthConfig;
use mcpgate_core::core::model::CredentialFormat;

/// Masks `value` for display: `first4••••••••last4`, or all bullets for
/// values of 8 bytes or fewer.
///
/// # Invariants
/// - The output never contains enough of `value` to reconstruct it.
#[must_use]
pub fn mask(value: &str) -> String {
    const BULLET: char = '\u{2022}';
    let len = value.chars().count();
    if len <= 8 {
        return BULLET.to_string().repeat(8);
    }
    let first: String = value.chars().take(4).collect();
    let last: String = value.chars().skip(len - 4).collect();
    format!("{first}{}{last}", BULLET.to_string().repeat(8))
}

/// Applies `auth.format` to a resolved credential `value`.
///
/// # Errors
/// Returns an error message if `format = template` and `auth.template` is
/// unset or does not contain `{credential}`; [`AuthConfig::validate`]
/// (performed at `ServerDescriptor::validate` time) should make this
/// unreachable in practice.
pub fn format_credential(auth: &AuthConfig, value: &str) -> Result<String, String> {
    match auth.format {
        CredentialFormat::Raw => Ok(value.to_string()),
        CredentialFormat::Prefix => {
            let prefix = auth
                .prefix
                .as_deref()
                .ok_or_else(|| "format=prefix requires a prefix".to_string())?;
            Ok(format!("{prefix}{value}"))
        }
        CredentialFormat::Template => {
            let template = auth
                .template
                .as_deref()
                .ok_or_else(|| "format=template requires a template".to_string())?;
            if !template.contains("{credential}") {
                return Err("template does not contain {credential}".to_string());
            }
            Ok(template.replace("{credential}", value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_are_fully_masked() {
        assert_eq!(mask("abc"), "\u{2022}".repeat(8));
        assert_eq!(mask("12345678"), "\u{2022}".repeat(8));
    }

    #[test]
    fn long_values_keep_first_and_last_four() {
        let masked = mask("ghp_1234567890abcdef");
        assert!(masked.starts_with("ghp_"));
        assert!(masked.ends_with("cdef"));
        assert!(masked.contains('\u{2022}'));
    }

    #[test]
    fn prefix_format_prepends_prefix() {
        let auth = AuthConfig {
            method: mcpgate_core::core::model::AuthMethod::Bearer,
            location: mcpgate_core::core::model::CredentialLocation::Header,
            name: "Authorization".to_string(),
            format: CredentialFormat::Prefix,
            prefix: Some("Bearer ".to_string()),
            template: None,
            credential_ref: None,
            credential: Some("secret".to_string()),
        };
        assert_eq!(format_credential(&auth, "secret").unwrap(), "Bearer secret");
    }

    #[test]
    fn template_format_substitutes_placeholder() {
        let auth = AuthConfig {
            method: mcpgate_core::core::model::AuthMethod::Custom,
            location: mcpgate_core::core::model::CredentialLocation::Header,
            name: "X-Signature".to_string(),
            format: CredentialFormat::Template,
            prefix: None,
            template: Some("sig={credential}".to_string()),
            credential_ref: None,
            credential: Some("abc".to_string()),
        };
        assert_eq!(format_credential(&auth, "abc").unwrap(), "sig=abc");
    }
}
