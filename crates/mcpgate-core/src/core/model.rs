// crates/mcpgate-core/src/core/model.rs
// ============================================================================
// Module: Data Model
// Description: Declarative domain types shared by every component: the
//              principal, server/group registry records, and the unified
//              policy model (Policy, Rule, Action, ConditionTree, bindings).
// Purpose: Give every crate in the workspace one canonical, serializable
//          vocabulary so the wire format and the in-process types never
//          diverge.
// Dependencies: mcpgate-condition, serde, serde_json
// ============================================================================

//! ## Overview
//! This module holds only declarative types and their own-data validation
//! (`Policy::validate`, `ServerDescriptor::validate`). It does not evaluate
//! anything — compilation and evaluation are `mcpgate-policy`'s job — and it
//! holds no I/O.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use mcpgate_condition::ConditionTree;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::GroupId;
use crate::core::identifiers::PolicyId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::ServerName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Principal
// ============================================================================

/// The authenticated caller derived from a verified bearer token.
///
/// # Invariants
/// - Has no persistent identity inside the system; it is reconstructed fresh
///   on every request from the token's claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable subject identifier from the token (`sub` claim).
    pub subject_id: String,
    /// Email claim, if present.
    pub email: Option<String>,
    /// Role claims.
    pub roles: BTreeSet<String>,
    /// Group claims.
    pub groups: BTreeSet<String>,
    /// Opaque additional claims, preserved for condition evaluation.
    pub claims: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// SECTION: Server / Group registry records
// ============================================================================

/// Transport dialect spoken by a backend MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Plain HTTP JSON-RPC.
    Http,
    /// HTTP with a server-sent-events response.
    Sse,
    /// Local process speaking JSON-RPC over stdio.
    Stdio,
}

/// Outbound credential authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credential is attached.
    None,
    /// Bearer token.
    Bearer,
    /// Opaque API key.
    ApiKey,
    /// HTTP basic authentication.
    Basic,
    /// OAuth2 access token.
    OAuth2,
    /// Deployment-defined scheme.
    Custom,
}

/// Where the resolved credential is attached to the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialLocation {
    /// Attached as an HTTP header.
    Header,
    /// Attached as a query-string parameter.
    Query,
}

/// How the resolved credential value is formatted before injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFormat {
    /// Passed through verbatim.
    Raw,
    /// Prefixed with `auth.prefix`.
    Prefix,
    /// Substituted into a `{credential}` template string.
    Template,
}

/// Outbound authentication configuration for a `ServerDescriptor`.
///
/// # Invariants
/// - Exactly one of `credential_ref` or `credential` is set, enforced by
///   [`ServerDescriptor::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authentication method.
    pub method: AuthMethod,
    /// Where the credential is attached.
    pub location: CredentialLocation,
    /// Header or query parameter name the credential is attached under.
    pub name: String,
    /// How the credential value is formatted.
    pub format: CredentialFormat,
    /// Prefix used when `format = prefix`.
    pub prefix: Option<String>,
    /// Template used when `format = template`; must contain `{credential}`.
    pub template: Option<String>,
    /// A reference to the credential, e.g. `env://GITHUB_TOKEN`.
    pub credential_ref: Option<String>,
    /// An inline credential value, mutually exclusive with `credential_ref`.
    pub credential: Option<String>,
}

/// A registered backend MCP server.
///
/// # Invariants
/// - `name` matches `[a-z0-9][a-z0-9-]*` (enforced by [`ServerName`]).
/// - `transport = stdio` forbids membership in any `ServerGroup` until an
///   adapter has converted it to `http` (enforced by `GroupGateway`/`ServerRegistry`,
///   not by this type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique server name.
    pub name: ServerName,
    /// Transport endpoint. For stdio servers this is a synthetic `stdio://name`
    /// until an adapter converts it.
    pub url: String,
    /// Transport dialect.
    pub transport: Transport,
    /// Whether the server currently participates in routing.
    pub enabled: bool,
    /// Human-readable description.
    pub description: Option<String>,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
    /// Per-server timeout, overriding the deployment default.
    pub timeout: Option<std::time::Duration>,
    /// Outbound authentication configuration.
    pub auth: Option<AuthConfig>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ServerDescriptor {
    /// Validates the descriptor's own-data invariants.
    ///
    /// # Errors
    /// Returns a human-readable message for the first invariant violated.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(auth) = &self.auth {
            let has_ref = auth.credential_ref.is_some();
            let has_inline = auth.credential.is_some();
            if has_ref == has_inline {
                return Err(
                    "exactly one of credential_ref or credential must be set".to_string(),
                );
            }
            if matches!(auth.format, CredentialFormat::Prefix) && auth.prefix.is_none() {
                return Err("format=prefix requires a prefix".to_string());
            }
            if matches!(auth.format, CredentialFormat::Template) {
                match &auth.template {
                    Some(t) if t.contains("{credential}") => {}
                    _ => return Err("format=template requires a template containing {credential}".to_string()),
                }
            }
        }
        Ok(())
    }
}

/// Either a list of specific tool names, or `["*"]` meaning "all tools".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSelector {
    /// Every tool the member exposes.
    All(AllTools),
    /// Only the listed tool names.
    Named(Vec<String>),
}

/// Marker matched from the wire form `["*"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllTools;

impl Serialize for AllTools {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element("*")?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AllTools {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items: Vec<String> = Deserialize::deserialize(deserializer)?;
        if items.as_slice() == ["*"] {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom("expected [\"*\"]"))
        }
    }
}

impl ToolSelector {
    /// Returns whether `tool` is selected by this entry.
    #[must_use]
    pub fn selects(&self, tool: &str) -> bool {
        match self {
            Self::All(_) => true,
            Self::Named(names) => names.iter().any(|n| n == tool),
        }
    }
}

/// A virtual aggregate exposing multiple HTTP-transport members as one MCP endpoint.
///
/// # Invariants
/// - Every member in `member_names` must currently exist in the registry and
///   be HTTP-transport; enforced by `ServerRegistry`/`GroupGateway`, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Unique group name.
    pub name: String,
    /// Ordered member server names.
    pub member_names: Vec<ServerName>,
    /// Per-member tool selection; absent entries default to "all tools".
    pub tool_config: BTreeMap<ServerName, ToolSelector>,
    /// Exposed virtual MCP mount point.
    pub gateway_path: String,
    /// Whether the group currently participates in routing.
    pub enabled: bool,
}

impl ServerGroup {
    /// Returns the tool selector configured for `member`, defaulting to "all tools".
    #[must_use]
    pub fn selector_for(&self, member: &ServerName) -> ToolSelector {
        self.tool_config
            .get(member)
            .cloned()
            .unwrap_or(ToolSelector::All(AllTools))
    }
}

// ============================================================================
// SECTION: Policy model
// ============================================================================

/// Policy lifecycle state. Only `Active` policies participate in decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// Newly created, not yet eligible for evaluation.
    Draft,
    /// Eligible for evaluation.
    Active,
    /// Temporarily withdrawn from evaluation.
    Suspended,
    /// Permanently withdrawn.
    Retired,
}

/// Comparison operator for a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field equals `value`.
    Equals,
    /// Field does not equal `value`.
    NotEquals,
    /// Field (string or list) contains `value`.
    Contains,
    /// Field does not contain `value`.
    NotContains,
    /// Field (string) starts with `value`.
    StartsWith,
    /// Field (string) ends with `value`.
    EndsWith,
    /// Field matches `value` as a Perl-compatible regex.
    Matches,
    /// Field is a member of the list `value`.
    In,
    /// Field is not a member of the list `value`.
    NotIn,
    /// Field is numerically greater than `value`.
    Gt,
    /// Field is numerically less than `value`.
    Lt,
    /// Field is numerically greater than or equal to `value`.
    Gte,
    /// Field is numerically less than or equal to `value`.
    Lte,
    /// Field parses as an IP address within one of the CIDRs in `value`.
    InIpRange,
    /// Field parses as an IP address outside every CIDR in `value`.
    NotInIpRange,
}

/// A single leaf condition: a dotted field path, an operator, and a value.
///
/// This is the raw, wire-level leaf. `mcpgate-policy` compiles it into a
/// leaf carrying a precompiled regex or CIDR set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLeaf {
    /// Dotted path into the evaluation context, e.g. `subject.roles`.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Comparison value: a JSON scalar, list, or list of CIDR strings.
    pub value: serde_json::Value,
}

/// The raw (uncompiled) condition tree, as stored and transmitted on the wire.
pub type RawConditionTree = ConditionTree<RawLeaf>;

/// An action attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActionType {
    /// Effect action: the request is allowed.
    Allow,
    /// Effect action: the request is denied.
    Deny,
    /// Synonym for `Deny`.
    Block,
    /// Obligation: the pipeline must emit an audit record (always does; this
    /// action exists to let a policy request additional detail via `params`).
    Audit,
    /// Obligation: redact field paths from the response.
    Redact,
    /// Obligation: apply a rate limit.
    RateLimit,
    /// Obligation: require out-of-band approval before proceeding.
    RequireApproval,
}

impl ActionType {
    /// Returns whether this action type determines the decision effect.
    #[must_use]
    pub const fn is_effect(&self) -> bool {
        matches!(self, Self::Allow | Self::Deny | Self::Block)
    }
}

/// A rule action: a type plus opaque, action-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The action's type.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Opaque, action-specific parameters (e.g. redaction field paths).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Action {
    /// Builds an action with no parameters.
    #[must_use]
    pub fn simple(action_type: ActionType) -> Self {
        Self {
            action_type,
            params: BTreeMap::new(),
        }
    }
}

/// A single rule within a policy: a condition tree and the actions that
/// apply when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier, unique within the owning policy.
    pub rule_id: RuleId,
    /// Evaluation priority; higher is evaluated earlier within the policy.
    pub priority: i64,
    /// Human-readable description.
    pub description: Option<String>,
    /// Condition tree; `None` is a rule that always matches.
    pub conditions: Option<RawConditionTree>,
    /// Non-empty, ordered list of actions.
    pub actions: Vec<Action>,
}

impl Rule {
    /// Validates the rule's own-data invariants.
    ///
    /// # Errors
    /// Returns a human-readable message if `actions` is empty or contains no
    /// effect action.
    pub fn validate(&self) -> Result<(), String> {
        if self.actions.is_empty() {
            return Err(format!("rule {} has no actions", self.rule_id));
        }
        if !self.actions.iter().any(|a| a.action_type.is_effect()) {
            return Err(format!(
                "rule {} has no allow/deny/block action",
                self.rule_id
            ));
        }
        Ok(())
    }
}

/// A caller-set selector binding a policy to users, roles, or organizations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    /// A single user, matched by `subject_id`.
    User,
    /// A role, matched against `Principal::roles`.
    Role,
    /// An organization, matched against `Principal::groups`.
    Organization,
}

/// `{ principal_type, principal_id }`. Binds a policy to a caller set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalScope {
    /// Kind of principal selector.
    pub principal_type: PrincipalType,
    /// The user subject id, role name, or organization/group name.
    pub principal_id: String,
}

impl PrincipalScope {
    /// Returns whether this scope matches `principal`.
    #[must_use]
    pub fn matches(&self, principal: &Principal) -> bool {
        match self.principal_type {
            PrincipalType::User => principal.subject_id == self.principal_id,
            PrincipalType::Role => principal.roles.contains(&self.principal_id),
            PrincipalType::Organization => principal.groups.contains(&self.principal_id),
        }
    }
}

/// A resource kind bound by a [`ResourceBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// An entire MCP server.
    McpServer,
    /// A single tool, `resource_id = "serverName:toolName"`.
    Tool,
    /// A server group.
    Group,
}

/// `{ resource_type, resource_id }`. Binds a policy to servers/tools/groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Kind of resource selector.
    pub resource_type: ResourceType,
    /// The server name, `"server:tool"` pair, or group id.
    pub resource_id: String,
}

impl ResourceBinding {
    /// Builds a `tool` binding from a server name and tool name.
    #[must_use]
    pub fn tool(server: &str, tool: &str) -> Self {
        Self {
            resource_type: ResourceType::Tool,
            resource_id: format!("{server}:{tool}"),
        }
    }

    /// Builds an `mcp_server` binding.
    #[must_use]
    pub fn server(server: &str) -> Self {
        Self {
            resource_type: ResourceType::McpServer,
            resource_id: server.to_string(),
        }
    }

    /// Builds a `group` binding.
    #[must_use]
    pub fn group(group_id: &str) -> Self {
        Self {
            resource_type: ResourceType::Group,
            resource_id: group_id.to_string(),
        }
    }
}

/// A named, versioned set of rules with scopes (who) and resources (what).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Server-assigned identifier.
    pub policy_id: PolicyId,
    /// Optional human handle, unique if present.
    pub policy_code: Option<String>,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: PolicyStatus,
    /// Evaluation priority; higher is evaluated earlier across policies.
    pub priority: i64,
    /// Monotone version, incremented on every mutation.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last-mutation timestamp.
    pub updated_at: Timestamp,
    /// Ordered rules.
    pub rules: Vec<Rule>,
    /// Caller-set scopes; empty means global/everyone.
    pub scopes: BTreeSet<PrincipalScope>,
    /// Resource bindings; empty means applies everywhere.
    pub resources: BTreeSet<ResourceBinding>,
}

impl Policy {
    /// Validates the policy's own-data invariants: every rule is valid, and
    /// every rule's condition tree is within size/depth limits.
    ///
    /// # Errors
    /// Returns a human-readable message describing the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.rules.is_empty() {
            return Err(format!("policy {} has no rules", self.policy_id));
        }
        for rule in &self.rules {
            rule.validate()?;
            if let Some(tree) = &rule.conditions {
                tree.validate()
                    .map_err(|e| format!("policy {} rule {}: {e}", self.policy_id, rule.rule_id))?;
            }
        }
        Ok(())
    }

    /// Returns whether `scopes` matches `principal` (empty scopes = global).
    #[must_use]
    pub fn scope_matches(&self, principal: &Principal) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s.matches(principal))
    }
}

// ============================================================================
// SECTION: Request / Decision
// ============================================================================

/// Metadata about the inbound request, independent of the target server/tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Caller's source IP, if known.
    pub ip: Option<std::net::IpAddr>,
    /// Request-scoped trace id.
    pub trace_id: String,
}

/// The context a `PolicyEvaluator` decides over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated caller.
    pub principal: Principal,
    /// Target server name.
    pub server: String,
    /// Target tool name.
    pub tool: String,
    /// Tool invocation parameters.
    pub payload: serde_json::Value,
    /// Request-level metadata.
    pub request_meta: RequestMeta,
}

/// The evaluator's effect: whether the request is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// The request is allowed, subject to any obligations.
    Allow,
    /// The request is denied.
    Deny,
}

/// The outcome of evaluating a [`RequestContext`] against compiled policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Allow or deny.
    pub effect: Effect,
    /// The policy whose rule matched, if any.
    pub matched_policy_id: Option<PolicyId>,
    /// The rule that matched, if any.
    pub matched_rule_id: Option<RuleId>,
    /// Human-readable reason, e.g. `"no matching policy"`.
    pub reason: String,
    /// Non-effect actions accumulated from the matched rule.
    pub obligations: Vec<Action>,
}

impl Decision {
    /// Builds the fail-closed default decision.
    #[must_use]
    pub fn fail_closed_deny() -> Self {
        Self {
            effect: Effect::Deny,
            matched_policy_id: None,
            matched_rule_id: None,
            reason: "no matching policy".to_string(),
            obligations: Vec::new(),
        }
    }

    /// Returns whether the decision allows the request.
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self.effect, Effect::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_selector_all_matches_everything() {
        let sel = ToolSelector::All(AllTools);
        assert!(sel.selects("anything"));
    }

    #[test]
    fn tool_selector_named_matches_exact() {
        let sel = ToolSelector::Named(vec!["search".to_string()]);
        assert!(sel.selects("search"));
        assert!(!sel.selects("delete"));
    }

    #[test]
    fn server_descriptor_rejects_both_credential_forms() {
        let mut auth = AuthConfig {
            method: AuthMethod::Bearer,
            location: CredentialLocation::Header,
            name: "Authorization".to_string(),
            format: CredentialFormat::Raw,
            prefix: None,
            template: None,
            credential_ref: Some("env://TOKEN".to_string()),
            credential: Some("inline".to_string()),
        };
        let server = ServerDescriptor {
            name: ServerName::new("github").unwrap(),
            url: "https://api.github.com".to_string(),
            transport: Transport::Http,
            enabled: true,
            description: None,
            tags: BTreeSet::new(),
            timeout: None,
            auth: Some(auth.clone()),
            metadata: BTreeMap::new(),
        };
        assert!(server.validate().is_err());
        auth.credential = None;
        let server = ServerDescriptor { auth: Some(auth), ..server };
        assert!(server.validate().is_ok());
    }

    #[test]
    fn fail_closed_default_has_deny_effect_and_reason() {
        let decision = Decision::fail_closed_deny();
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.reason, "no matching policy");
    }

    #[test]
    fn decision_round_trips_through_json() {
        let decision = Decision::fail_closed_deny();
        let json = serde_json::to_string(&decision).unwrap();
        let back: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, back);
    }
}
