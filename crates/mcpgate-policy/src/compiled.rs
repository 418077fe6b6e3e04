// crates/mcpgate-policy/src/compiled.rs
// ============================================================================
// Module: Compiled Tables
// Description: Immutable, precompiled policy tables: regexes and CIDR sets
//              resolved once at compile time, principal scopes indexed for
//              constant-time lookup, and policies bucketed by resource.
// Purpose: Keep the evaluation hot path free of parsing or allocation beyond
//          what a single request needs.
// Dependencies: mcpgate-core, mcpgate-condition, regex, ipnet
// ============================================================================

//! ## Overview
//! [`CompiledTables`] is produced once per `PolicyRepo` mutation and swapped
//! in atomically by [`crate::evaluator::ArcSwapEvaluator`]. Nothing in this
//! module performs I/O; a failure here rejects the offending policy and
//! leaves the previously compiled tables in force.

use std::collections::BTreeMap;
use std::collections::HashSet;

use ipnet::IpNet;
use mcpgate_condition::ConditionTree;
use mcpgate_core::core::identifiers::PolicyId;
use mcpgate_core::core::model::Action;
use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::PolicyStatus;
use mcpgate_core::core::model::PrincipalScope;
use mcpgate_core::core::model::PrincipalType;
use mcpgate_core::core::model::RawLeaf;
use mcpgate_core::core::model::ResourceBinding;
use mcpgate_core::core::model::ResourceType;
use mcpgate_core::core::model::Rule;
use regex::Regex;

/// Errors raised while compiling a policy into [`CompiledTables`].
///
/// # Invariants
/// - Raised only at compile time; never during evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PolicyCompileError {
    /// The policy's own-data validation failed.
    #[error("policy {0} failed validation: {1}")]
    Invalid(PolicyId, String),
    /// A `matches` leaf's regex failed to compile.
    #[error("policy {policy} rule {rule}: invalid regex '{pattern}': {detail}")]
    InvalidRegex {
        /// The offending policy.
        policy: PolicyId,
        /// The offending rule.
        rule: String,
        /// The rejected pattern.
        pattern: String,
        /// The regex engine's error detail.
        detail: String,
    },
    /// An `in_ip_range`/`not_in_ip_range` leaf's value was not a list of CIDRs.
    #[error("policy {policy} rule {rule}: invalid CIDR list")]
    InvalidCidrList {
        /// The offending policy.
        policy: PolicyId,
        /// The offending rule.
        rule: String,
    },
}

/// A leaf condition with any regex/CIDR operands precompiled.
#[derive(Debug, Clone)]
pub struct CompiledLeaf {
    /// Dotted path into the evaluation context.
    pub field: String,
    /// Comparison operator, carried alongside its precompiled operand.
    pub operand: CompiledOperand,
}

/// The precompiled form of a leaf's `(operator, value)` pair.
#[derive(Debug, Clone)]
pub enum CompiledOperand {
    /// `equals` / `not_equals`.
    Equals(serde_json::Value),
    /// `not_equals`.
    NotEquals(serde_json::Value),
    /// `contains`.
    Contains(serde_json::Value),
    /// `not_contains`.
    NotContains(serde_json::Value),
    /// `starts_with`.
    StartsWith(String),
    /// `ends_with`.
    EndsWith(String),
    /// `matches`, precompiled.
    Matches(Box<Regex>),
    /// `in`.
    In(Vec<serde_json::Value>),
    /// `not_in`.
    NotIn(Vec<serde_json::Value>),
    /// `gt`.
    Gt(f64),
    /// `lt`.
    Lt(f64),
    /// `gte`.
    Gte(f64),
    /// `lte`.
    Lte(f64),
    /// `in_ip_range`, precompiled.
    InIpRange(Vec<IpNet>),
    /// `not_in_ip_range`, precompiled.
    NotInIpRange(Vec<IpNet>),
}

/// The compiled (precompiled-regex/CIDR) condition tree.
pub type CompiledConditionTree = ConditionTree<CompiledLeaf>;

/// Compiles a single raw leaf into its precompiled form.
///
/// # Errors
/// Returns [`PolicyCompileError`] if a `matches` pattern or an IP-range
/// value fails to compile.
fn compile_leaf(
    policy_id: &PolicyId,
    rule_id: &str,
    leaf: &RawLeaf,
) -> Result<CompiledLeaf, PolicyCompileError> {
    use mcpgate_core::core::model::Operator;

    let operand = match leaf.operator {
        Operator::Equals => CompiledOperand::Equals(leaf.value.clone()),
        Operator::NotEquals => CompiledOperand::NotEquals(leaf.value.clone()),
        Operator::Contains => CompiledOperand::Contains(leaf.value.clone()),
        Operator::NotContains => CompiledOperand::NotContains(leaf.value.clone()),
        Operator::StartsWith => {
            CompiledOperand::StartsWith(leaf.value.as_str().unwrap_or_default().to_string())
        }
        Operator::EndsWith => {
            CompiledOperand::EndsWith(leaf.value.as_str().unwrap_or_default().to_string())
        }
        Operator::Matches => {
            let pattern = leaf.value.as_str().unwrap_or_default();
            let regex = Regex::new(pattern).map_err(|e| PolicyCompileError::InvalidRegex {
                policy: policy_id.clone(),
                rule: rule_id.to_string(),
                pattern: pattern.to_string(),
                detail: e.to_string(),
            })?;
            CompiledOperand::Matches(Box::new(regex))
        }
        Operator::In => CompiledOperand::In(as_list(&leaf.value)),
        Operator::NotIn => CompiledOperand::NotIn(as_list(&leaf.value)),
        Operator::Gt => CompiledOperand::Gt(as_f64(&leaf.value)),
        Operator::Lt => CompiledOperand::Lt(as_f64(&leaf.value)),
        Operator::Gte => CompiledOperand::Gte(as_f64(&leaf.value)),
        Operator::Lte => CompiledOperand::Lte(as_f64(&leaf.value)),
        Operator::InIpRange => CompiledOperand::InIpRange(compile_cidrs(
            policy_id, rule_id, &leaf.value,
        )?),
        Operator::NotInIpRange => CompiledOperand::NotInIpRange(compile_cidrs(
            policy_id, rule_id, &leaf.value,
        )?),
    };
    Ok(CompiledLeaf {
        field: leaf.field.clone(),
        operand,
    })
}

/// Coerces a JSON value into a list, wrapping a scalar in a single-element list.
fn as_list(value: &serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Coerces a JSON value (number or numeric string) to `f64`, defaulting to
/// `f64::NAN` on failure so every numeric comparison evaluates `false`.
fn as_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Compiles a JSON value expected to be a list of CIDR strings.
fn compile_cidrs(
    policy_id: &PolicyId,
    rule_id: &str,
    value: &serde_json::Value,
) -> Result<Vec<IpNet>, PolicyCompileError> {
    let serde_json::Value::Array(items) = value else {
        return Err(PolicyCompileError::InvalidCidrList {
            policy: policy_id.clone(),
            rule: rule_id.to_string(),
        });
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(|s| s.parse::<IpNet>().ok())
                .ok_or_else(|| PolicyCompileError::InvalidCidrList {
                    policy: policy_id.clone(),
                    rule: rule_id.to_string(),
                })
        })
        .collect()
}

/// Recursively compiles a raw condition tree's leaves.
fn compile_tree(
    policy_id: &PolicyId,
    rule_id: &str,
    tree: &ConditionTree<RawLeaf>,
) -> Result<CompiledConditionTree, PolicyCompileError> {
    match tree {
        ConditionTree::Leaf(leaf) => {
            Ok(ConditionTree::Leaf(compile_leaf(policy_id, rule_id, leaf)?))
        }
        ConditionTree::All { all } => Ok(ConditionTree::All {
            all: all
                .iter()
                .map(|t| compile_tree(policy_id, rule_id, t))
                .collect::<Result<_, _>>()?,
        }),
        ConditionTree::Any { any } => Ok(ConditionTree::Any {
            any: any
                .iter()
                .map(|t| compile_tree(policy_id, rule_id, t))
                .collect::<Result<_, _>>()?,
        }),
    }
}

/// A precompiled rule: its condition tree plus the actions applied on match.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule identifier, for `Decision::matched_rule_id`.
    pub rule_id: String,
    /// Precompiled condition tree; `None` always matches.
    pub conditions: Option<CompiledConditionTree>,
    /// Actions in declared order.
    pub actions: Vec<Action>,
}

/// Constant-time principal-scope membership test.
///
/// # Invariants
/// - An empty `scope` set matches every principal (global policy).
#[derive(Debug, Clone, Default)]
pub struct PrincipalMatcher {
    users: HashSet<String>,
    roles: HashSet<String>,
    organizations: HashSet<String>,
    is_global: bool,
}

impl PrincipalMatcher {
    /// Builds a matcher from a policy's scope set.
    #[must_use]
    pub fn compile(scopes: &std::collections::BTreeSet<PrincipalScope>) -> Self {
        if scopes.is_empty() {
            return Self {
                is_global: true,
                ..Self::default()
            };
        }
        let mut matcher = Self::default();
        for scope in scopes {
            match scope.principal_type {
                PrincipalType::User => {
                    matcher.users.insert(scope.principal_id.clone());
                }
                PrincipalType::Role => {
                    matcher.roles.insert(scope.principal_id.clone());
                }
                PrincipalType::Organization => {
                    matcher.organizations.insert(scope.principal_id.clone());
                }
            }
        }
        matcher
    }

    /// Returns whether `principal` is within scope.
    #[must_use]
    pub fn matches(&self, principal: &mcpgate_core::core::model::Principal) -> bool {
        if self.is_global {
            return true;
        }
        self.users.contains(&principal.subject_id)
            || principal.roles.iter().any(|r| self.roles.contains(r))
            || principal
                .groups
                .iter()
                .any(|g| self.organizations.contains(g))
    }
}

/// A compiled policy: everything [`crate::evaluator`] needs without touching
/// the repository.
#[derive(Debug, Clone)]
pub struct PolicyRef {
    /// Server-assigned identifier.
    pub policy_id: PolicyId,
    /// Lifecycle state, re-checked at evaluation time.
    pub status: PolicyStatus,
    /// Evaluation priority; higher is evaluated earlier.
    pub priority: i64,
    /// Caller-set scope.
    pub scopes: PrincipalMatcher,
    /// Rules, already sorted by priority desc, rule_id asc.
    pub rules: Vec<CompiledRule>,
}

/// Immutable, precompiled snapshot of every policy, bucketed by resource.
///
/// # Invariants
/// - `by_server`, `by_tool`, and `global` lists are each sorted by `priority`
///   descending, then `policy_id` ascending.
#[derive(Debug, Clone, Default)]
pub struct CompiledTables {
    /// Policies bound to a specific server.
    pub by_server: BTreeMap<String, Vec<PolicyRef>>,
    /// Policies bound to a specific `"server:tool"` pair.
    pub by_tool: BTreeMap<String, Vec<PolicyRef>>,
    /// Policies with no resource bindings.
    pub global: Vec<PolicyRef>,
}

/// Compiles a full policy set into [`CompiledTables`].
///
/// # Errors
/// Returns the first [`PolicyCompileError`] encountered. Per the fail-closed
/// compile contract, the caller must reject only the offending policy and
/// keep serving the previously compiled tables; this function compiles the
/// whole batch atomically so partial failures are visible to the caller
/// before anything is published.
pub fn compile(policies: &[Policy]) -> Result<CompiledTables, PolicyCompileError> {
    let mut tables = CompiledTables::default();
    for policy in policies {
        policy
            .validate()
            .map_err(|e| PolicyCompileError::Invalid(policy.policy_id.clone(), e))?;

        let mut rules = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            rules.push(compile_rule(policy, rule)?);
        }
        rules.sort_by(|a: &CompiledRule, b: &CompiledRule| {
            find_priority(policy, &b.rule_id).cmp(&find_priority(policy, &a.rule_id))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let policy_ref = PolicyRef {
            policy_id: policy.policy_id.clone(),
            status: policy.status,
            priority: policy.priority,
            scopes: PrincipalMatcher::compile(&policy.scopes),
            rules,
        };

        if policy.resources.is_empty() {
            tables.global.push(policy_ref.clone());
        }
        for binding in &policy.resources {
            insert_binding(&mut tables, binding, &policy_ref);
        }
    }
    sort_bucket(&mut tables.global);
    for bucket in tables.by_server.values_mut() {
        sort_bucket(bucket);
    }
    for bucket in tables.by_tool.values_mut() {
        sort_bucket(bucket);
    }
    Ok(tables)
}

/// Looks up a rule's declared priority by id, for the post-compile sort.
fn find_priority(policy: &Policy, rule_id: &str) -> i64 {
    policy
        .rules
        .iter()
        .find(|r| r.rule_id.as_str() == rule_id)
        .map_or(0, |r| r.priority)
}

/// Validates a rule and compiles its condition tree.
fn compile_rule(policy: &Policy, rule: &Rule) -> Result<CompiledRule, PolicyCompileError> {
    rule.validate()
        .map_err(|e| PolicyCompileError::Invalid(policy.policy_id.clone(), e))?;
    let conditions = rule
        .conditions
        .as_ref()
        .map(|tree| compile_tree(&policy.policy_id, rule.rule_id.as_str(), tree))
        .transpose()?;
    Ok(CompiledRule {
        rule_id: rule.rule_id.as_str().to_string(),
        conditions,
        actions: rule.actions.clone(),
    })
}

/// Routes a compiled policy into the bucket(s) named by its resource bindings.
fn insert_binding(tables: &mut CompiledTables, binding: &ResourceBinding, policy_ref: &PolicyRef) {
    match binding.resource_type {
        ResourceType::McpServer => tables
            .by_server
            .entry(binding.resource_id.clone())
            .or_default()
            .push(policy_ref.clone()),
        ResourceType::Tool => tables
            .by_tool
            .entry(binding.resource_id.clone())
            .or_default()
            .push(policy_ref.clone()),
        ResourceType::Group => tables
            .by_server
            .entry(binding.resource_id.clone())
            .or_default()
            .push(policy_ref.clone()),
    }
}

/// Sorts a resource bucket by priority descending, then policy id ascending.
fn sort_bucket(bucket: &mut [PolicyRef]) {
    bucket.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.policy_id.as_str().cmp(b.policy_id.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use mcpgate_core::core::identifiers::RuleId;
    use mcpgate_core::core::model::Action;
    use mcpgate_core::core::model::ActionType;
    use mcpgate_core::core::model::Operator;
    use mcpgate_core::core::model::PolicyStatus;
    use mcpgate_core::core::model::RawConditionTree;
    use mcpgate_core::core::model::RawLeaf;
    use mcpgate_core::core::model::ResourceBinding;
    use mcpgate_core::core::model::Rule;
    use mcpgate_core::core::time::Timestamp;

    use super::*;

    fn sample_policy(id: &str, priority: i64, resource: Option<ResourceBinding>) -> Policy {
        let rule = Rule {
            rule_id: RuleId::new("r1"),
            priority: 0,
            description: None,
            conditions: Some(RawConditionTree::leaf(RawLeaf {
                field: "tool.name".to_string(),
                operator: Operator::Equals,
                value: serde_json::json!("search"),
            })),
            actions: vec![Action::simple(ActionType::Allow)],
        };
        Policy {
            policy_id: PolicyId::new(id),
            policy_code: None,
            name: id.to_string(),
            description: None,
            status: PolicyStatus::Active,
            priority,
            version: 1,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
            rules: vec![rule],
            scopes: BTreeSet::new(),
            resources: resource.into_iter().collect(),
        }
    }

    #[test]
    fn compiles_global_policy_into_global_bucket() {
        let policies = vec![sample_policy("p1", 10, None)];
        let tables = compile(&policies).unwrap();
        assert_eq!(tables.global.len(), 1);
        assert!(tables.by_server.is_empty());
    }

    #[test]
    fn compiles_server_bound_policy_into_by_server() {
        let policies = vec![sample_policy("p1", 10, Some(ResourceBinding::server("gmail")))];
        let tables = compile(&policies).unwrap();
        assert!(tables.global.is_empty());
        assert_eq!(tables.by_server.get("gmail").map(Vec::len), Some(1));
    }

    #[test]
    fn bucket_sorted_by_priority_desc_then_id_asc() {
        let policies = vec![
            sample_policy("b", 5, Some(ResourceBinding::server("gmail"))),
            sample_policy("a", 5, Some(ResourceBinding::server("gmail"))),
            sample_policy("c", 9, Some(ResourceBinding::server("gmail"))),
        ];
        let tables = compile(&policies).unwrap();
        let bucket = &tables.by_server["gmail"];
        let ids: Vec<&str> = bucket.iter().map(|p| p.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn invalid_regex_is_rejected_at_compile_time() {
        let mut policy = sample_policy("p1", 10, None);
        policy.rules[0].conditions = Some(RawConditionTree::leaf(RawLeaf {
            field: "payload.to".to_string(),
            operator: Operator::Matches,
            value: serde_json::json!("("),
        }));
        let err = compile(&[policy]).unwrap_err();
        assert!(matches!(err, PolicyCompileError::InvalidRegex { .. }));
    }
}
