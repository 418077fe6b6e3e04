// crates/mcpgate-policy/src/evaluator.rs
// ============================================================================
// Module: Policy Evaluator
// Description: Lock-free, snapshot-swap evaluator over `CompiledTables`.
// Purpose: Evaluate a `RequestContext` in O(relevant-policies) without
//          blocking concurrent evaluations on a writer.
// Dependencies: arc-swap, mcpgate-core, mcpgate-condition, ipnet
// ============================================================================

//! ## Overview
//! [`ArcSwapEvaluator`] holds one [`arc_swap::ArcSwap<CompiledTables>`].
//! Publishing a new policy set builds a fresh [`CompiledTables`] off to the
//! side and swaps the pointer atomically; readers already holding the old
//! snapshot finish their evaluation against it. No lock is taken on the
//! read path.

use std::collections::HashSet;
use std::net::IpAddr;

use arc_swap::ArcSwap;
use mcpgate_condition::ConditionError;
use mcpgate_core::core::identifiers::PolicyId;
use mcpgate_core::core::identifiers::RuleId;
use mcpgate_core::core::model::Action;
use mcpgate_core::core::model::ActionType;
use mcpgate_core::core::model::Decision;
use mcpgate_core::core::model::Effect;
use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::PolicyStatus;
use mcpgate_core::core::model::RequestContext;
use mcpgate_core::interfaces::EvaluatorError;
use mcpgate_core::interfaces::PolicyEvaluator;

use crate::compiled::CompiledConditionTree;
use crate::compiled::CompiledLeaf;
use crate::compiled::CompiledOperand;
use crate::compiled::CompiledTables;
use crate::compiled::PolicyCompileError;
use crate::compiled::PolicyRef;
use crate::compiled::compile;

/// Evaluates request contexts against an atomically swapped policy snapshot.
pub struct ArcSwapEvaluator {
    tables: ArcSwap<CompiledTables>,
}

impl Default for ArcSwapEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArcSwapEvaluator {
    /// Builds an evaluator with empty, fail-closed tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: ArcSwap::from_pointee(CompiledTables::default()),
        }
    }

    /// Compiles `policies` and atomically publishes the result.
    ///
    /// # Errors
    /// Returns [`PolicyCompileError`] if any policy fails compilation; the
    /// previously published tables remain in force.
    pub fn publish(&self, policies: &[Policy]) -> Result<(), PolicyCompileError> {
        let compiled = compile(policies)?;
        self.tables.store(std::sync::Arc::new(compiled));
        Ok(())
    }
}

impl PolicyEvaluator for ArcSwapEvaluator {
    fn evaluate(&self, context: &RequestContext) -> Result<Decision, EvaluatorError> {
        let tables = self.tables.load();
        let candidates = merge_candidates(&tables, context);
        let context_value = build_context_value(context);

        let mut errors = Vec::new();
        for policy_ref in &candidates {
            if !matches!(policy_ref.status, PolicyStatus::Active) {
                continue;
            }
            if !policy_ref.scopes.matches(&context.principal) {
                continue;
            }
            for rule in &policy_ref.rules {
                let matched = match &rule.conditions {
                    None => Ok(true),
                    Some(tree) => evaluate_tree(tree, &context_value),
                };
                match matched {
                    Ok(true) => {
                        return Ok(build_decision(policy_ref, rule, errors));
                    }
                    Ok(false) => {}
                    Err(e) => errors.push(format!(
                        "policy {} rule {}: {e}",
                        policy_ref.policy_id, rule.rule_id
                    )),
                }
            }
        }

        let mut decision = Decision::fail_closed_deny();
        if !errors.is_empty() {
            decision.obligations.push(evaluator_error_action(&errors));
        }
        Ok(decision)
    }
}

/// Builds the allow/deny decision from the rule that matched.
fn build_decision(
    policy_ref: &PolicyRef,
    rule: &crate::compiled::CompiledRule,
    errors: Vec<String>,
) -> Decision {
    let effect_action = rule.actions.iter().find(|a| a.action_type.is_effect());
    let effect = match effect_action.map(|a| a.action_type) {
        Some(ActionType::Allow) => Effect::Allow,
        _ => Effect::Deny,
    };
    let mut obligations: Vec<Action> = rule
        .actions
        .iter()
        .filter(|a| !a.action_type.is_effect())
        .cloned()
        .collect();
    if !errors.is_empty() {
        obligations.push(evaluator_error_action(&errors));
    }
    Decision {
        effect,
        matched_policy_id: Some(policy_ref.policy_id.clone()),
        matched_rule_id: Some(RuleId::new(rule.rule_id.clone())),
        reason: format!("matched policy {} rule {}", policy_ref.policy_id, rule.rule_id),
        obligations,
    }
}

fn evaluator_error_action(errors: &[String]) -> Action {
    let mut action = Action::simple(ActionType::Audit);
    action.params.insert(
        "evaluator_error".to_string(),
        serde_json::Value::String(errors.join("; ")),
    );
    action
}

/// Builds the deduplicated, priority-ordered candidate list per §4.1 step 1-2.
fn merge_candidates(tables: &CompiledTables, context: &RequestContext) -> Vec<PolicyRef> {
    let tool_key = format!("{}:{}", context.server, context.tool);
    let mut seen: HashSet<PolicyId> = HashSet::new();
    let mut merged: Vec<PolicyRef> = Vec::new();

    for bucket in [
        tables.by_tool.get(&tool_key),
        tables.by_server.get(&context.server),
        Some(&tables.global),
    ]
    .into_iter()
    .flatten()
    {
        for policy_ref in bucket {
            if seen.insert(policy_ref.policy_id.clone()) {
                merged.push(policy_ref.clone());
            }
        }
    }

    merged.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.policy_id.as_str().cmp(b.policy_id.as_str()))
    });
    merged
}

/// Builds the dotted-path evaluation context from a request.
fn build_context_value(context: &RequestContext) -> serde_json::Value {
    serde_json::json!({
        "subject": {
            "subject_id": context.principal.subject_id,
            "email": context.principal.email,
            "roles": context.principal.roles,
            "groups": context.principal.groups,
            "claims": context.principal.claims,
        },
        "tool": { "name": context.tool },
        "server": { "name": context.server },
        "payload": context.payload,
        "request": {
            "ip": context.request_meta.ip.map(|ip| ip.to_string()),
            "trace_id": context.request_meta.trace_id,
        },
    })
}

fn get_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() { None } else { Some(current) }
}

/// Evaluates a compiled condition tree against the request context.
fn evaluate_tree(
    tree: &CompiledConditionTree,
    context: &serde_json::Value,
) -> Result<bool, ConditionError> {
    let mut resolve = |leaf: &CompiledLeaf| -> Result<bool, ConditionError> {
        Ok(evaluate_leaf(leaf, context))
    };
    tree.evaluate(&mut resolve)
}

/// Resolves a leaf's field path and applies its operand.
fn evaluate_leaf(leaf: &CompiledLeaf, context: &serde_json::Value) -> bool {
    let field = get_path(context, &leaf.field);
    evaluate_operand(field, &leaf.operand)
}

/// Applies one precompiled operand to a resolved (possibly absent) field.
#[allow(clippy::too_many_lines, reason = "one match arm per operator, kept flat for readability")]
fn evaluate_operand(field: Option<&serde_json::Value>, operand: &CompiledOperand) -> bool {
    match operand {
        CompiledOperand::Equals(expected) => field.is_some_and(|v| v == expected),
        CompiledOperand::NotEquals(expected) => field.is_none_or(|v| v != expected),
        CompiledOperand::Contains(expected) => field.is_some_and(|v| value_contains(v, expected)),
        CompiledOperand::NotContains(expected) => {
            field.is_none_or(|v| !value_contains(v, expected))
        }
        CompiledOperand::StartsWith(prefix) => {
            field.and_then(|v| v.as_str()).is_some_and(|s| s.starts_with(prefix.as_str()))
        }
        CompiledOperand::EndsWith(suffix) => {
            field.and_then(|v| v.as_str()).is_some_and(|s| s.ends_with(suffix.as_str()))
        }
        CompiledOperand::Matches(regex) => {
            field.and_then(|v| v.as_str()).is_some_and(|s| regex.is_match(s))
        }
        CompiledOperand::In(list) => field.is_some_and(|v| list.contains(v)),
        CompiledOperand::NotIn(list) => field.is_none_or(|v| !list.contains(v)),
        CompiledOperand::Gt(expected) => field.and_then(as_f64).is_some_and(|v| v > *expected),
        CompiledOperand::Lt(expected) => field.and_then(as_f64).is_some_and(|v| v < *expected),
        CompiledOperand::Gte(expected) => field.and_then(as_f64).is_some_and(|v| v >= *expected),
        CompiledOperand::Lte(expected) => field.and_then(as_f64).is_some_and(|v| v <= *expected),
        CompiledOperand::InIpRange(cidrs) => field
            .and_then(as_ip)
            .is_some_and(|ip| cidrs.iter().any(|cidr| cidr.contains(&ip))),
        CompiledOperand::NotInIpRange(cidrs) => field
            .and_then(as_ip)
            .is_none_or(|ip| !cidrs.iter().any(|cidr| cidr.contains(&ip))),
    }
}

/// Returns whether `haystack` (a list or string) contains `needle`.
fn value_contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match haystack {
        serde_json::Value::Array(items) => items.contains(needle),
        serde_json::Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        _ => false,
    }
}

/// Coerces a JSON number or numeric string to `f64`.
fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parses a JSON string field as an IP address.
fn as_ip(value: &serde_json::Value) -> Option<IpAddr> {
    value.as_str().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use mcpgate_core::core::identifiers::ServerName;
    use mcpgate_core::core::model::Operator;
    use mcpgate_core::core::model::Principal;
    use mcpgate_core::core::model::RawConditionTree;
    use mcpgate_core::core::model::RawLeaf;
    use mcpgate_core::core::model::RequestMeta;
    use mcpgate_core::core::model::ResourceBinding;
    use mcpgate_core::core::model::Rule;
    use mcpgate_core::core::time::Timestamp;

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

    fn context(server: &str, tool: &str, payload: serde_json::Value) -> RequestContext {
        RequestContext {
            principal: principal("alice"),
            server: server.to_string(),
            tool: tool.to_string(),
            payload,
            request_meta: RequestMeta {
                ip: Some("10.1.2.3".parse().unwrap()),
                trace_id: "t1".to_string(),
            },
        }
    }

    fn allow_policy(id: &str, priority: i64, resource: ResourceBinding, field: &str, op: Operator, value: serde_json::Value) -> Policy {
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
            rules: vec![Rule {
                rule_id: mcpgate_core::core::identifiers::RuleId::new("r1"),
                priority: 0,
                description: None,
                conditions: Some(RawConditionTree::leaf(RawLeaf {
                    field: field.to_string(),
                    operator: op,
                    value,
                })),
                actions: vec![Action::simple(ActionType::Allow)],
            }],
            scopes: BTreeSet::new(),
            resources: [resource].into_iter().collect(),
        }
    }

    #[test]
    fn no_matching_policy_fails_closed() {
        let evaluator = ArcSwapEvaluator::new();
        let decision = evaluator.evaluate(&context("gmail", "send", serde_json::json!({}))).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.reason, "no matching policy");
    }

    #[test]
    fn allows_when_condition_matches() {
        let evaluator = ArcSwapEvaluator::new();
        let _ = ServerName::new("gmail").unwrap();
        let policy = allow_policy(
            "p1",
            10,
            ResourceBinding::server("gmail"),
            "payload.to",
            Operator::EndsWith,
            serde_json::json!("@corp.example"),
        );
        evaluator.publish(&[policy]).unwrap();

        let allowed = evaluator
            .evaluate(&context("gmail", "send", serde_json::json!({"to": "alice@corp.example"})))
            .unwrap();
        assert_eq!(allowed.effect, Effect::Allow);

        let denied = evaluator
            .evaluate(&context("gmail", "send", serde_json::json!({"to": "alice@other.com"})))
            .unwrap();
        assert_eq!(denied.effect, Effect::Deny);
    }

    #[test]
    fn ip_range_condition() {
        let evaluator = ArcSwapEvaluator::new();
        let policy = allow_policy(
            "p1",
            10,
            ResourceBinding::server("db"),
            "request.ip",
            Operator::InIpRange,
            serde_json::json!(["10.0.0.0/8"]),
        );
        evaluator.publish(&[policy]).unwrap();

        let inside = evaluator.evaluate(&context("db", "query", serde_json::json!({}))).unwrap();
        assert_eq!(inside.effect, Effect::Allow);
    }

    #[test]
    fn higher_priority_policy_wins() {
        let evaluator = ArcSwapEvaluator::new();
        let low = allow_policy("low", 1, ResourceBinding::server("gmail"), "tool.name", Operator::Equals, serde_json::json!("send"));
        let mut high = allow_policy("high", 10, ResourceBinding::server("gmail"), "tool.name", Operator::Equals, serde_json::json!("send"));
        high.rules[0].actions = vec![Action::simple(ActionType::Deny)];
        evaluator.publish(&[low, high]).unwrap();

        let decision = evaluator.evaluate(&context("gmail", "send", serde_json::json!({}))).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.matched_policy_id.unwrap().as_str(), "high");
    }

    #[test]
    fn missing_field_fails_closed_on_equals_but_true_on_not_equals() {
        assert!(!evaluate_operand(None, &CompiledOperand::Equals(serde_json::json!("x"))));
        assert!(evaluate_operand(None, &CompiledOperand::NotEquals(serde_json::json!("x"))));
    }
}
