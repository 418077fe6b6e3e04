// crates/mcpgate-server/src/commands/policy.rs
// ============================================================================
// Module: Policy Commands
// Description: Offline policy authoring workflows: `validate` and `evaluate`.
// Purpose: Let an operator author and check policies with no gateway
//          process running, the same offline-first posture the donor CLI
//          gives decision evaluation.
// Dependencies: mcpgate-core, mcpgate-policy, serde_json
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::RequestContext;
use mcpgate_core::interfaces::PolicyEvaluator;
use mcpgate_policy::ArcSwapEvaluator;

use crate::cli::PolicyEvaluateArgs;
use crate::cli::PolicyValidateArgs;
use crate::error::ServerError;
use crate::error::ServerResult;

/// Reads and parses a JSON file at `path` into `T`.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ServerResult<T> {
    let bytes = std::fs::read(path).map_err(|source| ServerError::Input {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ServerError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Writes `message` followed by a newline to stdout.
fn write_stdout_line(message: &str) -> ServerResult<()> {
    writeln!(std::io::stdout(), "{message}").map_err(|source| ServerError::Input {
        path: "<stdout>".to_string(),
        source,
    })
}

/// Writes `message` followed by a newline to stderr.
fn write_stderr_line(message: &str) -> ServerResult<()> {
    writeln!(std::io::stderr(), "{message}").map_err(|source| ServerError::Input {
        path: "<stderr>".to_string(),
        source,
    })
}

/// Validates a single policy document's own-data invariants and condition
/// tree compilation, printing either a confirmation or the first violation.
///
/// # Errors
///
/// Returns [`ServerError`] if the file cannot be read or parsed.
pub fn validate(args: &PolicyValidateArgs) -> ServerResult<ExitCode> {
    let policy: Policy = read_json(&args.policy)?;
    if let Err(message) = policy.validate() {
        write_stderr_line(&format!("policy {} is invalid: {message}", policy.policy_id))?;
        return Ok(ExitCode::FAILURE);
    }
    if let Err(error) = mcpgate_policy::compiled::compile(std::slice::from_ref(&policy)) {
        write_stderr_line(&format!("policy {} failed compilation: {error}", policy.policy_id))?;
        return Ok(ExitCode::FAILURE);
    }
    write_stdout_line(&format!("policy {} is valid", policy.policy_id))?;
    Ok(ExitCode::SUCCESS)
}

/// Evaluates a hand-built `RequestContext` against a set of policy
/// documents, printing the resulting `Decision` as JSON.
///
/// # Errors
///
/// Returns [`ServerError`] if either input file cannot be read, parsed, or
/// if the policy set fails compilation.
pub fn evaluate(args: &PolicyEvaluateArgs) -> ServerResult<ExitCode> {
    let policies: Vec<Policy> = read_json(&args.policies)?;
    let context: RequestContext = read_json(&args.context)?;

    let evaluator = Arc::new(ArcSwapEvaluator::new());
    evaluator.publish(&policies)?;
    let decision = evaluator.evaluate(&context).map_err(|error| ServerError::Input {
        path: args.context.display().to_string(),
        source: std::io::Error::other(error.to_string()),
    })?;

    let rendered = serde_json::to_string_pretty(&decision).map_err(|source| ServerError::Json {
        path: args.context.display().to_string(),
        source,
    })?;
    write_stdout_line(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use mcpgate_core::Action;
    use mcpgate_core::ActionType;
    use mcpgate_core::PolicyId;
    use mcpgate_core::PolicyStatus;
    use mcpgate_core::Principal;
    use mcpgate_core::ResourceBinding;
    use mcpgate_core::Rule;
    use mcpgate_core::RuleId;
    use mcpgate_core::Timestamp;
    use mcpgate_core::core::model::RequestMeta;

    use super::*;

    fn sample_policy(rules: Vec<Rule>) -> Policy {
        Policy {
            policy_id: PolicyId::new("p1"),
            policy_code: None,
            name: "sample".to_string(),
            description: None,
            status: PolicyStatus::Active,
            priority: 10,
            version: 1,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
            rules,
            scopes: BTreeSet::new(),
            resources: [ResourceBinding::server("gmail")].into_iter().collect(),
        }
    }

    fn sample_context() -> RequestContext {
        RequestContext {
            principal: Principal {
                subject_id: "alice".to_string(),
                email: None,
                roles: BTreeSet::new(),
                groups: BTreeSet::new(),
                claims: BTreeMap::new(),
            },
            server: "gmail".to_string(),
            tool: "send".to_string(),
            payload: serde_json::json!({}),
            request_meta: RequestMeta {
                ip: None,
                trace_id: "t1".to_string(),
            },
        }
    }

    fn write_json(dir: &tempfile::TempDir, name: &str, value: &impl serde::Serialize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn validate_accepts_a_well_formed_policy() {
        let dir = tempfile::tempdir().unwrap();
        let policy = sample_policy(vec![Rule {
            rule_id: RuleId::new("r1"),
            priority: 0,
            description: None,
            conditions: None,
            actions: vec![Action::simple(ActionType::Allow)],
        }]);
        let path = write_json(&dir, "policy.json", &policy);

        let code = validate(&PolicyValidateArgs { policy: path }).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn validate_rejects_a_rule_with_no_effect_action() {
        let dir = tempfile::tempdir().unwrap();
        let policy = sample_policy(vec![Rule {
            rule_id: RuleId::new("r1"),
            priority: 0,
            description: None,
            conditions: None,
            actions: vec![Action::simple(ActionType::Audit)],
        }]);
        let path = write_json(&dir, "policy.json", &policy);

        let code = validate(&PolicyValidateArgs { policy: path }).unwrap();
        assert_eq!(code, ExitCode::FAILURE);
    }

    #[test]
    fn validate_surfaces_input_errors_for_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        let error = validate(&PolicyValidateArgs { policy: missing }).unwrap_err();
        assert!(matches!(error, ServerError::Input { .. }));
    }

    #[test]
    fn evaluate_prints_a_fail_closed_decision_for_no_policies() {
        let dir = tempfile::tempdir().unwrap();
        let policies: Vec<Policy> = Vec::new();
        let policies_path = write_json(&dir, "policies.json", &policies);
        let context_path = write_json(&dir, "context.json", &sample_context());

        let code = evaluate(&PolicyEvaluateArgs {
            policies: policies_path,
            context: context_path,
        })
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn evaluate_allows_when_a_policy_matches() {
        let dir = tempfile::tempdir().unwrap();
        let policy = sample_policy(vec![Rule {
            rule_id: RuleId::new("r1"),
            priority: 0,
            description: None,
            conditions: None,
            actions: vec![Action::simple(ActionType::Allow)],
        }]);
        let policies_path = write_json(&dir, "policies.json", &vec![policy]);
        let context_path = write_json(&dir, "context.json", &sample_context());

        let code = evaluate(&PolicyEvaluateArgs {
            policies: policies_path,
            context: context_path,
        })
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
