// crates/mcpgate-policy/src/memory_repo.rs
// ============================================================================
// Module: In-Memory Policy Repository
// Description: `BTreeMap`-backed `PolicyRepo`, the default and
//              always-available implementation used by tests and
//              single-node deployments.
// Purpose: Give every deployment a working policy store with no external
//          dependency, and republish compiled tables to the evaluator on
//          every mutation.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`InMemoryPolicyRepo`] holds its policies behind a single `RwLock` and,
//! on every successful mutation, recompiles and republishes the full policy
//! set to the [`ArcSwapEvaluator`](crate::evaluator::ArcSwapEvaluator) it was
//! constructed with — the invalidation event the design calls for, made
//! concrete as a direct call rather than a channel, since both live in the
//! same process.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use mcpgate_core::core::identifiers::PolicyId;
use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::PolicyStatus;
use mcpgate_core::core::model::ResourceBinding;
use mcpgate_core::core::time::Timestamp;
use mcpgate_core::interfaces::PolicyFilter;
use mcpgate_core::interfaces::PolicyRepo;
use mcpgate_core::interfaces::PolicyRepoError;

use crate::evaluator::ArcSwapEvaluator;

/// The default, always-available `PolicyRepo`.
///
/// # Invariants
/// - `policy_code`, when set, is unique across all stored policies.
/// - Every successful mutation republishes the full policy set to `evaluator`.
pub struct InMemoryPolicyRepo {
    policies: RwLock<BTreeMap<PolicyId, Policy>>,
    evaluator: std::sync::Arc<ArcSwapEvaluator>,
}

impl InMemoryPolicyRepo {
    /// Builds an empty repository wired to `evaluator`.
    #[must_use]
    pub fn new(evaluator: std::sync::Arc<ArcSwapEvaluator>) -> Self {
        Self {
            policies: RwLock::new(BTreeMap::new()),
            evaluator,
        }
    }

    /// Recompiles and republishes the current policy set.
    fn republish(&self) -> Result<(), PolicyRepoError> {
        let snapshot: Vec<Policy> = {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let guard = self.policies.read().unwrap();
            guard.values().cloned().collect()
        };
        self.evaluator
            .publish(&snapshot)
            .map_err(|e| PolicyRepoError::Invalid(e.to_string()))
    }

    fn code_in_use(&self, code: &str, excluding: Option<&PolicyId>) -> bool {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let guard = self.policies.read().unwrap();
        guard.values().any(|p| {
            p.policy_code.as_deref() == Some(code) && Some(&p.policy_id) != excluding
        })
    }
}

#[async_trait]
impl PolicyRepo for InMemoryPolicyRepo {
    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let guard = self.policies.read().unwrap();
        Ok(guard
            .values()
            .filter(|p| matches_filter(p, filter))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &PolicyId) -> Result<Policy, PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let guard = self.policies.read().unwrap();
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| PolicyRepoError::NotFound(id.clone()))
    }

    async fn create(&self, mut policy: Policy) -> Result<Policy, PolicyRepoError> {
        policy
            .validate()
            .map_err(PolicyRepoError::Invalid)?;
        if let Some(code) = &policy.policy_code {
            if self.code_in_use(code, None) {
                return Err(PolicyRepoError::DuplicateCode(code.clone()));
            }
        }
        policy.version = 1;
        let now = Timestamp::now();
        policy.created_at = now;
        policy.updated_at = now;
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            guard.insert(policy.policy_id.clone(), policy.clone());
        }
        self.republish()?;
        Ok(policy)
    }

    async fn update(&self, mut policy: Policy) -> Result<Policy, PolicyRepoError> {
        policy
            .validate()
            .map_err(PolicyRepoError::Invalid)?;
        if let Some(code) = &policy.policy_code {
            if self.code_in_use(code, Some(&policy.policy_id)) {
                return Err(PolicyRepoError::DuplicateCode(code.clone()));
            }
        }
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            let existing = guard
                .get(&policy.policy_id)
                .ok_or_else(|| PolicyRepoError::NotFound(policy.policy_id.clone()))?;
            policy.version = existing.version + 1;
            policy.created_at = existing.created_at;
            policy.updated_at = Timestamp::now();
            guard.insert(policy.policy_id.clone(), policy.clone());
        }
        self.republish()?;
        Ok(policy)
    }

    async fn delete(&self, id: &PolicyId) -> Result<(), PolicyRepoError> {
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            guard
                .remove(id)
                .ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
        }
        self.republish()
    }

    async fn set_status(
        &self,
        id: &PolicyId,
        status: PolicyStatus,
    ) -> Result<Policy, PolicyRepoError> {
        let policy = {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            let entry = guard
                .get_mut(id)
                .ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            entry.status = status;
            entry.updated_at = Timestamp::now();
            entry.clone()
        };
        self.republish()?;
        Ok(policy)
    }

    async fn bind_resource(
        &self,
        id: &PolicyId,
        binding: ResourceBinding,
    ) -> Result<Policy, PolicyRepoError> {
        let policy = {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            let entry = guard
                .get_mut(id)
                .ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            entry.resources.insert(binding);
            entry.updated_at = Timestamp::now();
            entry.clone()
        };
        self.republish()?;
        Ok(policy)
    }

    async fn unbind_resource(
        &self,
        id: &PolicyId,
        binding: &ResourceBinding,
    ) -> Result<Policy, PolicyRepoError> {
        let policy = {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let mut guard = self.policies.write().unwrap();
            let entry = guard
                .get_mut(id)
                .ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            entry.resources.remove(binding);
            entry.updated_at = Timestamp::now();
            entry.clone()
        };
        self.republish()?;
        Ok(policy)
    }

    async fn policies_for_resource(
        &self,
        resource: &ResourceBinding,
        include_global: bool,
    ) -> Result<Vec<Policy>, PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let guard = self.policies.read().unwrap();
        Ok(guard
            .values()
            .filter(|p| {
                p.resources.contains(resource) || (include_global && p.resources.is_empty())
            })
            .cloned()
            .collect())
    }
}

/// Applies a [`PolicyFilter`] to a single policy.
fn matches_filter(policy: &Policy, filter: &PolicyFilter) -> bool {
    if let Some(status) = filter.status {
        if policy.status != status {
            return false;
        }
    }
    if let Some(resource) = &filter.resource {
        if !policy.resources.contains(resource) {
            return false;
        }
    }
    if let Some(query) = &filter.query {
        let haystack = format!(
            "{} {} {}",
            policy.name,
            policy.description.as_deref().unwrap_or_default(),
            policy.policy_code.as_deref().unwrap_or_default()
        );
        if !haystack.to_lowercase().contains(&query.to_lowercase()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use mcpgate_core::core::identifiers::RuleId;
    use mcpgate_core::core::model::Action;
    use mcpgate_core::core::model::ActionType;

    use super::*;

    fn sample(id: &str) -> Policy {
        Policy {
            policy_id: PolicyId::new(id),
            policy_code: Some(format!("code-{id}")),
            name: id.to_string(),
            description: None,
            status: PolicyStatus::Active,
            priority: 0,
            version: 0,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
            rules: vec![mcpgate_core::core::model::Rule {
                rule_id: RuleId::new("r1"),
                priority: 0,
                description: None,
                conditions: None,
                actions: vec![Action::simple(ActionType::Allow)],
            }],
            scopes: BTreeSet::new(),
            resources: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn create_assigns_version_one_and_get_round_trips() {
        let repo = InMemoryPolicyRepo::new(std::sync::Arc::new(ArcSwapEvaluator::new()));
        let created = repo.create(sample("p1")).await.unwrap();
        assert_eq!(created.version, 1);
        let fetched = repo.get(&PolicyId::new("p1")).await.unwrap();
        assert_eq!(fetched.policy_id, created.policy_id);
    }

    #[tokio::test]
    async fn duplicate_policy_code_rejected() {
        let repo = InMemoryPolicyRepo::new(std::sync::Arc::new(ArcSwapEvaluator::new()));
        repo.create(sample("p1")).await.unwrap();
        let mut dup = sample("p2");
        dup.policy_code = Some("code-p1".to_string());
        let err = repo.create(dup).await.unwrap_err();
        assert!(matches!(err, PolicyRepoError::DuplicateCode(_)));
    }

    #[tokio::test]
    async fn update_increments_version() {
        let repo = InMemoryPolicyRepo::new(std::sync::Arc::new(ArcSwapEvaluator::new()));
        let created = repo.create(sample("p1")).await.unwrap();
        let updated = repo.update(created).await.unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn delete_then_create_with_same_code_succeeds() {
        let repo = InMemoryPolicyRepo::new(std::sync::Arc::new(ArcSwapEvaluator::new()));
        repo.create(sample("p1")).await.unwrap();
        repo.delete(&PolicyId::new("p1")).await.unwrap();
        let recreated = repo.create(sample("p1")).await.unwrap();
        assert_eq!(recreated.policy_code.as_deref(), Some("code-p1"));
    }

    #[tokio::test]
    async fn bind_then_unbind_restores_prior_binding_set() {
        let repo = InMemoryPolicyRepo::new(std::sync::Arc::new(ArcSwapEvaluator::new()));
        let created = repo.create(sample("p1")).await.unwrap();
        let before = created.resources.clone();
        let binding = ResourceBinding::server("gmail");
        repo.bind_resource(&created.policy_id, binding.clone())
            .await
            .unwrap();
        let after = repo
            .unbind_resource(&created.policy_id, &binding)
            .await
            .unwrap();
        assert_eq!(after.resources, before);
    }
}
