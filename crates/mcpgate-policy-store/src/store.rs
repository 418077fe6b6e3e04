// crates/mcpgate-policy-store/src/store.rs
// ============================================================================
// Module: SQLite Policy Store
// Description: Durable PolicyRepo backed by SQLite.
// Purpose: Persist policy documents as canonical JSON snapshots so a restart
//          does not lose configured policy.
// Dependencies: mcpgate-core, mcpgate-policy, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each policy is stored as a single JSON blob (the canonical wire
//! representation of [`Policy`]), alongside a handful of columns —
//! `policy_code`, `status`, `priority` — duplicated out of the blob purely
//! so [`PolicyFilter`] queries don't need to deserialize every row. Every
//! mutation recompiles and republishes the full policy set to the
//! [`ArcSwapEvaluator`] it was constructed with, the same invalidation
//! strategy [`InMemoryPolicyRepo`](mcpgate_policy::InMemoryPolicyRepo) uses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mcpgate_core::core::identifiers::PolicyId;
use mcpgate_core::core::model::Policy;
use mcpgate_core::core::model::PolicyStatus;
use mcpgate_core::core::model::ResourceBinding;
use mcpgate_core::interfaces::PolicyFilter;
use mcpgate_core::interfaces::PolicyRepo;
use mcpgate_core::interfaces::PolicyRepoError;
use mcpgate_policy::ArcSwapEvaluator;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by [`SqlitePolicyStore::open`] that do not fit the
/// `PolicyRepo` trait's own error type.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Opening or migrating the database file failed.
    #[error("sqlite store open failed: {0}")]
    Open(String),
}

/// Converts a `rusqlite` error into the repo's error type.
fn store_err(e: rusqlite::Error) -> PolicyRepoError {
    PolicyRepoError::Store(e.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// A durable, `SQLite`-backed [`PolicyRepo`].
///
/// # Invariants
/// - `policy_code`, when set, is unique across all stored policies
///   (enforced by a `UNIQUE` index).
/// - Every successful mutation republishes the full policy set to `evaluator`.
pub struct SqlitePolicyStore {
    /// Serializes all access; `rusqlite::Connection` is `!Sync`.
    conn: Mutex<Connection>,
    /// The evaluator kept in sync with the store's contents.
    evaluator: Arc<ArcSwapEvaluator>,
}

impl SqlitePolicyStore {
    /// Opens (creating if absent) the database at `path`, migrates it to the
    /// current schema, and republishes its current contents to `evaluator`.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError::Open`] if the file cannot be opened, the
    /// schema cannot be created, or a stored policy fails to deserialize.
    pub fn open(path: &Path, evaluator: Arc<ArcSwapEvaluator>) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path).map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        migrate(&conn).map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
            evaluator,
        };
        store
            .republish()
            .map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        Ok(store)
    }

    /// Opens an in-memory database, useful for tests.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError::Open`] if the schema cannot be created.
    pub fn open_in_memory(evaluator: Arc<ArcSwapEvaluator>) -> Result<Self, SqliteStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        migrate(&conn).map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
            evaluator,
        };
        store
            .republish()
            .map_err(|e| SqliteStoreError::Open(e.to_string()))?;
        Ok(store)
    }

    /// Recompiles and republishes every stored policy to `evaluator`.
    fn republish(&self) -> Result<(), PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let conn = self.conn.lock().unwrap();
        let snapshot = load_all(&conn)?;
        self.evaluator
            .publish(&snapshot)
            .map_err(|e| PolicyRepoError::Invalid(e.to_string()))
    }

    /// Returns whether `code` is already in use by a policy other than
    /// `excluding`.
    fn code_in_use(conn: &Connection, code: &str, excluding: Option<&PolicyId>) -> bool {
        let existing: Option<String> = conn
            .query_row(
                "SELECT policy_id FROM policies WHERE policy_code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        match (existing, excluding) {
            (Some(found), Some(excl)) => found != excl.as_str(),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Creates the schema if absent.
fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS policies (
             policy_id   TEXT PRIMARY KEY,
             policy_code TEXT UNIQUE,
             status      TEXT NOT NULL,
             priority    INTEGER NOT NULL,
             doc         TEXT NOT NULL
         );
         INSERT INTO schema_meta (version)
             SELECT {SCHEMA_VERSION} WHERE NOT EXISTS (SELECT 1 FROM schema_meta);"
    ))
}

/// Loads every stored policy, deserializing each JSON document.
fn load_all(conn: &Connection) -> Result<Vec<Policy>, PolicyRepoError> {
    let mut stmt = conn
        .prepare("SELECT doc FROM policies")
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(store_err)?;
    let mut out = Vec::new();
    for row in rows {
        let doc = row.map_err(store_err)?;
        let policy: Policy =
            serde_json::from_str(&doc).map_err(|e| PolicyRepoError::Store(e.to_string()))?;
        out.push(policy);
    }
    Ok(out)
}

/// Loads a single policy row by id.
fn load_one(conn: &Connection, id: &PolicyId) -> Result<Option<Policy>, PolicyRepoError> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT doc FROM policies WHERE policy_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)?;
    doc.map(|d| serde_json::from_str(&d).map_err(|e| PolicyRepoError::Store(e.to_string())))
        .transpose()
}

/// Writes (inserting or replacing) a policy row.
fn upsert(conn: &Connection, policy: &Policy) -> Result<(), PolicyRepoError> {
    let doc = serde_json::to_string(policy).map_err(|e| PolicyRepoError::Store(e.to_string()))?;
    conn.execute(
        "INSERT INTO policies (policy_id, policy_code, status, priority, doc)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(policy_id) DO UPDATE SET
             policy_code = excluded.policy_code,
             status = excluded.status,
             priority = excluded.priority,
             doc = excluded.doc",
        params![
            policy.policy_id.as_str(),
            policy.policy_code,
            status_str(policy.status),
            policy.priority,
            doc,
        ],
    )
    .map_err(store_err)?;
    Ok(())
}

/// Maps a [`PolicyStatus`] to its stored string form.
const fn status_str(status: PolicyStatus) -> &'static str {
    match status {
        PolicyStatus::Draft => "draft",
        PolicyStatus::Active => "active",
        PolicyStatus::Suspended => "suspended",
        PolicyStatus::Retired => "retired",
    }
}

#[async_trait]
impl PolicyRepo for SqlitePolicyStore {
    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let conn = self.conn.lock().unwrap();
        let all = load_all(&conn)?;
        Ok(all
            .into_iter()
            .filter(|p| matches_filter(p, filter))
            .collect())
    }

    async fn get(&self, id: &PolicyId) -> Result<Policy, PolicyRepoError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
        let conn = self.conn.lock().unwrap();
        load_one(&conn, id)?.ok_or_else(|| PolicyRepoError::NotFound(id.clone()))
    }

    async fn create(&self, mut policy: Policy) -> Result<Policy, PolicyRepoError> {
        policy.validate().map_err(PolicyRepoError::Invalid)?;
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let conn = self.conn.lock().unwrap();
            if let Some(code) = &policy.policy_code {
                if Self::code_in_use(&conn, code, None) {
                    return Err(PolicyRepoError::DuplicateCode(code.clone()));
                }
            }
            policy.version = 1;
            let now = mcpgate_core::core::time::Timestamp::now();
            policy.created_at = now;
            policy.updated_at = now;
            upsert(&conn, &policy)?;
        }
        self.republish()?;
        Ok(policy)
    }

    async fn update(&self, mut policy: Policy) -> Result<Policy, PolicyRepoError> {
        policy.validate().map_err(PolicyRepoError::Invalid)?;
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let conn = self.conn.lock().unwrap();
            let existing = load_one(&conn, &policy.policy_id)?
                .ok_or_else(|| PolicyRepoError::NotFound(policy.policy_id.clone()))?;
            if let Some(code) = &policy.policy_code {
                if Self::code_in_use(&conn, code, Some(&policy.policy_id)) {
                    return Err(PolicyRepoError::DuplicateCode(code.clone()));
                }
            }
            policy.version = existing.version + 1;
            policy.created_at = existing.created_at;
            policy.updated_at = mcpgate_core::core::time::Timestamp::now();
            upsert(&conn, &policy)?;
        }
        self.republish()?;
        Ok(policy)
    }

    async fn delete(&self, id: &PolicyId) -> Result<(), PolicyRepoError> {
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable repo error")]
            let conn = self.conn.lock().unwrap();
            let affected = conn
                .execute("DELETE FROM policies WHERE policy_id = ?1", params![id.as_str()])
                .map_err(store_err)?;
            if affected == 0 {
                return Err(PolicyRepoError::NotFound(id.clone()));
            }
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
            let conn = self.conn.lock().unwrap();
            let mut policy =
                load_one(&conn, id)?.ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            policy.status = status;
            policy.updated_at = mcpgate_core::core::time::Timestamp::now();
            upsert(&conn, &policy)?;
            policy
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
            let conn = self.conn.lock().unwrap();
            let mut policy =
                load_one(&conn, id)?.ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            policy.resources.insert(binding);
            policy.updated_at = mcpgate_core::core::time::Timestamp::now();
            upsert(&conn, &policy)?;
            policy
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
            let conn = self.conn.lock().unwrap();
            let mut policy =
                load_one(&conn, id)?.ok_or_else(|| PolicyRepoError::NotFound(id.clone()))?;
            policy.resources.remove(binding);
            policy.updated_at = mcpgate_core::core::time::Timestamp::now();
            upsert(&conn, &policy)?;
            policy
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
        let conn = self.conn.lock().unwrap();
        let all = load_all(&conn)?;
        Ok(all
            .into_iter()
            .filter(|p| p.resources.contains(resource) || (include_global && p.resources.is_empty()))
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
    use mcpgate_core::core::model::Rule;
    use mcpgate_core::core::time::Timestamp;

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
            rules: vec![Rule {
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
    async fn create_persists_and_round_trips() {
        let store =
            SqlitePolicyStore::open_in_memory(Arc::new(ArcSwapEvaluator::new())).unwrap();
        let created = store.create(sample("p1")).await.unwrap();
        assert_eq!(created.version, 1);
        let fetched = store.get(&PolicyId::new("p1")).await.unwrap();
        assert_eq!(fetched.policy_id, created.policy_id);
    }

    #[tokio::test]
    async fn duplicate_policy_code_rejected() {
        let store =
            SqlitePolicyStore::open_in_memory(Arc::new(ArcSwapEvaluator::new())).unwrap();
        store.create(sample("p1")).await.unwrap();
        let mut dup = sample("p2");
        dup.policy_code = Some("code-p1".to_string());
        let err = store.create(dup).await.unwrap_err();
        assert!(matches!(err, PolicyRepoError::DuplicateCode(_)));
    }

    #[tokio::test]
    async fn update_increments_version_and_preserves_created_at() {
        let store =
            SqlitePolicyStore::open_in_memory(Arc::new(ArcSwapEvaluator::new())).unwrap();
        let created = store.create(sample("p1")).await.unwrap();
        let updated = store.update(created.clone()).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store =
            SqlitePolicyStore::open_in_memory(Arc::new(ArcSwapEvaluator::new())).unwrap();
        store.create(sample("p1")).await.unwrap();
        store.delete(&PolicyId::new("p1")).await.unwrap();
        let err = store.get(&PolicyId::new("p1")).await.unwrap_err();
        assert!(matches!(err, PolicyRepoError::NotFound(_)));
    }

    #[tokio::test]
    async fn reopening_restores_persisted_policies() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("policies.sqlite3");
        {
            let store =
                SqlitePolicyStore::open(&db_path, Arc::new(ArcSwapEvaluator::new())).unwrap();
            store.create(sample("p1")).await.unwrap();
        }
        let reopened =
            SqlitePolicyStore::open(&db_path, Arc::new(ArcSwapEvaluator::new())).unwrap();
        let fetched = reopened.get(&PolicyId::new("p1")).await.unwrap();
        assert_eq!(fetched.policy_id, PolicyId::new("p1"));
    }
}
