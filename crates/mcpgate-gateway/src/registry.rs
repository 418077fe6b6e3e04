// crates/mcpgate-gateway/src/registry.rs
// ============================================================================
// Module: In-Memory Server Registry
// Description: `RwLock`-backed `ServerRegistry`, the in-process view of
//              configured servers and their group memberships.
// Purpose: Give `GroupGateway`/`RequestPipeline` a single source of truth for
//          "what servers/groups exist right now" with transactional removal.
// Dependencies: mcpgate-core
// ============================================================================

//! ## Overview
//! [`InMemoryServerRegistry`] mirrors the shape of
//! [`mcpgate_policy::memory_repo::InMemoryPolicyRepo`]: a single lock guards
//! two maps, mutations validate before taking the write lock, and removal is
//! transactional (removing a server also strips it from every group's
//! membership).

use std::collections::BTreeMap;
use std::sync::RwLock;

use mcpgate_core::core::identifiers::GroupId;
use mcpgate_core::core::identifiers::ServerName;
use mcpgate_core::core::model::ServerDescriptor;
use mcpgate_core::core::model::ServerGroup;
use mcpgate_core::core::model::Transport;
use mcpgate_core::interfaces::RegistryError;
use mcpgate_core::interfaces::ServerRegistry;

/// The default, always-available `ServerRegistry`.
///
/// # Invariants
/// - `put_group` rejects any member that is not already registered or whose
///   transport is `stdio` (unconverted).
/// - `remove_server` also strips the server from every group's membership.
pub struct InMemoryServerRegistry {
    /// Registered servers keyed by name.
    servers: RwLock<BTreeMap<ServerName, ServerDescriptor>>,
    /// Registered groups keyed by id.
    groups: RwLock<BTreeMap<GroupId, ServerGroup>>,
}

impl Default for InMemoryServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryServerRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(BTreeMap::new()),
            groups: RwLock::new(BTreeMap::new()),
        }
    }
}

impl ServerRegistry for InMemoryServerRegistry {
    fn get_server(&self, name: &ServerName) -> Result<ServerDescriptor, RegistryError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let guard = self.servers.read().unwrap();
        guard
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ServerNotFound(name.clone()))
    }

    fn get_group(&self, id: &GroupId) -> Result<ServerGroup, RegistryError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let guard = self.groups.read().unwrap();
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::GroupNotFound(id.clone()))
    }

    fn list_servers(&self) -> Vec<ServerDescriptor> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let guard = self.servers.read().unwrap();
        guard.values().cloned().collect()
    }

    fn list_groups(&self) -> Vec<ServerGroup> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let guard = self.groups.read().unwrap();
        guard.values().cloned().collect()
    }

    fn put_server(&self, server: ServerDescriptor) -> Result<(), RegistryError> {
        server
            .validate()
            .map_err(RegistryError::Invalid)?;
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let mut guard = self.servers.write().unwrap();
        guard.insert(server.name.clone(), server);
        Ok(())
    }

    fn remove_server(&self, name: &ServerName) -> Result<(), RegistryError> {
        {
            #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
            let mut guard = self.servers.write().unwrap();
            guard
                .remove(name)
                .ok_or_else(|| RegistryError::ServerNotFound(name.clone()))?;
        }
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let mut groups = self.groups.write().unwrap();
        for group in groups.values_mut() {
            group.member_names.retain(|member| member != name);
            group.tool_config.remove(name);
        }
        Ok(())
    }

    fn put_group(&self, group: ServerGroup) -> Result<(), RegistryError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let servers = self.servers.read().unwrap();
        for member in &group.member_names {
            let descriptor = servers
                .get(member)
                .ok_or_else(|| RegistryError::ServerNotFound(member.clone()))?;
            if descriptor.transport == Transport::Stdio {
                return Err(RegistryError::RequiresConversion(member.clone()));
            }
        }
        drop(servers);
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let mut groups = self.groups.write().unwrap();
        groups.insert(group.id.clone(), group);
        Ok(())
    }

    fn remove_group(&self, id: &GroupId) -> Result<(), RegistryError> {
        #[allow(clippy::unwrap_used, reason = "poisoned lock is a process bug, not a recoverable registry error")]
        let mut guard = self.groups.write().unwrap();
        guard
            .remove(id)
            .ok_or_else(|| RegistryError::GroupNotFound(id.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use super::*;

    fn http_server(name: &str) -> ServerDescriptor {
        ServerDescriptor {
            name: ServerName::new(name).unwrap(),
            url: format!("https://{name}.example.com"),
            transport: Transport::Http,
            enabled: true,
            description: None,
            tags: BTreeSet::new(),
            timeout: None,
            auth: None,
            metadata: BTreeMap::new(),
        }
    }

    fn stdio_server(name: &str) -> ServerDescriptor {
        let mut server = http_server(name);
        server.transport = Transport::Stdio;
        server.url = format!("stdio://{name}");
        server
    }

    fn group(id: &str, members: Vec<&str>) -> ServerGroup {
        ServerGroup {
            id: GroupId::new(id),
            name: id.to_string(),
            member_names: members
                .into_iter()
                .map(|m| ServerName::new(m).unwrap())
                .collect(),
            tool_config: BTreeMap::new(),
            gateway_path: format!("/groups/{id}"),
            enabled: true,
        }
    }

    #[test]
    fn put_and_get_server_round_trips() {
        let registry = InMemoryServerRegistry::new();
        registry.put_server(http_server("github")).unwrap();
        let fetched = registry
            .get_server(&ServerName::new("github").unwrap())
            .unwrap();
        assert_eq!(fetched.url, "https://github.example.com");
    }

    #[test]
    fn unknown_server_is_not_found() {
        let registry = InMemoryServerRegistry::new();
        let err = registry
            .get_server(&ServerName::new("missing").unwrap())
            .unwrap_err();
        assert!(matches!(err, RegistryError::ServerNotFound(_)));
    }

    #[test]
    fn group_with_stdio_member_requires_conversion() {
        let registry = InMemoryServerRegistry::new();
        registry.put_server(stdio_server("local")).unwrap();
        let err = registry
            .put_group(group("g1", vec!["local"]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::RequiresConversion(_)));
    }

    #[test]
    fn group_with_unregistered_member_is_not_found() {
        let registry = InMemoryServerRegistry::new();
        let err = registry
            .put_group(group("g1", vec!["ghost"]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ServerNotFound(_)));
    }

    #[test]
    fn removing_a_server_strips_it_from_groups() {
        let registry = InMemoryServerRegistry::new();
        registry.put_server(http_server("github")).unwrap();
        registry.put_server(http_server("gitlab")).unwrap();
        registry
            .put_group(group("g1", vec!["github", "gitlab"]))
            .unwrap();
        registry
            .remove_server(&ServerName::new("github").unwrap())
            .unwrap();
        let fetched = registry.get_group(&GroupId::new("g1")).unwrap();
        assert_eq!(fetched.member_names.len(), 1);
        assert_eq!(fetched.member_names[0].as_str(), "gitlab");
    }
}
