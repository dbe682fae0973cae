//! Agent directory trait and the configuration-backed implementation

use crate::agents::types::{AgentRecord, AgentRef};
use crate::error::StorageResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Catalog of agents the access engine treats as the universe of grants.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// All known agents, including disabled, deleted and draft ones.
    /// Callers filter with [`AgentRef::is_listable`].
    async fn agents(&self) -> StorageResult<Vec<AgentRef>>;

    /// Listable agents only
    async fn enabled_agents(&self) -> StorageResult<Vec<AgentRef>> {
        Ok(self
            .agents()
            .await?
            .into_iter()
            .filter(AgentRef::is_listable)
            .collect())
    }
}

/// In-process agent catalog, typically loaded from `[[agents]]` config
#[derive(Default)]
pub struct StaticAgentDirectory {
    agents: RwLock<Vec<AgentRef>>,
}

impl StaticAgentDirectory {
    pub fn new(records: Vec<AgentRecord>) -> Self {
        let agents: Vec<AgentRef> = records.into_iter().map(AgentRef::from).collect();
        debug!(count = agents.len(), "Loaded agent catalog");
        Self {
            agents: RwLock::new(agents),
        }
    }

    fn write_agents(&self) -> RwLockWriteGuard<'_, Vec<AgentRef>> {
        self.agents.write().unwrap_or_else(|poisoned| {
            tracing::warn!("agent catalog lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_agents(&self) -> RwLockReadGuard<'_, Vec<AgentRef>> {
        self.agents.read().unwrap_or_else(|poisoned| {
            tracing::warn!("agent catalog lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Insert or replace an agent by name
    pub fn upsert(&self, agent: AgentRef) {
        let mut agents = self.write_agents();
        match agents.iter_mut().find(|a| a.name == agent.name) {
            Some(existing) => *existing = agent,
            None => agents.push(agent),
        }
    }

    /// Remove an agent by name. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut agents = self.write_agents();
        let before = agents.len();
        agents.retain(|a| a.name != name);
        agents.len() != before
    }

    /// Look up one agent by name
    pub fn get(&self, name: &str) -> Option<AgentRef> {
        self.read_agents().iter().find(|a| a.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_agents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_agents().is_empty()
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn agents(&self) -> StorageResult<Vec<AgentRef>> {
        Ok(self.read_agents().clone())
    }
}

/// Index agents by name; the first entry wins on duplicate names
pub fn index_by_name(agents: Vec<AgentRef>) -> HashMap<String, AgentRef> {
    let mut by_name = HashMap::with_capacity(agents.len());
    for agent in agents {
        by_name.entry(agent.name.clone()).or_insert(agent);
    }
    by_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::AgentKind;

    fn record(name: &str, enabled: bool) -> AgentRecord {
        AgentRecord {
            name: name.to_string(),
            public_id: None,
            is_enabled: enabled,
            is_deleted: false,
            status: None,
            kind: AgentKind::Enterprise,
            icon: None,
        }
    }

    #[tokio::test]
    async fn test_enabled_agents_filters() {
        let directory = StaticAgentDirectory::new(vec![record("on", true), record("off", false)]);

        let all = directory.agents().await.unwrap();
        assert_eq!(all.len(), 2);

        let enabled = directory.enabled_agents().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "on");
    }

    #[test]
    fn test_upsert_and_remove() {
        let directory = StaticAgentDirectory::new(vec![record("a", true)]);
        directory.upsert(AgentRef::from(record("a", false)));
        assert_eq!(directory.len(), 1);
        assert!(!directory.get("a").unwrap().is_enabled);

        directory.upsert(AgentRef::from(record("b", true)));
        assert_eq!(directory.len(), 2);

        assert!(directory.remove("a"));
        assert!(!directory.remove("a"));
        assert!(directory.get("a").is_none());
    }
}
