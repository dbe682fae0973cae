//! In-memory pivot store for tests and development
//!
//! A single write lock covers each delete+insert pair, which gives the same
//! per-key atomicity the PostgreSQL store gets from its transaction.

use crate::error::{StorageError, StorageResult};
use crate::pivot::store::{DirectGrantStore, PivotStore};
use crate::pivot::types::{
    AgentGroupPivot, DirectGrant, GroupId, GroupMetadata, UserGroupPivot, dedupe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, UserGroupPivot>,
    agents: BTreeMap<String, AgentGroupPivot>,
    grants: BTreeMap<(String, String), DirectGrant>,
}

/// Process-local pivot tables
#[derive(Default)]
pub struct InMemoryPivotStore {
    tables: RwLock<Tables>,
}

impl InMemoryPivotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PivotStore for InMemoryPivotStore {
    async fn sync_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
    ) -> StorageResult<UserGroupPivot> {
        let row = UserGroupPivot::new(email, group_ids);
        let mut tables = self.tables.write().await;
        let replaced = tables.users.remove(email).is_some();
        tables.users.insert(email.to_string(), row.clone());
        debug!(email, replaced, groups = row.groups.len(), "Synced user pivot");
        Ok(row)
    }

    async fn repair_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<Option<UserGroupPivot>> {
        let mut tables = self.tables.write().await;
        if let Some(current) = tables.users.get(email)
            && current.updated_at >= observed_at
        {
            debug!(email, "User pivot written since observation, not repairing");
            return Ok(None);
        }
        let row = UserGroupPivot::new(email, group_ids);
        tables.users.insert(email.to_string(), row.clone());
        debug!(email, groups = row.groups.len(), "Repaired user pivot");
        Ok(Some(row))
    }

    async fn get_user_groups(&self, email: &str) -> StorageResult<Vec<GroupId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .get(email)
            .map(UserGroupPivot::unique_groups)
            .unwrap_or_default())
    }

    async fn assign_agent_groups(
        &self,
        agent_name: &str,
        group_ids: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> StorageResult<AgentGroupPivot> {
        let row = AgentGroupPivot::new(agent_name, group_ids, metadata);
        let mut tables = self.tables.write().await;
        let replaced = tables.agents.remove(agent_name).is_some();
        tables.agents.insert(agent_name.to_string(), row.clone());
        debug!(agent_name, replaced, groups = row.groups.len(), "Assigned agent pivot");
        Ok(row)
    }

    async fn get_agent_groups(&self, agent_name: &str) -> StorageResult<Vec<GroupId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .get(agent_name)
            .map(|row| dedupe(&row.groups))
            .unwrap_or_default())
    }

    async fn get_agent_pivot(&self, agent_name: &str) -> StorageResult<Option<AgentGroupPivot>> {
        Ok(self.tables.read().await.agents.get(agent_name).cloned())
    }

    async fn list_all_user_pivots(&self) -> StorageResult<Vec<UserGroupPivot>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn list_all_agent_pivots(&self) -> StorageResult<Vec<AgentGroupPivot>> {
        Ok(self.tables.read().await.agents.values().cloned().collect())
    }

    async fn rename_agent(&self, old_name: &str, new_name: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        if old_name == new_name {
            return Ok(tables.agents.contains_key(old_name)
                || tables.grants.keys().any(|(_, agent)| agent == old_name));
        }
        if tables.agents.contains_key(old_name) && tables.agents.contains_key(new_name) {
            return Err(StorageError::Constraint {
                operation: "rename_agent".to_string(),
                message: format!("agent pivot '{}' already exists", new_name),
            });
        }

        let mut changed = false;
        if let Some(mut row) = tables.agents.remove(old_name) {
            row.agent_name = new_name.to_string();
            row.updated_at = Utc::now();
            tables.agents.insert(new_name.to_string(), row);
            changed = true;
        }

        // A user already granted the new name keeps that grant
        let moved: Vec<(String, String)> = tables
            .grants
            .keys()
            .filter(|(_, agent)| agent == old_name)
            .cloned()
            .collect();
        for key in moved {
            if let Some(mut grant) = tables.grants.remove(&key) {
                changed = true;
                grant.agent_name = new_name.to_string();
                tables
                    .grants
                    .entry((key.0, new_name.to_string()))
                    .or_insert(grant);
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl DirectGrantStore for InMemoryPivotStore {
    async fn grant_direct_access(
        &self,
        email: &str,
        agent_name: &str,
    ) -> StorageResult<DirectGrant> {
        let mut tables = self.tables.write().await;
        let grant = tables
            .grants
            .entry((email.to_string(), agent_name.to_string()))
            .or_insert_with(|| DirectGrant {
                email: email.to_string(),
                agent_name: agent_name.to_string(),
                granted_at: Utc::now(),
            });
        Ok(grant.clone())
    }

    async fn revoke_direct_access(&self, email: &str, agent_name: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .grants
            .remove(&(email.to_string(), agent_name.to_string()))
            .is_some())
    }

    async fn direct_grants(&self, email: &str) -> StorageResult<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .grants
            .values()
            .filter(|g| g.email == email)
            .map(|g| g.agent_name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<GroupId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_rows_read_as_empty() {
        let store = InMemoryPivotStore::new();
        assert!(store.get_user_groups("nobody@example.com").await.unwrap().is_empty());
        assert!(store.get_agent_groups("agent_C").await.unwrap().is_empty());
        assert!(store.get_agent_pivot("agent_C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_replaces_row() {
        let store = InMemoryPivotStore::new();
        store
            .sync_user_groups("u1@example.com", ids(&["g1", "g2"]))
            .await
            .unwrap();
        store
            .sync_user_groups("u1@example.com", ids(&["g3"]))
            .await
            .unwrap();

        assert_eq!(
            store.get_user_groups("u1@example.com").await.unwrap(),
            ids(&["g3"])
        );
        assert_eq!(store.list_all_user_pivots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_agent_moves_row_and_grants() {
        let store = InMemoryPivotStore::new();
        store
            .assign_agent_groups("old", ids(&["g1"]), vec![])
            .await
            .unwrap();
        store.grant_direct_access("u@example.com", "old").await.unwrap();

        assert!(store.rename_agent("old", "new").await.unwrap());
        assert!(store.get_agent_groups("old").await.unwrap().is_empty());
        assert_eq!(store.get_agent_groups("new").await.unwrap(), ids(&["g1"]));
        assert_eq!(
            store.direct_grants("u@example.com").await.unwrap(),
            vec!["new".to_string()]
        );

        assert!(!store.rename_agent("missing", "other").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_moves_grants_without_pivot_row() {
        let store = InMemoryPivotStore::new();
        store.grant_direct_access("u@example.com", "my-agent").await.unwrap();
        store.grant_direct_access("v@example.com", "my-agent").await.unwrap();
        store.grant_direct_access("v@example.com", "my-agent-v2").await.unwrap();

        assert!(store.rename_agent("my-agent", "my-agent-v2").await.unwrap());
        assert_eq!(
            store.direct_grants("u@example.com").await.unwrap(),
            vec!["my-agent-v2".to_string()]
        );
        assert_eq!(
            store.direct_grants("v@example.com").await.unwrap(),
            vec!["my-agent-v2".to_string()]
        );
        assert!(store.get_agent_pivot("my-agent-v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repair_skips_rows_written_after_observation() {
        let store = InMemoryPivotStore::new();
        let observed_at = Utc::now() - chrono::Duration::seconds(5);
        store
            .sync_user_groups("u@example.com", ids(&["g1"]))
            .await
            .unwrap();

        let repaired = store
            .repair_user_groups("u@example.com", ids(&["g-old", "g1"]), observed_at)
            .await
            .unwrap();
        assert!(repaired.is_none());
        assert_eq!(
            store.get_user_groups("u@example.com").await.unwrap(),
            ids(&["g1"])
        );
    }

    #[tokio::test]
    async fn test_repair_replaces_older_or_missing_rows() {
        let store = InMemoryPivotStore::new();
        let stale = store
            .sync_user_groups("u@example.com", ids(&["g-old"]))
            .await
            .unwrap();

        let repaired = store
            .repair_user_groups(
                "u@example.com",
                ids(&["g1"]),
                stale.updated_at + chrono::Duration::milliseconds(1),
            )
            .await
            .unwrap();
        assert!(repaired.is_some());
        assert_eq!(
            store.get_user_groups("u@example.com").await.unwrap(),
            ids(&["g1"])
        );

        assert!(
            store
                .repair_user_groups("new@example.com", ids(&["g2"]), Utc::now())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_rename_onto_existing_is_constraint_error() {
        let store = InMemoryPivotStore::new();
        store.assign_agent_groups("a", ids(&["g1"]), vec![]).await.unwrap();
        store.assign_agent_groups("b", ids(&["g2"]), vec![]).await.unwrap();

        let err = store.rename_agent("a", "b").await.unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
        assert_eq!(store.get_agent_groups("a").await.unwrap(), ids(&["g1"]));
    }

    #[tokio::test]
    async fn test_direct_grants_are_idempotent() {
        let store = InMemoryPivotStore::new();
        let first = store.grant_direct_access("u@example.com", "mine").await.unwrap();
        let second = store.grant_direct_access("u@example.com", "mine").await.unwrap();
        assert_eq!(first.granted_at, second.granted_at);
        assert_eq!(store.direct_grants("u@example.com").await.unwrap().len(), 1);

        assert!(store.revoke_direct_access("u@example.com", "mine").await.unwrap());
        assert!(!store.revoke_direct_access("u@example.com", "mine").await.unwrap());
        assert!(store.direct_grants("u@example.com").await.unwrap().is_empty());
    }
}
