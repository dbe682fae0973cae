//! RBAC statistics
//!
//! Aggregate counts over the pivot tables and the agent directory, plus the
//! consistency checks an administrator wants on the same screen: pivots
//! pointing at unknown agents and agents nobody can reach.

use crate::agents::AgentDirectory;
use crate::error::StorageResult;
use crate::pivot::{PivotStore, UserGroupPivot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

/// Point-in-time RBAC statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RbacStats {
    /// Users with a pivot row
    pub total_users: usize,
    /// Pivot users counted as active
    pub active_users: usize,
    /// Agents in the directory
    pub total_agents: usize,
    /// Enabled agents that are not soft-deleted
    pub active_agents: usize,
    /// Agent pivots assigned to at least one group
    pub agents_with_groups: usize,
    /// Enabled agents without any group assignment
    pub agents_without_groups: Vec<String>,
    /// Agent pivots naming agents missing from the directory
    pub orphan_agent_pivots: Vec<String>,
    /// Users per group id
    pub users_per_group: BTreeMap<String, usize>,
    /// Agents per group id
    pub agents_per_group: BTreeMap<String, usize>,
}

/// Which pivot users count as active
#[derive(Debug, Clone, Copy)]
pub enum ActiveUsers<'a> {
    /// Every user with a pivot row
    All,
    /// Users whose pivot key is in the roster
    Roster(&'a HashSet<String>),
    /// Users whose groups were synced at or after the cutoff
    SyncedSince(DateTime<Utc>),
}

impl ActiveUsers<'_> {
    fn includes(&self, user: &UserGroupPivot) -> bool {
        match self {
            ActiveUsers::All => true,
            ActiveUsers::Roster(roster) => roster.contains(&user.email),
            ActiveUsers::SyncedSince(cutoff) => user.updated_at >= *cutoff,
        }
    }
}

impl RbacStats {
    /// Collect statistics
    #[instrument(skip_all)]
    pub async fn collect(
        store: &dyn PivotStore,
        directory: &dyn AgentDirectory,
        active_users: ActiveUsers<'_>,
    ) -> StorageResult<Self> {
        let users = store.list_all_user_pivots().await?;
        let pivots = store.list_all_agent_pivots().await?;
        let agents = directory.agents().await?;

        let mut stats = RbacStats {
            total_users: users.len(),
            active_users: users.iter().filter(|u| active_users.includes(u)).count(),
            total_agents: agents.len(),
            active_agents: agents
                .iter()
                .filter(|a| a.is_enabled && !a.is_deleted)
                .count(),
            ..Default::default()
        };

        for user in &users {
            for group in user.unique_groups() {
                *stats.users_per_group.entry(group).or_default() += 1;
            }
        }

        let known: HashSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        let mut assigned = HashSet::new();
        for pivot in &pivots {
            let groups = pivot.unique_groups();
            if !groups.is_empty() {
                stats.agents_with_groups += 1;
                assigned.insert(pivot.agent_name.as_str());
            }
            if !known.contains(pivot.agent_name.as_str()) {
                stats.orphan_agent_pivots.push(pivot.agent_name.clone());
            }
            for group in groups {
                *stats.agents_per_group.entry(group).or_default() += 1;
            }
        }

        stats.agents_without_groups = agents
            .iter()
            .filter(|a| a.is_enabled && !a.is_deleted && !assigned.contains(a.name.as_str()))
            .map(|a| a.name.clone())
            .collect();

        Ok(stats)
    }
}
