//! Access decision engine
//!
//! Evaluates `has_access(user, agent) = groups(user) ∩ groups(agent) ≠ ∅`
//! over the pivot stores. Denial is the default: an empty set on either side
//! never grants access, and read failures are treated as empty sets.

use crate::agents::{AgentDirectory, AgentKind, AgentRef, index_by_name};
use crate::error::StorageResult;
use crate::pivot::{
    AgentGroupPivot, DirectGrantStore, GroupId, GroupMetadata, PivotStore, UserGroupPivot,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Why access was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The user has no synchronized groups
    NoUserGroups,
    /// The agent has no assigned groups
    NoAgentGroups,
    /// Both sides have groups but none in common
    NoSharedGroups,
}

/// Result of an access check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed { shared_groups: Vec<GroupId> },
    Denied { reason: DenyReason },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }
}

/// Whether two group sets share at least one id. Empty sets never intersect.
pub fn groups_intersect(user_groups: &[GroupId], agent_groups: &[GroupId]) -> bool {
    if user_groups.is_empty() || agent_groups.is_empty() {
        return false;
    }
    let agent: HashSet<&str> = agent_groups.iter().map(String::as_str).collect();
    user_groups.iter().any(|g| agent.contains(g.as_str()))
}

/// Shared ids in user order, without duplicates
fn shared_groups(user_groups: &[GroupId], agent_groups: &[GroupId]) -> Vec<GroupId> {
    let agent: HashSet<&str> = agent_groups.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    user_groups
        .iter()
        .filter(|g| agent.contains(g.as_str()) && seen.insert(g.as_str()))
        .cloned()
        .collect()
}

/// Sync, lookup and intersection operations over the pivot stores
pub struct AccessEngine {
    pivots: Arc<dyn PivotStore>,
    grants: Arc<dyn DirectGrantStore>,
}

impl AccessEngine {
    pub fn new(pivots: Arc<dyn PivotStore>, grants: Arc<dyn DirectGrantStore>) -> Self {
        Self { pivots, grants }
    }

    pub fn pivots(&self) -> &Arc<dyn PivotStore> {
        &self.pivots
    }

    pub fn grants(&self) -> &Arc<dyn DirectGrantStore> {
        &self.grants
    }

    /// Replace the user's group set
    pub async fn sync_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
    ) -> StorageResult<UserGroupPivot> {
        self.pivots.sync_user_groups(email, group_ids).await
    }

    /// Replace the agent's group set. Errors surface to the administrator.
    pub async fn assign_agent_groups(
        &self,
        agent_name: &str,
        group_ids: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> StorageResult<AgentGroupPivot> {
        self.pivots
            .assign_agent_groups(agent_name, group_ids, metadata)
            .await
    }

    /// The user's groups; empty when unknown or unreadable
    pub async fn get_user_groups(&self, email: &str) -> Vec<GroupId> {
        match self.pivots.get_user_groups(email).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(email, error = %e, "Failed to read user pivot, treating as no groups");
                Vec::new()
            }
        }
    }

    /// The agent's groups; empty when unknown or unreadable
    pub async fn get_agent_groups(&self, agent_name: &str) -> Vec<GroupId> {
        match self.pivots.get_agent_groups(agent_name).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(agent_name, error = %e, "Failed to read agent pivot, treating as no groups");
                Vec::new()
            }
        }
    }

    /// Full access decision with the reason
    #[instrument(skip(self))]
    pub async fn decide(&self, user_email: &str, agent_name: &str) -> AccessDecision {
        let user_groups = self.get_user_groups(user_email).await;
        if user_groups.is_empty() {
            debug!("Denied: user has no groups");
            return AccessDecision::Denied {
                reason: DenyReason::NoUserGroups,
            };
        }

        let agent_groups = self.get_agent_groups(agent_name).await;
        if agent_groups.is_empty() {
            debug!("Denied: agent has no groups");
            return AccessDecision::Denied {
                reason: DenyReason::NoAgentGroups,
            };
        }

        let shared = shared_groups(&user_groups, &agent_groups);
        if shared.is_empty() {
            debug!("Denied: no shared groups");
            AccessDecision::Denied {
                reason: DenyReason::NoSharedGroups,
            }
        } else {
            debug!(shared = shared.len(), "Allowed");
            AccessDecision::Allowed {
                shared_groups: shared,
            }
        }
    }

    /// True iff the user and agent share at least one group
    pub async fn check_access(&self, user_email: &str, agent_name: &str) -> bool {
        self.decide(user_email, agent_name).await.is_allowed()
    }

    /// Agents reachable through the group pivot, in pivot order
    ///
    /// Pivot rows naming agents absent from the directory are skipped with a
    /// warning. Disabled, deleted and non-active agents are skipped.
    #[instrument(skip(self, directory))]
    pub async fn list_accessible_agents(
        &self,
        user_email: &str,
        directory: &dyn AgentDirectory,
    ) -> Vec<AgentRef> {
        let user_groups = self.get_user_groups(user_email).await;
        if user_groups.is_empty() {
            return Vec::new();
        }

        let pivots = match self.pivots.list_all_agent_pivots().await {
            Ok(pivots) => pivots,
            Err(e) => {
                warn!(error = %e, "Failed to list agent pivots, returning no agents");
                return Vec::new();
            }
        };

        let agents = match directory.agents().await {
            Ok(agents) => index_by_name(agents),
            Err(e) => {
                warn!(error = %e, "Failed to load agent directory, returning no agents");
                return Vec::new();
            }
        };

        let mut accessible = Vec::new();
        for pivot in pivots {
            if !groups_intersect(&user_groups, &pivot.groups) {
                continue;
            }
            match agents.get(&pivot.agent_name) {
                Some(agent) if agent.is_listable() => accessible.push(agent.clone()),
                Some(agent) => {
                    debug!(
                        agent_name = %pivot.agent_name,
                        status = %agent.status,
                        enabled = agent.is_enabled,
                        deleted = agent.is_deleted,
                        "Skipping unlisted agent"
                    );
                }
                None => {
                    warn!(
                        agent_name = %pivot.agent_name,
                        "Agent pivot references an agent missing from the directory"
                    );
                }
            }
        }
        accessible
    }

    /// Two-tier listing: enterprise agents through the group pivot, user
    /// agents through the direct grant table
    #[instrument(skip(self, directory))]
    pub async fn list_available_agents(
        &self,
        user_email: &str,
        directory: &dyn AgentDirectory,
    ) -> Vec<AgentRef> {
        let mut available: Vec<AgentRef> = self
            .list_accessible_agents(user_email, directory)
            .await
            .into_iter()
            .filter(|a| a.kind == AgentKind::Enterprise)
            .collect();

        let granted: HashSet<String> = match self.grants.direct_grants(user_email).await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read direct grants, skipping user agents");
                return available;
            }
        };
        if granted.is_empty() {
            return available;
        }

        let agents = match directory.enabled_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "Failed to load agent directory, skipping user agents");
                return available;
            }
        };

        let mut names: HashSet<String> = available.iter().map(|a| a.name.clone()).collect();
        for agent in agents {
            if agent.kind == AgentKind::User
                && granted.contains(&agent.name)
                && names.insert(agent.name.clone())
            {
                available.push(agent);
            }
        }
        available
    }

    /// Emails of users whose groups intersect the agent's
    #[instrument(skip(self))]
    pub async fn users_with_access(&self, agent_name: &str) -> Vec<String> {
        let agent_groups = self.get_agent_groups(agent_name).await;
        if agent_groups.is_empty() {
            return Vec::new();
        }

        match self.pivots.list_all_user_pivots().await {
            Ok(users) => users
                .into_iter()
                .filter(|u| groups_intersect(&u.groups, &agent_groups))
                .map(|u| u.email)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list user pivots");
                Vec::new()
            }
        }
    }
}
