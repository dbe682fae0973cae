//! Pivot row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Azure AD group identifier (opaque, usually a UUID string)
pub type GroupId = String;

/// Display metadata stored alongside an agent's group assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: GroupId,
    pub name: String,
}

/// Current group memberships of one user, keyed by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserGroupPivot {
    pub email: String,
    pub groups: Vec<GroupId>,
    pub updated_at: DateTime<Utc>,
}

impl UserGroupPivot {
    pub fn new(email: impl Into<String>, groups: Vec<GroupId>) -> Self {
        Self {
            email: email.into(),
            groups,
            updated_at: Utc::now(),
        }
    }

    /// Groups with upstream duplicates removed
    pub fn unique_groups(&self) -> Vec<GroupId> {
        dedupe(&self.groups)
    }
}

/// Groups an agent is visible to, keyed by agent name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentGroupPivot {
    pub agent_name: String,
    pub groups: Vec<GroupId>,
    pub metadata: Vec<GroupMetadata>,
    pub updated_at: DateTime<Utc>,
}

impl AgentGroupPivot {
    pub fn new(
        agent_name: impl Into<String>,
        groups: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            groups,
            metadata,
            updated_at: Utc::now(),
        }
    }

    pub fn unique_groups(&self) -> Vec<GroupId> {
        dedupe(&self.groups)
    }
}

/// A direct (non group based) grant of one agent to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectGrant {
    pub email: String,
    pub agent_name: String,
    pub granted_at: DateTime<Utc>,
}

/// Remove duplicates, keeping first-seen order
pub fn dedupe(groups: &[GroupId]) -> Vec<GroupId> {
    let mut seen = HashSet::with_capacity(groups.len());
    groups
        .iter()
        .filter(|g| seen.insert(g.as_str()))
        .cloned()
        .collect()
}
