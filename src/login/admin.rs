//! Administrator flag policy

use crate::pivot::GroupId;
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of re-evaluating the admin flag at login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminDecision {
    Grant,
    Revoke,
    /// No admin groups configured, or groups could not be fetched
    Unchanged,
}

impl AdminDecision {
    /// The flag after applying this decision
    pub fn apply(self, current: bool) -> bool {
        match self {
            AdminDecision::Grant => true,
            AdminDecision::Revoke => false,
            AdminDecision::Unchanged => current,
        }
    }
}

/// Admin group ids from configuration
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admin_groups: HashSet<GroupId>,
}

impl AdminPolicy {
    pub fn new(admin_group_ids: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            admin_groups: admin_group_ids
                .into_iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.admin_groups.is_empty()
    }

    pub fn evaluate(&self, user_groups: &[GroupId]) -> AdminDecision {
        if !self.is_configured() {
            return AdminDecision::Unchanged;
        }
        if user_groups.iter().any(|g| self.admin_groups.contains(g)) {
            AdminDecision::Grant
        } else {
            AdminDecision::Revoke
        }
    }
}
