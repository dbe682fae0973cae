//! Pivot store traits
//!
//! Both pivots use replace-on-write semantics: every write deletes the
//! existing row for the key and inserts the new one inside a single
//! transaction. Nothing is ever merged.

use crate::error::StorageResult;
use crate::pivot::types::{AgentGroupPivot, DirectGrant, GroupId, GroupMetadata, UserGroupPivot};
// async_trait required for dyn-compatibility with Arc<dyn PivotStore>
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable storage of group-id sets keyed by user email or agent name
#[async_trait]
pub trait PivotStore: Send + Sync {
    /// Replace the user's group set. Returns the inserted row.
    async fn sync_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
    ) -> StorageResult<UserGroupPivot>;

    /// Replace the user's group set only when no row exists or the row was
    /// last written before `observed_at`. Returns `None`, leaving the row
    /// untouched, when a newer write got there first.
    async fn repair_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<Option<UserGroupPivot>>;

    /// The user's groups, deduplicated; empty when no row exists
    async fn get_user_groups(&self, email: &str) -> StorageResult<Vec<GroupId>>;

    /// Replace the agent's group set and display metadata
    async fn assign_agent_groups(
        &self,
        agent_name: &str,
        group_ids: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> StorageResult<AgentGroupPivot>;

    /// The agent's groups, deduplicated; empty when no row exists
    async fn get_agent_groups(&self, agent_name: &str) -> StorageResult<Vec<GroupId>>;

    /// The full agent row, if any
    async fn get_agent_pivot(&self, agent_name: &str) -> StorageResult<Option<AgentGroupPivot>>;

    async fn list_all_user_pivots(&self) -> StorageResult<Vec<UserGroupPivot>>;

    async fn list_all_agent_pivots(&self) -> StorageResult<Vec<AgentGroupPivot>>;

    /// Move an agent's pivot row and direct grants to a new name. Grants
    /// move even when the agent has no pivot row. Returns false when
    /// neither table had anything under `old_name`.
    ///
    /// Fails with a constraint error when both names have a pivot row.
    async fn rename_agent(&self, old_name: &str, new_name: &str) -> StorageResult<bool>;
}

/// Direct access table for user-created agents
#[async_trait]
pub trait DirectGrantStore: Send + Sync {
    /// Grant access; granting twice keeps the original grant
    async fn grant_direct_access(&self, email: &str, agent_name: &str)
    -> StorageResult<DirectGrant>;

    /// Returns whether a grant was removed
    async fn revoke_direct_access(&self, email: &str, agent_name: &str) -> StorageResult<bool>;

    /// Agent names directly granted to the user
    async fn direct_grants(&self, email: &str) -> StorageResult<Vec<String>>;
}
