//! Group directory
//!
//! The external identity directory (Microsoft Graph) the engine consumes:
//! the caller's group memberships and group lookups by id.

pub mod client;
pub mod types;

pub use client::{GraphClient, backoff_delay};
pub use types::{CallerProfile, DirectoryObject, DirectoryPage, GroupInfo};

use crate::error::DirectoryResult;
use crate::pivot::GroupId;
use crate::util::SecretString;
// async_trait required for dyn-compatibility with Arc<dyn GroupDirectory>
use async_trait::async_trait;

/// Group directory client
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Profile of the token's subject
    async fn caller_profile(&self, token: &SecretString) -> DirectoryResult<CallerProfile>;

    /// Every group id the token's subject is a member of
    async fn caller_groups(&self, token: &SecretString) -> DirectoryResult<Vec<GroupId>>;

    /// Look up one group. `Ok(None)` means the directory reports it does not
    /// exist; `Err` means the lookup itself failed.
    async fn group_by_id(
        &self,
        token: &SecretString,
        group_id: &str,
    ) -> DirectoryResult<Option<GroupInfo>>;
}
