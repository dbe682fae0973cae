//! Pivot stores
//!
//! Persists, per user email and per agent name, the current set of Azure AD
//! group ids, plus the direct grant table used for user-created agents.
//!
//! ```text
//! rbac_user_pivot    email      -> [group ids]
//! rbac_agent_pivot   agent_name -> [group ids] + [{id, name}] display metadata
//! rbac_direct_grant  (email, agent_name)
//! ```

pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use memory::InMemoryPivotStore;
pub use postgres::PostgresPivotStore;
pub use store::{DirectGrantStore, PivotStore};
pub use types::{AgentGroupPivot, DirectGrant, GroupId, GroupMetadata, UserGroupPivot, dedupe};
