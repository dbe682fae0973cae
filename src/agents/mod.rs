//! Agent directory
//!
//! The catalog of agents (name, enablement, status, soft-delete flag) that
//! access decisions are made against.

pub mod directory;
pub mod types;

pub use directory::{AgentDirectory, StaticAgentDirectory, index_by_name};
pub use types::{AgentKind, AgentRecord, AgentRef, AgentStatus, IconRef};
