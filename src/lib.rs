//! Agent RBAC
//!
//! Group-based access control between Azure AD users and agents.
//!
//! ## Features
//!
//! - **Login-time sync** of the caller's directory groups into a user pivot
//! - **Intersection checks**: a user may use an agent when they share a group
//! - **Two-tier listing**: group pivot for enterprise agents, direct grants
//!   for user-created agents
//! - **Group-name resolution** with placeholder fallback
//! - **Admin HTTP API** over the engine
//!
//! ## Access Model
//!
//! ```text
//! login ──► /me/memberOf ──► user pivot (replace) ─┐
//!                                                  ├─► ∩ ≠ ∅ ─► allow
//! admin ──► assign groups ──► agent pivot (replace)┘
//! ```
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! # admin_token from AGENT_RBAC__SERVER__ADMIN_TOKEN
//!
//! [graph]
//! # token from GRAPH_TOKEN env var
//!
//! [storage]
//! backend = "postgres"            # database_url from DATABASE_URL
//!
//! [rbac]
//! admin_group_ids = ["6f1c0c1e-admins"]
//!
//! [[agents]]
//! name = "finance-assistant"
//! status = "active"
//! ```

pub mod access_control;
pub mod agents;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod jobs;
pub mod login;
pub mod names;
pub mod pivot;
pub mod server;
pub mod stats;
pub mod util;

// Re-export main types
pub use access_control::{AccessDecision, AccessEngine};
pub use config::{AppConfig, load_config};
pub use login::{AdminPolicy, LoginSync};
pub use names::GroupNameResolver;
