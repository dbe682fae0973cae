//! Access control module
//!
//! Group-intersection access decisions between users and agents.
//!
//! ## Access Model
//!
//! ```text
//! user email ──► user pivot  ──┐
//!                              ├─► intersect ─► allow / deny
//! agent name ──► agent pivot ──┘
//! ```
//!
//! | user groups | agent groups | decision |
//! |-------------|--------------|----------|
//! | empty       | any          | deny     |
//! | any         | empty        | deny     |
//! | disjoint    | disjoint     | deny     |
//! | overlap     | overlap      | allow    |
//!
//! User-created agents bypass the pivot and are granted through the direct
//! grant table instead.

pub mod engine;

pub use engine::{AccessDecision, AccessEngine, DenyReason, groups_intersect};
