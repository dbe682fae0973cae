//! Login-time group synchronization
//!
//! On every successful sign-in the caller's directory groups replace the
//! stored user pivot, and the administrator flag is re-derived from the
//! configured admin groups. Nothing here can fail the login itself.

pub mod admin;
pub mod identity;
pub mod sync;

pub use admin::{AdminDecision, AdminPolicy};
pub use identity::{IdentitySource, UserIdentity};
pub use sync::{LoginOutcome, LoginSync};
