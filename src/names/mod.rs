//! Group-name resolution
//!
//! Display names for Azure AD group ids. Names come first from the local
//! table (seeded from administrative assignment metadata), then from the
//! group directory. Lookups never fail: anything that cannot be resolved
//! renders as a placeholder.

pub mod resolver;
pub mod table;

pub use resolver::{GroupNameResolver, placeholder_name};
pub use table::GroupNameTable;
