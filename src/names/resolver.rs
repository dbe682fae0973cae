//! Group-name resolver
//!
//! Resolution order for one id:
//!
//! ```text
//! local table hit         -> stored name
//! directory Some(group)   -> displayName | mail | placeholder  (cached)
//! directory None          -> placeholder                       (info)
//! directory / auth error  -> placeholder                       (warn)
//! ```

use crate::auth::AuthProvider;
use crate::directory::GroupDirectory;
use crate::names::table::GroupNameTable;
use crate::pivot::{GroupId, dedupe};
use crate::util::short_id;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Placeholder shown for groups whose name cannot be resolved
pub fn placeholder_name(group_id: &str) -> String {
    format!("Group ({}...)", short_id(group_id))
}

struct DirectoryLookup {
    directory: Arc<dyn GroupDirectory>,
    auth: Arc<dyn AuthProvider>,
}

/// Resolves group ids to display names
pub struct GroupNameResolver {
    table: Arc<GroupNameTable>,
    lookup: Option<DirectoryLookup>,
}

impl GroupNameResolver {
    pub fn new(
        directory: Arc<dyn GroupDirectory>,
        auth: Arc<dyn AuthProvider>,
        table: Arc<GroupNameTable>,
    ) -> Self {
        Self {
            table,
            lookup: Some(DirectoryLookup { directory, auth }),
        }
    }

    /// Resolver that only consults the local table
    pub fn local_only(table: Arc<GroupNameTable>) -> Self {
        Self {
            table,
            lookup: None,
        }
    }

    pub fn table(&self) -> &Arc<GroupNameTable> {
        &self.table
    }

    /// Display name for one group id. Never fails.
    #[instrument(skip(self, group_id), fields(group = short_id(group_id)))]
    pub async fn resolve_group_name(&self, group_id: &str) -> String {
        if let Some(name) = self.table.get(group_id) {
            return name;
        }

        let Some(lookup) = &self.lookup else {
            debug!("No directory configured, using placeholder");
            return placeholder_name(group_id);
        };

        let token = match lookup.auth.bearer_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "No directory credential for group lookup");
                return placeholder_name(group_id);
            }
        };

        match lookup.directory.group_by_id(&token, group_id).await {
            Ok(Some(group)) => match group.label() {
                Some(label) => {
                    let label = label.trim().to_string();
                    self.table.remember(group_id, &label);
                    label
                }
                None => {
                    debug!("Group has neither displayName nor mail");
                    placeholder_name(group_id)
                }
            },
            Ok(None) => {
                info!("Group not found in directory (may have been deleted)");
                placeholder_name(group_id)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Group lookup failed");
                placeholder_name(group_id)
            }
        }
    }

    /// Display names for many ids, looked up concurrently
    ///
    /// Duplicate ids are looked up once. One failed lookup only affects its
    /// own entry.
    pub async fn resolve_group_names(&self, group_ids: &[GroupId]) -> HashMap<GroupId, String> {
        let unique = dedupe(group_ids);
        let names = join_all(unique.iter().map(|id| self.resolve_group_name(id))).await;
        unique.into_iter().zip(names).collect()
    }
}
