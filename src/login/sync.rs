//! Login sync trigger

use crate::directory::GroupDirectory;
use crate::error::DirectoryResult;
use crate::jobs::{JobQueue, ProfileCheckJob};
use crate::login::admin::{AdminDecision, AdminPolicy};
use crate::login::identity::{IdentitySource, UserIdentity};
use crate::pivot::{GroupId, PivotStore};
use crate::util::SecretString;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What happened during a login sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    /// Pivot key used, if the identity had one
    pub key: Option<String>,
    pub key_source: Option<IdentitySource>,
    /// Groups reported by the directory; empty when the fetch failed
    pub groups: Vec<GroupId>,
    pub groups_fetched: bool,
    pub synced: bool,
    pub admin: AdminDecision,
    pub profile_check_queued: bool,
}

impl LoginOutcome {
    fn skipped() -> Self {
        Self {
            key: None,
            key_source: None,
            groups: Vec::new(),
            groups_fetched: false,
            synced: false,
            admin: AdminDecision::Unchanged,
            profile_check_queued: false,
        }
    }
}

/// Runs the group sync for each successful sign-in
pub struct LoginSync {
    directory: Arc<dyn GroupDirectory>,
    store: Arc<dyn PivotStore>,
    admin_policy: AdminPolicy,
    jobs: Option<JobQueue>,
}

impl LoginSync {
    pub fn new(
        directory: Arc<dyn GroupDirectory>,
        store: Arc<dyn PivotStore>,
        admin_policy: AdminPolicy,
    ) -> Self {
        Self {
            directory,
            store,
            admin_policy,
            jobs: None,
        }
    }

    /// Queue a profile check after each login
    pub fn with_jobs(mut self, jobs: JobQueue) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Sync the groups of the token's subject. The identity comes from the
    /// directory profile behind the token, so a caller cannot sync under
    /// someone else's email. Fails only when the profile cannot be read.
    #[instrument(skip(self, access_token))]
    pub async fn on_token_login(&self, access_token: &SecretString) -> DirectoryResult<LoginOutcome> {
        let profile = self.directory.caller_profile(access_token).await?;
        let identity = UserIdentity::from(profile);
        Ok(self.on_login(&identity, access_token).await)
    }

    /// Sync the caller's groups for an identity the host has already
    /// verified. Never fails; problems are logged and reflected in the
    /// outcome.
    #[instrument(skip(self, identity, access_token))]
    pub async fn on_login(&self, identity: &UserIdentity, access_token: &SecretString) -> LoginOutcome {
        let Some((key, source)) = identity.canonical_key() else {
            warn!("Login without email or username, skipping group sync");
            return LoginOutcome::skipped();
        };

        let mut outcome = LoginOutcome {
            key: Some(key.to_string()),
            key_source: Some(source),
            ..LoginOutcome::skipped()
        };

        let observed_at = Utc::now();
        match self.directory.caller_groups(access_token).await {
            Ok(groups) => {
                outcome.groups = groups;
                outcome.groups_fetched = true;
            }
            Err(e) => {
                warn!(user = key, error = %e, "Failed to fetch groups at login, continuing");
                return outcome;
            }
        }

        match self.store.sync_user_groups(key, outcome.groups.clone()).await {
            Ok(row) => {
                outcome.synced = true;
                info!(user = key, groups = row.groups.len(), "Synced user groups at login");
            }
            Err(e) => {
                warn!(user = key, error = %e, "Failed to store groups at login, continuing");
            }
        }

        outcome.admin = self.admin_policy.evaluate(&outcome.groups);
        if outcome.admin != AdminDecision::Unchanged {
            info!(user = key, decision = ?outcome.admin, "Re-evaluated admin flag");
        }

        if let Some(jobs) = &self.jobs {
            let job = ProfileCheckJob::new(
                Arc::clone(&self.store),
                key,
                outcome.groups.clone(),
                observed_at,
            );
            match jobs.submit(Box::new(job)) {
                Ok(()) => outcome.profile_check_queued = true,
                Err(e) => warn!(user = key, error = %e, "Could not queue profile check"),
            }
        }

        outcome
    }
}
