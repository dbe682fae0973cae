//! Post-login profile check
//!
//! Confirms the user's stored group set matches what the directory reported
//! at login, re-syncing when it does not (for example after a failed
//! login-time write). The repair only lands while the stored row is older
//! than the login; a later sync always wins over a late or retried check.

use crate::error::JobError;
use crate::jobs::Job;
use crate::pivot::{GroupId, PivotStore, dedupe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ProfileCheckJob {
    store: Arc<dyn PivotStore>,
    email: String,
    expected: Vec<GroupId>,
    observed_at: DateTime<Utc>,
}

impl ProfileCheckJob {
    /// `observed_at` is when the directory reported `expected`
    pub fn new(
        store: Arc<dyn PivotStore>,
        email: impl Into<String>,
        expected: Vec<GroupId>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            email: email.into(),
            expected,
            observed_at,
        }
    }

    fn failed(&self, reason: impl std::fmt::Display) -> JobError {
        JobError::Failed {
            job: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Job for ProfileCheckJob {
    fn name(&self) -> &str {
        "profile_check"
    }

    async fn run(&self) -> Result<(), JobError> {
        let stored = self
            .store
            .get_user_groups(&self.email)
            .await
            .map_err(|e| self.failed(e))?;

        let stored: HashSet<&GroupId> = stored.iter().collect();
        let expected = dedupe(&self.expected);
        if stored.len() == expected.len() && expected.iter().all(|g| stored.contains(g)) {
            debug!(email = %self.email, groups = expected.len(), "Profile groups up to date");
            return Ok(());
        }

        let repaired = self
            .store
            .repair_user_groups(&self.email, self.expected.clone(), self.observed_at)
            .await
            .map_err(|e| self.failed(e))?;

        if repaired.is_some() {
            info!(
                email = %self.email,
                stored = stored.len(),
                expected = expected.len(),
                "Stored groups out of date, re-synced"
            );
        } else {
            debug!(email = %self.email, "Groups synced after this login, leaving them");
        }
        Ok(())
    }
}
