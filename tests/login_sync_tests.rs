//! Login sync integration tests

use agent_rbac::directory::{CallerProfile, GroupDirectory, GroupInfo};
use agent_rbac::error::{DirectoryError, DirectoryResult, StorageError, StorageResult};
use agent_rbac::jobs::{JobQueue, RetryPolicy};
use agent_rbac::login::{AdminDecision, AdminPolicy, IdentitySource, LoginSync, UserIdentity};
use agent_rbac::pivot::{
    AgentGroupPivot, GroupId, GroupMetadata, InMemoryPivotStore, PivotStore, UserGroupPivot,
};
use agent_rbac::util::SecretString;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn ids(list: &[&str]) -> Vec<GroupId> {
    list.iter().map(|s| s.to_string()).collect()
}

fn token() -> SecretString {
    SecretString::from("user-token")
}

/// Directory returning a fixed membership, or failing
struct FixedDirectory {
    groups: Result<Vec<GroupId>, ()>,
    profile: CallerProfile,
}

impl FixedDirectory {
    fn member_of(groups: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            groups: Ok(ids(groups)),
            profile: CallerProfile {
                mail: Some("me@example.com".into()),
                user_principal_name: Some("me@tenant.example.com".into()),
            },
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            groups: Err(()),
            profile: CallerProfile::default(),
        })
    }
}

#[async_trait]
impl GroupDirectory for FixedDirectory {
    async fn caller_profile(&self, _token: &SecretString) -> DirectoryResult<CallerProfile> {
        match self.groups {
            Ok(_) => Ok(self.profile.clone()),
            Err(()) => Err(DirectoryError::Unauthorized),
        }
    }

    async fn caller_groups(&self, _token: &SecretString) -> DirectoryResult<Vec<GroupId>> {
        self.groups.clone().map_err(|_| DirectoryError::Api {
            status: 503,
            message: "Service Unavailable".into(),
        })
    }

    async fn group_by_id(
        &self,
        _token: &SecretString,
        _group_id: &str,
    ) -> DirectoryResult<Option<GroupInfo>> {
        Ok(None)
    }
}

/// In-memory store whose user writes fail until healed
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryPivotStore,
    healed: AtomicBool,
}

#[async_trait]
impl PivotStore for FlakyStore {
    async fn sync_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
    ) -> StorageResult<UserGroupPivot> {
        if !self.healed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("pool timed out".into()));
        }
        self.inner.sync_user_groups(email, group_ids).await
    }
    async fn repair_user_groups(
        &self,
        email: &str,
        group_ids: Vec<GroupId>,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<Option<UserGroupPivot>> {
        if !self.healed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("pool timed out".into()));
        }
        self.inner
            .repair_user_groups(email, group_ids, observed_at)
            .await
    }
    async fn get_user_groups(&self, email: &str) -> StorageResult<Vec<GroupId>> {
        self.inner.get_user_groups(email).await
    }
    async fn assign_agent_groups(
        &self,
        agent_name: &str,
        group_ids: Vec<GroupId>,
        metadata: Vec<GroupMetadata>,
    ) -> StorageResult<AgentGroupPivot> {
        self.inner
            .assign_agent_groups(agent_name, group_ids, metadata)
            .await
    }
    async fn get_agent_groups(&self, agent_name: &str) -> StorageResult<Vec<GroupId>> {
        self.inner.get_agent_groups(agent_name).await
    }
    async fn get_agent_pivot(&self, agent_name: &str) -> StorageResult<Option<AgentGroupPivot>> {
        self.inner.get_agent_pivot(agent_name).await
    }
    async fn list_all_user_pivots(&self) -> StorageResult<Vec<UserGroupPivot>> {
        self.inner.list_all_user_pivots().await
    }
    async fn list_all_agent_pivots(&self) -> StorageResult<Vec<AgentGroupPivot>> {
        self.inner.list_all_agent_pivots().await
    }
    async fn rename_agent(&self, old_name: &str, new_name: &str) -> StorageResult<bool> {
        self.inner.rename_agent(old_name, new_name).await
    }
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn test_login_replaces_user_groups() {
    let store = Arc::new(InMemoryPivotStore::new());
    store
        .sync_user_groups("u@example.com", ids(&["old"]))
        .await
        .unwrap();

    let sync = LoginSync::new(
        FixedDirectory::member_of(&["g1", "g2"]),
        store.clone(),
        AdminPolicy::default(),
    );
    let outcome = sync
        .on_login(&UserIdentity::from_email("u@example.com"), &token())
        .await;

    assert!(outcome.groups_fetched);
    assert!(outcome.synced);
    assert_eq!(outcome.key.as_deref(), Some("u@example.com"));
    assert_eq!(outcome.key_source, Some(IdentitySource::Email));
    assert_eq!(
        store.get_user_groups("u@example.com").await.unwrap(),
        ids(&["g1", "g2"])
    );
}

#[tokio::test]
async fn test_token_login_keys_by_directory_profile() {
    let store = Arc::new(InMemoryPivotStore::new());
    let sync = LoginSync::new(
        FixedDirectory::member_of(&["g1"]),
        store.clone(),
        AdminPolicy::default(),
    );

    let outcome = sync.on_token_login(&token()).await.unwrap();

    assert_eq!(outcome.key.as_deref(), Some("me@example.com"));
    assert_eq!(store.get_user_groups("me@example.com").await.unwrap(), ids(&["g1"]));
    assert_eq!(store.list_all_user_pivots().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_token_login_fails_without_profile() {
    let store = Arc::new(InMemoryPivotStore::new());
    let sync = LoginSync::new(FixedDirectory::unavailable(), store.clone(), AdminPolicy::default());

    let err = sync.on_token_login(&token()).await.unwrap_err();

    assert!(matches!(err, DirectoryError::Unauthorized));
    assert!(store.list_all_user_pivots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_username_fallback_keys_the_pivot() {
    let store = Arc::new(InMemoryPivotStore::new());
    let sync = LoginSync::new(
        FixedDirectory::member_of(&["g1"]),
        store.clone(),
        AdminPolicy::default(),
    );
    let identity = UserIdentity {
        email: None,
        username: Some("jdoe".into()),
    };

    let outcome = sync.on_login(&identity, &token()).await;

    assert_eq!(outcome.key_source, Some(IdentitySource::Username));
    assert_eq!(store.get_user_groups("jdoe").await.unwrap(), ids(&["g1"]));
}

#[tokio::test]
async fn test_login_without_identity_skips_sync() {
    let store = Arc::new(InMemoryPivotStore::new());
    let sync = LoginSync::new(
        FixedDirectory::member_of(&["g1"]),
        store.clone(),
        AdminPolicy::default(),
    );

    let outcome = sync.on_login(&UserIdentity::default(), &token()).await;

    assert!(outcome.key.is_none());
    assert!(!outcome.synced);
    assert!(store.list_all_user_pivots().await.unwrap().is_empty());
}

// =============================================================================
// Failure Tolerance
// =============================================================================

#[tokio::test]
async fn test_directory_failure_keeps_previous_groups() {
    let store = Arc::new(InMemoryPivotStore::new());
    store
        .sync_user_groups("u@example.com", ids(&["g1"]))
        .await
        .unwrap();
    let sync = LoginSync::new(
        FixedDirectory::unavailable(),
        store.clone(),
        AdminPolicy::new(ids(&["admins"])),
    );

    let outcome = sync
        .on_login(&UserIdentity::from_email("u@example.com"), &token())
        .await;

    assert!(!outcome.groups_fetched);
    assert!(!outcome.synced);
    assert_eq!(outcome.admin, AdminDecision::Unchanged);
    assert_eq!(
        store.get_user_groups("u@example.com").await.unwrap(),
        ids(&["g1"])
    );
}

#[tokio::test]
async fn test_storage_failure_does_not_fail_login() {
    let store = Arc::new(FlakyStore::default());
    let sync = LoginSync::new(
        FixedDirectory::member_of(&["admins"]),
        store.clone(),
        AdminPolicy::new(ids(&["admins"])),
    );

    let outcome = sync
        .on_login(&UserIdentity::from_email("u@example.com"), &token())
        .await;

    assert!(outcome.groups_fetched);
    assert!(!outcome.synced);
    assert_eq!(outcome.admin, AdminDecision::Grant);
}

#[tokio::test]
async fn test_profile_check_repairs_failed_sync() {
    let store = Arc::new(FlakyStore::default());
    let (jobs, worker) = JobQueue::start(
        4,
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
        },
    );
    let sync = LoginSync::new(
        FixedDirectory::member_of(&["g1"]),
        store.clone(),
        AdminPolicy::default(),
    )
    .with_jobs(jobs.clone());

    let outcome = sync
        .on_login(&UserIdentity::from_email("u@example.com"), &token())
        .await;
    assert!(!outcome.synced);
    assert!(outcome.profile_check_queued);

    store.healed.store(true, Ordering::SeqCst);
    worker.shutdown().await;

    assert_eq!(
        store.get_user_groups("u@example.com").await.unwrap(),
        ids(&["g1"])
    );
    assert_eq!(jobs.stats().succeeded, 1);
}

#[tokio::test]
async fn test_late_profile_check_keeps_newer_login() {
    let store = Arc::new(FlakyStore::default());
    let (jobs, worker) = JobQueue::start(
        4,
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
        },
    );

    // First login's write fails, so its check is queued with the old set
    let outcome = LoginSync::new(
        FixedDirectory::member_of(&["g-old", "g1"]),
        store.clone(),
        AdminPolicy::default(),
    )
    .with_jobs(jobs.clone())
    .on_login(&UserIdentity::from_email("u@example.com"), &token())
    .await;
    assert!(outcome.profile_check_queued);

    // Membership shrinks; the next login lands before the check retries
    store.healed.store(true, Ordering::SeqCst);
    let newer = LoginSync::new(
        FixedDirectory::member_of(&["g1"]),
        store.clone(),
        AdminPolicy::default(),
    )
    .on_login(&UserIdentity::from_email("u@example.com"), &token())
    .await;
    assert!(newer.synced);

    worker.shutdown().await;

    assert_eq!(
        store.get_user_groups("u@example.com").await.unwrap(),
        ids(&["g1"])
    );
}

// =============================================================================
// Admin Flag
// =============================================================================

#[tokio::test]
async fn test_admin_revoked_when_removed_from_admin_group() {
    let store = Arc::new(InMemoryPivotStore::new());
    let policy = AdminPolicy::new(ids(&["admins"]));

    let first = LoginSync::new(
        FixedDirectory::member_of(&["admins", "staff"]),
        store.clone(),
        policy.clone(),
    )
    .on_login(&UserIdentity::from_email("u@example.com"), &token())
    .await;
    assert_eq!(first.admin, AdminDecision::Grant);
    let is_admin = first.admin.apply(false);
    assert!(is_admin);

    let second = LoginSync::new(FixedDirectory::member_of(&["staff"]), store, policy)
        .on_login(&UserIdentity::from_email("u@example.com"), &token())
        .await;
    assert_eq!(second.admin, AdminDecision::Revoke);
    assert!(!second.admin.apply(is_admin));
}

#[tokio::test]
async fn test_no_admin_groups_leaves_flag_unchanged() {
    let outcome = LoginSync::new(
        FixedDirectory::member_of(&["staff"]),
        Arc::new(InMemoryPivotStore::new()),
        AdminPolicy::default(),
    )
    .on_login(&UserIdentity::from_email("u@example.com"), &token())
    .await;

    assert_eq!(outcome.admin, AdminDecision::Unchanged);
    assert!(outcome.admin.apply(true));
}
