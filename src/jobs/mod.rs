//! Background jobs
//!
//! A bounded in-process queue for work that must not block the login path.
//! Failed jobs are retried with exponential backoff up to the policy's
//! attempt limit, then dropped with an error log.

pub mod policy;
pub mod profile;
pub mod queue;

pub use policy::RetryPolicy;
pub use profile::ProfileCheckJob;
pub use queue::{JobQueue, JobStats, JobWorker};

use crate::error::JobError;
// async_trait required for dyn-compatibility with Box<dyn Job>
use async_trait::async_trait;

/// A unit of background work
#[async_trait]
pub trait Job: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run once. Errors are retried per the queue's policy.
    async fn run(&self) -> Result<(), JobError>;
}
