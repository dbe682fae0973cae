//! Bounded job queue and worker

use crate::error::JobError;
use crate::jobs::Job;
use crate::jobs::policy::RetryPolicy;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
}

/// Submission handle; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Box<dyn Job>>,
    counters: Arc<Counters>,
}

/// Worker task consuming the queue
pub struct JobWorker {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl JobQueue {
    /// Start a worker and return the queue feeding it
    pub fn start(capacity: usize, policy: RetryPolicy) -> (Self, JobWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(run_worker(
            receiver,
            policy,
            Arc::clone(&counters),
            Arc::clone(&shutdown),
        ));

        (Self { sender, counters }, JobWorker { handle, shutdown })
    }

    /// Enqueue a job without waiting
    pub fn submit(&self, job: Box<dyn Job>) -> Result<(), JobError> {
        let name = job.name().to_string();
        match self.sender.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(job = %name, "Job submitted");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(job = %name, "Job queue full, rejecting job");
                Err(JobError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(JobError::QueueClosed)
            }
        }
    }

    pub fn stats(&self) -> JobStats {
        JobStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }
}

impl JobWorker {
    /// Stop accepting jobs, run what is already queued, and wait for
    /// in-flight jobs to finish
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Job worker terminated abnormally");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Box<dyn Job>>,
    policy: RetryPolicy,
    counters: Arc<Counters>,
    shutdown: Arc<Notify>,
) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(job) => {
                    running.spawn(run_with_retry(job, policy.clone(), Arc::clone(&counters)));
                }
                None => break,
            },
            _ = shutdown.notified() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
        }
    }

    receiver.close();
    while let Ok(job) = receiver.try_recv() {
        running.spawn(run_with_retry(job, policy.clone(), Arc::clone(&counters)));
    }

    let pending = running.len();
    if pending > 0 {
        info!(pending, "Waiting for background jobs to finish");
    }
    while running.join_next().await.is_some() {}
    debug!("Job worker stopped");
}

async fn run_with_retry(job: Box<dyn Job>, policy: RetryPolicy, counters: Arc<Counters>) {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match job.run().await {
            Ok(()) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(job = job.name(), attempt, "Job completed");
                return;
            }
            Err(e) if policy.should_retry(attempt) => {
                counters.retries.fetch_add(1, Ordering::Relaxed);
                let delay = policy.delay_after(attempt);
                warn!(
                    job = job.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(job = job.name(), attempts = attempt, error = %e, "Job failed permanently");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct Flaky {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl Job for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self) -> Result<(), JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                Err(JobError::Failed {
                    job: "flaky".into(),
                    reason: format!("call {}", call),
                })
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_job_retried_until_success() {
        let (queue, worker) = JobQueue::start(4, fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        queue
            .submit(Box::new(Flaky {
                calls: Arc::clone(&calls),
                fail_times: 2,
            }))
            .unwrap();

        worker.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = queue.stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_job_gives_up_after_max_attempts() {
        let (queue, worker) = JobQueue::start(4, fast_policy(2));
        let calls = Arc::new(AtomicU32::new(0));
        queue
            .submit(Box::new(Flaky {
                calls: Arc::clone(&calls),
                fail_times: 10,
            }))
            .unwrap();

        worker.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (queue, worker) = JobQueue::start(4, fast_policy(1));
        worker.shutdown().await;

        let result = queue.submit(Box::new(Flaky {
            calls: Arc::new(AtomicU32::new(0)),
            fail_times: 0,
        }));
        assert!(matches!(result, Err(JobError::QueueClosed)));
        assert_eq!(queue.stats().rejected, 1);
    }
}
