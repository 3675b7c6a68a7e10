//! Registry of in-flight jobs, at most one per key.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use ocs_core::job::{Job, JobKind, JobOutcome};
use ocs_core::types::JobKey;
use tokio::sync::oneshot;

use crate::operation::Operation;
use crate::poller::{JobPoller, JobReporter};

/// Default polling interval for job progress.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// JobTable
// ---------------------------------------------------------------------------

/// Job records keyed by job key.
///
/// Critical sections are short and never await, so a blocking lock is used.
#[derive(Default)]
pub(crate) struct JobTable {
    jobs: RwLock<HashMap<JobKey, Job>>,
}

impl JobTable {
    /// Insert `job` unless a job with the same key is registered.
    ///
    /// A terminal job keeps its key until its poller task removes it.
    fn insert_if_idle(&self, job: Job) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.key) {
            return false;
        }
        jobs.insert(job.key.clone(), job);
        true
    }

    /// Mutate a live job record. Terminal records are absorbing and are
    /// left untouched.
    pub(crate) fn update(&self, key: &str, f: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(key) {
            Some(job) if !job.state.is_terminal() => f(job),
            Some(_) => tracing::debug!(job_key = %key, "Ignoring update to terminal job"),
            None => {}
        }
    }

    fn remove(&self, key: &str) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn get(&self, key: &str) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Removes a job record when its poller task ends, even by panic.
struct Deregister {
    table: Arc<JobTable>,
    key: JobKey,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// JobSpec / JobCompletion
// ---------------------------------------------------------------------------

/// Everything needed to run one job.
pub struct JobSpec {
    pub kind: JobKind,
    pub operation: Box<dyn Operation>,
    pub reporter: Arc<dyn JobReporter>,
}

impl JobSpec {
    pub fn new(
        kind: JobKind,
        operation: impl Operation,
        reporter: Arc<dyn JobReporter>,
    ) -> Self {
        Self {
            kind,
            operation: Box::new(operation),
            reporter,
        }
    }
}

/// Resolves to a job's terminal outcome once its record has been removed.
pub struct JobCompletion {
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobCompletion {
    pub async fn wait(self) -> JobOutcome {
        self.rx.await.unwrap_or_else(|_| JobOutcome::Failed {
            detail: "job task ended without an outcome".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Owns every in-flight job.
///
/// Cheap to share via `Arc`; every method takes `&self`.
pub struct JobRegistry {
    table: Arc<JobTable>,
    poll_interval: Duration,
}

impl JobRegistry {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            table: Arc::default(),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start a job under `key`.
    ///
    /// Returns `false` without creating a poller when a job with the same
    /// key is still registered.
    pub fn start(&self, key: impl Into<JobKey>, spec: JobSpec) -> bool {
        self.start_tracked(key, spec).is_some()
    }

    /// Like [`start`](Self::start), returning a handle to the outcome.
    pub fn start_tracked(&self, key: impl Into<JobKey>, spec: JobSpec) -> Option<JobCompletion> {
        let key = key.into();
        if !self.table.insert_if_idle(Job::new(key.clone(), spec.kind)) {
            tracing::info!(job_key = %key, kind = ?spec.kind, "Duplicate job start ignored");
            return None;
        }
        tracing::info!(job_key = %key, kind = ?spec.kind, "Job accepted");

        let (tx, rx) = oneshot::channel();
        let poller = JobPoller::new(
            key.clone(),
            spec.operation,
            spec.reporter,
            Arc::clone(&self.table),
            self.poll_interval,
        );
        let guard = Deregister {
            table: Arc::clone(&self.table),
            key,
        };

        tokio::spawn(async move {
            let outcome = poller.run().await;
            drop(guard);
            let _ = tx.send(outcome);
        });

        Some(JobCompletion { rx })
    }

    /// Whether a request for `key` should be ignored because a job with
    /// that key is already in flight. There is no cancel-in-flight.
    pub fn ignore_duplicate(&self, key: &str) -> bool {
        self.table.contains(key)
    }

    /// Snapshot of the job registered under `key`.
    pub fn get(&self, key: &str) -> Option<Job> {
        self.table.get(key)
    }

    /// Sorted keys of every registered job.
    pub fn active_keys(&self) -> Vec<JobKey> {
        self.table.keys()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
