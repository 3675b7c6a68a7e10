//! Fixed-interval poller driving one [`Operation`] to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use ocs_core::job::{JobOutcome, JobState};
use ocs_core::types::JobKey;
use tokio::time::MissedTickBehavior;

use crate::operation::{ByteCount, Operation};
use crate::registry::JobTable;

/// Error detail used when a failed operation left no diagnostics.
const FALLBACK_ERROR_DETAIL: &str = "operation failed";

/// Receives the lifecycle of a job and turns it into domain events.
///
/// Supplied by the handler that starts the job. All three methods are called
/// from the job's own poller task, in order: `started`, zero or more
/// `progress`, exactly one `finished`.
pub trait JobReporter: Send + Sync + 'static {
    fn started(&self, key: &str);

    /// `bytes` is set when the operation reports transferred bytes.
    fn progress(&self, key: &str, progress: f64, bytes: Option<ByteCount>);

    fn finished(&self, key: &str, outcome: &JobOutcome);
}

/// Drives a single operation: start, poll, report, finish.
///
/// The poller is the only writer of its job's record in the [`JobTable`].
pub struct JobPoller {
    key: JobKey,
    operation: Box<dyn Operation>,
    reporter: Arc<dyn JobReporter>,
    table: Arc<JobTable>,
    interval: Duration,
    last_progress: f64,
}

impl JobPoller {
    pub(crate) fn new(
        key: JobKey,
        operation: Box<dyn Operation>,
        reporter: Arc<dyn JobReporter>,
        table: Arc<JobTable>,
        interval: Duration,
    ) -> Self {
        Self {
            key,
            operation,
            reporter,
            table,
            interval,
            last_progress: 0.0,
        }
    }

    /// Run the state machine until the operation reaches a terminal state.
    pub async fn run(mut self) -> JobOutcome {
        self.reporter.started(&self.key);

        if let Err(reason) = self.operation.start() {
            tracing::warn!(job_key = %self.key, reason = %reason, "Job refused to start");
            let detail = if reason.is_empty() {
                FALLBACK_ERROR_DETAIL.to_string()
            } else {
                reason
            };
            return self.finish(JobOutcome::Failed { detail });
        }

        self.table
            .update(&self.key, |job| job.state = JobState::Running);
        tracing::debug!(
            job_key = %self.key,
            poll_interval_ms = self.interval.as_millis() as u64,
            "Job running",
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; give the operation one
        // interval before the first poll.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Some(outcome) = self.poll_once() {
                return self.finish(outcome);
            }
        }
    }

    /// One poll tick. Returns the outcome once the operation is done.
    fn poll_once(&mut self) -> Option<JobOutcome> {
        if !self.operation.is_done() {
            if let Some(raw) = self.operation.progress() {
                let progress = clamp_progress(self.last_progress, raw);
                self.last_progress = progress;
                self.table.update(&self.key, |job| job.progress = progress);
                self.reporter
                    .progress(&self.key, progress, self.operation.bytes());
            }
            return None;
        }

        if !self.operation.has_error() {
            return Some(JobOutcome::Succeeded);
        }

        let mut messages = Vec::new();
        while let Some(message) = self.operation.next_status_message() {
            messages.push(message);
        }
        let detail = if messages.is_empty() {
            FALLBACK_ERROR_DETAIL.to_string()
        } else {
            messages.join("\n")
        };
        Some(JobOutcome::Failed { detail })
    }

    fn finish(&mut self, outcome: JobOutcome) -> JobOutcome {
        self.table.update(&self.key, |job| {
            job.state = outcome.state();
            job.error_detail = match &outcome {
                JobOutcome::Succeeded => None,
                JobOutcome::Failed { detail } => Some(detail.clone()),
            };
        });

        match &outcome {
            JobOutcome::Succeeded => tracing::info!(job_key = %self.key, "Job succeeded"),
            JobOutcome::Failed { detail } => {
                tracing::warn!(job_key = %self.key, error = %detail, "Job failed")
            }
        }

        self.reporter.finished(&self.key, &outcome);
        outcome
    }
}

/// Clamp a reported fraction to `[last, 1.0]` so progress never decreases.
fn clamp_progress(last: f64, raw: f64) -> f64 {
    if raw.is_nan() {
        return last;
    }
    raw.clamp(0.0, 1.0).max(last)
}
