//! Job lifecycle types shared by the job engine and its observers.

use serde::{Deserialize, Serialize};

use crate::types::{JobKey, Timestamp};

/// Which subsystem a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// An item content download.
    Download,
    /// An update of an installed item.
    Update,
}

/// Lifecycle state of a job.
///
/// `Starting -> Running -> {Succeeded, Failed}`, or `Starting -> Failed`
/// when the underlying operation refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Snapshot of one in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub key: JobKey,
    pub kind: JobKind,
    pub state: JobState,
    /// Fraction in `0.0..=1.0`, non-decreasing while running.
    pub progress: f64,
    /// Newline-joined diagnostics. Only set when `state == Failed`.
    pub error_detail: Option<String>,
    pub started_at: Timestamp,
}

impl Job {
    pub fn new(key: impl Into<JobKey>, kind: JobKind) -> Self {
        Self {
            key: key.into(),
            kind,
            state: JobState::Starting,
            progress: 0.0,
            error_detail: None,
            started_at: chrono::Utc::now(),
        }
    }
}

/// Terminal result of a job, handed to reporters and completion waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { detail: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    /// Diagnostic text; empty on success.
    pub fn error_detail(&self) -> &str {
        match self {
            JobOutcome::Succeeded => "",
            JobOutcome::Failed { detail } => detail,
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}
