use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized state of a resource-manager job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Submitted,
    Queued,
    Active,
    Complete,
    Canceled,
    Failed,
    Suspended,
    Unknown,
    NonCriticalFail,
}

impl JobState {
    /// The scheduler will not move the job any further
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::Queued => "QUEUED",
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Suspended => "SUSPENDED",
            Self::Unknown => "UNKNOWN",
            Self::NonCriticalFail => "NON_CRITICAL_FAIL",
        };
        write!(f, "{s}")
    }
}

/// Remote job bound to the JOB_SUBMISSION task of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub process_id: String,
    /// Owning JOB_SUBMISSION task
    pub task_id: String,
    /// Assigned by the resource manager; absent until submission succeeds
    pub job_id: Option<String>,
    pub job_name: String,
    pub job_state: JobState,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn submitted(
        process_id: impl Into<String>,
        task_id: impl Into<String>,
        job_id: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            task_id: task_id.into(),
            job_id: Some(job_id.into()),
            job_name: job_name.into(),
            job_state: JobState::Submitted,
            last_polled_at: None,
        }
    }

    /// Record a poll observation; returns whether the state changed
    pub fn observe(&mut self, state: JobState) -> bool {
        self.last_polled_at = Some(Utc::now());
        let changed = self.job_state != state;
        self.job_state = state;
        changed
    }
}

/// Push-style job state observation (e.g. from a scheduler notification mail)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    pub job_id: String,
    pub state: JobState,
    pub observed_at: DateTime<Utc>,
}

impl JobNotification {
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            observed_at: Utc::now(),
        }
    }
}
