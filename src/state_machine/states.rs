use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Initial state when the task spec is built
    Created,
    /// Dispatched to a worker queue
    Scheduled,
    /// A worker is running `execute` or `recover`
    Executing,
    /// Task completed successfully
    Completed,
    /// Task failed; may re-enter Executing through `recover`
    Failed,
    /// Task was canceled
    Canceled,
}

impl TaskState {
    /// Check if this is a terminal state for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Check if this is an active state (task is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Executing)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Executing => write!(f, "EXECUTING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(Self::Created),
            "SCHEDULED" => Ok(Self::Scheduled),
            "EXECUTING" => Ok(Self::Executing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Process state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Registered, nothing dispatched yet
    Pending,
    /// Task DAG is being driven forward
    Running,
    /// Cancellation requested, waiting on the in-flight task
    Canceling,
    Completed,
    Failed,
    Canceled,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Canceling => write!(f, "CANCELING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Created
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::Pending
    }
}
