use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Hand the task to a worker queue
    Schedule,
    /// Worker begins `execute`
    Start,
    /// Worker begins `recover` after a failure or restart
    Recover,
    /// Mark task as complete
    Complete,
    /// Mark task as failed
    Fail { retryable: bool, error: String },
    /// Cancel the task
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Start => "start",
            Self::Recover => "recover",
            Self::Complete => "complete",
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn fail_with_error(retryable: bool, error: impl Into<String>) -> Self {
        Self::Fail {
            retryable,
            error: error.into(),
        }
    }
}

/// Events that can trigger process state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProcessEvent {
    Start,
    Complete,
    Fail(String),
    RequestCancel,
    ConfirmCancel,
}

impl ProcessEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::RequestCancel => "request_cancel",
            Self::ConfirmCancel => "confirm_cancel",
        }
    }
}
