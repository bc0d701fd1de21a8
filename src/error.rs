//! Error types for the orchestration engine.
//!

use crate::config::ConfigurationError;
use crate::parsing::ParseError;
use crate::state_machine::errors::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// Process description rejected before any task exists
    #[error("Validation failed for process {process_id}: {}", messages.join("; "))]
    Validation {
        process_id: String,
        messages: Vec<String>,
    },

    /// Could not obtain an adaptor (credentials, connection, unsupported protocol)
    #[error("Adaptor initialization failed for {resource_id}: {reason}")]
    AdaptorInit { resource_id: String, reason: String },

    #[error("Command `{command}` exited with {exit_code}: {stderr}")]
    CommandExecution {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The remote side may or may not have acted; retrying could duplicate work
    #[error("Ambiguous remote state for task {task_id}: {reason}")]
    AmbiguousRemoteState { task_id: String, reason: String },

    /// A broken internal assumption, e.g. a missing status history
    #[error("Orchestrator invariant violated: {0}")]
    OrchestratorInvariant(String),

    #[error("Operation `{operation}` timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Credential error for token {token}: {reason}")]
    Credential { token: String, reason: String },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Process {0} not found")]
    ProcessNotFound(String),

    #[error("Task {0} not found")]
    TaskNotFound(String),

    #[error("Process {process_id} is {state}; cannot {operation}")]
    InvalidProcessState {
        process_id: String,
        state: String,
        operation: String,
    },

    /// The resource manager refused the job for a reason resubmitting cannot fix
    #[error("Submission of {job_name} rejected: {reason}")]
    SubmissionRejected { job_name: String, reason: String },

    /// The scheduler reported the job as failed or canceled
    #[error("Job {job_id} ended in state {state}")]
    JobFailed { job_id: String, state: String },

    #[error("Staging failed for {data_name}: {reason}")]
    Staging { data_name: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error during {operation}: {reason}")]
    Io { operation: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
}

/// Coarse classification driving retry decisions and operator reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; retrying cannot help
    Validation,
    /// Connection, credential or command failures that may clear up
    Transient,
    /// Operation exceeded its time budget
    Timeout,
    /// Needs a human to look at the remote side
    ManualIntervention,
    /// Remote work finished unsuccessfully
    Permanent,
    /// Internal defect
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Transient => write!(f, "transient"),
            Self::Timeout => write!(f, "timeout"),
            Self::ManualIntervention => write!(f, "manual_intervention"),
            Self::Permanent => write!(f, "permanent"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl OrchestratorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::Configuration(_) => ErrorCategory::Validation,
            Self::AdaptorInit { .. }
            | Self::CommandExecution { .. }
            | Self::Credential { .. }
            | Self::Catalog(_)
            | Self::Dispatch(_)
            | Self::Staging { .. }
            | Self::Io { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::AmbiguousRemoteState { .. } => ErrorCategory::ManualIntervention,
            Self::JobFailed { .. }
            | Self::SubmissionRejected { .. }
            | Self::FileNotFound { .. } => ErrorCategory::Permanent,
            Self::Parse(_)
            | Self::OrchestratorInvariant(_)
            | Self::ProcessNotFound(_)
            | Self::TaskNotFound(_)
            | Self::InvalidProcessState { .. }
            | Self::StateMachine(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a task that failed with this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Timeout
        )
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::OrchestratorInvariant(message.into())
    }

    pub fn catalog(message: impl fmt::Display) -> Self {
        Self::Catalog(message.to_string())
    }

    /// Map a filesystem error; a missing path is not retryable
    pub fn io(operation: impl Into<String>, error: &std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            return Self::FileNotFound {
                path: operation.into(),
            };
        }
        Self::Io {
            operation: operation.into(),
            reason: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(error: serde_json::Error) -> Self {
        OrchestratorError::Catalog(format!("JSON serialization error: {error}"))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let command = OrchestratorError::CommandExecution {
            command: "mkdir -p /scratch/x".into(),
            exit_code: 255,
            stderr: "Connection reset by peer".into(),
        };
        assert!(command.is_retryable());
        assert_eq!(command.category(), ErrorCategory::Transient);

        let ambiguous = OrchestratorError::AmbiguousRemoteState {
            task_id: "P.02.job_submission".into(),
            reason: "no job id in output".into(),
        };
        assert!(!ambiguous.is_retryable());
        assert_eq!(ambiguous.category(), ErrorCategory::ManualIntervention);

        assert!(!OrchestratorError::invariant("empty history").is_retryable());
        assert!(!OrchestratorError::SubmissionRejected {
            job_name: "hf01".into(),
            reason: "Invalid partition name specified".into(),
        }
        .is_retryable());
        assert!(OrchestratorError::Timeout {
            operation: "sbatch".into(),
            duration: Duration::from_secs(30)
        }
        .is_retryable());
    }

    #[test]
    fn test_validation_message_joins_all_problems() {
        let err = OrchestratorError::Validation {
            process_id: "P".into(),
            messages: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Validation failed for process P: a; b");
    }
}
