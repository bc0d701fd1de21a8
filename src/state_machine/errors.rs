use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Task {task_id} has no recorded state")]
    EmptyHistory { task_id: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
