//! # Message structures
//!
//! Dispatch payloads sent to the worker queues and the result events workers
//! send back to the orchestrator. Dispatch messages are deliberately minimal:
//! the worker re-fetches the task and process descriptions from the catalog
//! by id.

use crate::error::OrchestratorError;
use crate::models::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work item for a task worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDispatchMessage {
    pub process_id: String,
    pub task_id: String,
    pub task_type: TaskType,
    pub order_index: u32,
    /// 1 runs `execute`; anything higher runs `recover`
    pub attempt_number: u32,
}

impl TaskDispatchMessage {
    pub fn new(
        process_id: impl Into<String>,
        task_id: impl Into<String>,
        task_type: TaskType,
        order_index: u32,
        attempt_number: u32,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            task_id: task_id.into(),
            task_type,
            order_index,
            attempt_number,
        }
    }

    pub fn is_first_attempt(&self) -> bool {
        self.attempt_number <= 1
    }

    /// Queue the message is routed to
    pub fn queue_name(&self) -> String {
        format!("{}_queue", self.task_type.slug())
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}

/// Identity of the task a result refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub process_id: String,
    pub task_id: String,
    pub order_index: u32,
    pub attempt_number: u32,
}

impl From<&TaskDispatchMessage> for TaskRef {
    fn from(message: &TaskDispatchMessage) -> Self {
        Self {
            process_id: message.process_id.clone(),
            task_id: message.task_id.clone(),
            order_index: message.order_index,
            attempt_number: message.attempt_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    pub task: TaskRef,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    pub task: TaskRef,
    pub retryable: bool,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl TaskFailedEvent {
    pub fn from_error(task: TaskRef, error: &OrchestratorError) -> Self {
        Self {
            task,
            retryable: error.is_retryable(),
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// The worker stopped the task after a cancellation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCanceledEvent {
    pub task: TaskRef,
    pub canceled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_wire_format() {
        let message = TaskDispatchMessage::new("P1", "P1.02.job_submission", TaskType::JobSubmission, 2, 1);
        let json = message.to_json().unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "processId": "P1",
                "taskId": "P1.02.job_submission",
                "taskType": "JOB_SUBMISSION",
                "orderIndex": 2,
                "attemptNumber": 1
            })
        );
        assert_eq!(TaskDispatchMessage::from_json(json).unwrap(), message);
        assert_eq!(message.queue_name(), "job_submission_queue");
        assert!(message.is_first_attempt());
    }

    #[test]
    fn test_failed_event_takes_retryability_from_error() {
        let message = TaskDispatchMessage::new("P1", "P1.00.env_setup", TaskType::EnvSetup, 0, 2);
        let event = TaskFailedEvent::from_error(
            TaskRef::from(&message),
            &OrchestratorError::AmbiguousRemoteState {
                task_id: "P1.00.env_setup".into(),
                reason: "no job id".into(),
            },
        );
        assert!(!event.retryable);
        assert_eq!(event.task.attempt_number, 2);
    }
}
