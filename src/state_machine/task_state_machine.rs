use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use crate::models::{TaskSpec, TaskStatus};
use chrono::Utc;

/// Task state machine producing append-only status records
///
/// The machine never rewrites history: every accepted transition yields a new
/// [`TaskStatus`] the caller appends to the task's history.
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    task: TaskSpec,
    current: TaskState,
}

impl TaskStateMachine {
    pub fn new(task: TaskSpec) -> Self {
        Self {
            task,
            current: TaskState::default(),
        }
    }

    /// Resume from the last persisted record of the task, if any
    pub fn from_last_status(task: TaskSpec, last: Option<&TaskStatus>) -> Self {
        Self {
            current: last.map(|s| s.state).unwrap_or_default(),
            task,
        }
    }

    pub fn current_state(&self) -> TaskState {
        self.current
    }

    pub fn task(&self) -> &TaskSpec {
        &self.task
    }

    /// Apply an event for the given attempt and return the record to persist
    pub fn transition(&mut self, event: TaskEvent, attempt: u32) -> StateMachineResult<TaskStatus> {
        let target = Self::determine_target_state(self.current, &event)?;

        let mut status = TaskStatus::new(&self.task, target, attempt);
        status.timestamp = Utc::now();
        if let TaskEvent::Fail { retryable, error } = event {
            status.retryable = retryable;
            status.reason = Some(error);
        }

        tracing::debug!(
            task_id = %self.task.task_id,
            from = %self.current,
            to = %target,
            attempt = attempt,
            "Task state transition"
        );

        self.current = target;
        Ok(status)
    }

    /// Transition table
    pub fn determine_target_state(
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (current_state, event) {
            (TaskState::Created, TaskEvent::Schedule) => TaskState::Scheduled,

            (TaskState::Created | TaskState::Scheduled, TaskEvent::Start) => TaskState::Executing,

            // Re-entry into Executing after a failure goes through recover only
            (
                TaskState::Scheduled | TaskState::Executing | TaskState::Failed,
                TaskEvent::Recover,
            ) => TaskState::Executing,

            (TaskState::Executing, TaskEvent::Complete) => TaskState::Completed,

            (TaskState::Scheduled | TaskState::Executing, TaskEvent::Fail { .. }) => {
                TaskState::Failed
            }

            (
                TaskState::Created | TaskState::Scheduled | TaskState::Executing | TaskState::Failed,
                TaskEvent::Cancel,
            ) => TaskState::Canceled,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
