use crate::models::{JobNotification, JobRecord, ProcessStatus, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task appended a status record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub event_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub published_at: DateTime<Utc>,
}

/// A job record was created or its state changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub event_id: Uuid,
    pub job: JobRecord,
    pub published_at: DateTime<Utc>,
}

/// A process changed state; terminal states carry the failing task, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatusEvent {
    pub event_id: Uuid,
    pub status: ProcessStatus,
    pub published_at: DateTime<Utc>,
}

impl ProcessStatusEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }
}

/// Push-style job observation relayed to MONITOR tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotificationEvent {
    pub event_id: Uuid,
    pub notification: JobNotification,
    pub published_at: DateTime<Utc>,
}

pub(crate) fn new_event_id() -> Uuid {
    Uuid::new_v4()
}
